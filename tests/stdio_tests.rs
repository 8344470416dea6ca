// STDIO front-end tests - JSON-lines requests against a live scripted worker

#[path = "support/mod.rs"]
mod support;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use support::worker_config;
use toolbridge_core::{ServerManager, stdio};

async fn exchange(manager: Arc<ServerManager>, input: &str) -> HashMap<String, Value> {
    let output = stdio::serve(manager, Some("scripted".to_string()), input.as_bytes(), Vec::new())
        .await
        .expect("serve");
    String::from_utf8(output)
        .expect("utf8")
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).expect("json line");
            (value["id"].to_string(), value)
        })
        .collect()
}

#[tokio::test]
async fn requests_are_answered_by_id() {
    let manager = Arc::new(ServerManager::new(vec![worker_config("scripted", &[])]));
    let input = concat!(
        "{\"id\": 1, \"tool\": \"demo_slow\", \"arguments\": {\"delay_ms\": 300, \"tag\": \"slow\"}}\n",
        "{\"id\": 2, \"tool\": \"demo_echo\", \"arguments\": {\"tag\": \"fast\"}}\n",
        "{\"id\": 3, \"action\": \"list\"}\n",
        "{\"id\": 4, \"tool\": \"demo_fail\", \"arguments\": {\"reason\": \"nope\"}}\n",
    );

    let responses = exchange(Arc::clone(&manager), input).await;
    manager.shutdown_all().await;

    assert_eq!(responses.len(), 4);
    assert_eq!(responses["1"]["result"]["echo"]["tag"], "slow");
    assert_eq!(responses["2"]["result"]["echo"]["tag"], "fast");
    assert_eq!(responses["3"]["tools"].as_array().map(Vec::len), Some(4));
    assert_eq!(responses["4"]["ok"], false);
    assert_eq!(responses["4"]["error"]["kind"], "worker-error");
}

#[tokio::test]
async fn per_request_timeout_is_honoured() {
    let manager = Arc::new(ServerManager::new(vec![worker_config(
        "scripted",
        &["--silent-calls", "--accept", "structured,method,wrapped,unprefixed"],
    )]));
    let input = "{\"id\": \"t\", \"tool\": \"demo_echo\", \"timeout_ms\": 300}\n";

    let responses = exchange(Arc::clone(&manager), input).await;
    manager.shutdown_all().await;

    assert_eq!(responses["\"t\""]["error"]["kind"], "timeout");
}
