// Configuration loading tests - bridge.toml files on disk

#[path = "../support/mod.rs"]
mod support;

use serde_json::json;
use serial_test::serial;
use std::fs;
use std::time::Duration;
use support::WORKER;
use tempfile::TempDir;
use toolbridge_core::{AppConfig, ConfigError, ServerManager, ToolServerInterface};

fn write_config(contents: &str) -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bridge.toml");
    fs::write(&path, contents).expect("write config");
    (dir, path)
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn invalid_toml_is_a_parse_error() {
    let (_dir, path) = write_config("[[servers]\nname = ");
    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
#[serial]
fn file_values_are_expanded_and_defaulted() {
    unsafe {
        std::env::set_var("TOOLBRIDGE_TEST_WORKDIR", "/tmp/toolbridge");
    }
    let (_dir, path) = write_config(
        r#"
default_server = "local"

[[servers]]
name = "local"
command = "worker"
args = ["--root", "${TOOLBRIDGE_TEST_WORKDIR}/data"]
workdir = "${TOOLBRIDGE_TEST_WORKDIR}"
attempt_timeout_ms = 1500

[[servers]]
name = "stays"
preset = "airbnb"
args_extra = ["--ignore-robots-txt"]
placeholders = true
"#,
    );

    let config = AppConfig::load(Some(&path)).expect("config");
    unsafe {
        std::env::remove_var("TOOLBRIDGE_TEST_WORKDIR");
    }

    let local = config.server("local").expect("local");
    assert_eq!(local.args, vec!["--root", "/tmp/toolbridge/data"]);
    assert_eq!(local.workdir.as_deref(), Some(std::path::Path::new("/tmp/toolbridge")));
    assert_eq!(local.attempt_timeout, Duration::from_millis(1500));
    assert_eq!(local.call_timeout, Duration::from_secs(60));
    assert_eq!(local.kind, "generic");

    let stays = config.server("stays").expect("stays");
    assert_eq!(stays.kind, "airbnb");
    assert_eq!(stays.args.last().map(String::as_str), Some("--ignore-robots-txt"));
    assert!(stays.placeholders);
    assert_eq!(config.pick_server(None), Some("local"));
}

#[test]
#[serial]
fn preset_keys_come_from_the_environment() {
    unsafe {
        std::env::remove_var("TAVILY_API_KEY");
    }
    let (_dir, path) = write_config("[[servers]]\nname = \"search\"\npreset = \"tavily\"\n");
    let err = AppConfig::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::MissingApiKey { ref variable, .. } if variable == "TAVILY_API_KEY"));

    unsafe {
        std::env::set_var("TAVILY_API_KEY", "tvly-test");
    }
    let config = AppConfig::load(Some(&path)).expect("config");
    unsafe {
        std::env::remove_var("TAVILY_API_KEY");
    }
    let search = config.server("search").expect("search");
    assert_eq!(search.env.get("TAVILY_API_KEY").map(String::as_str), Some("tvly-test"));
}

#[tokio::test]
async fn configured_worker_serves_calls() {
    let (_dir, path) = write_config(&format!(
        r#"
[[servers]]
name = "scripted"
command = "{WORKER}"
args = ["--accept", "structured,unprefixed"]
startup_grace_ms = 150
attempt_timeout_ms = 5000
"#
    ));
    let config = AppConfig::load(Some(&path)).expect("config");
    let manager = ServerManager::new(config.servers.clone());

    let tools = manager.list_tools("scripted").await.expect("tools");
    let payload = manager
        .invoke_tool("scripted", "demo_echo", json!({"from": "config"}))
        .await
        .expect("call");

    assert_eq!(tools.len(), 4);
    assert_eq!(payload.as_structured().map(|value| value["echo"]["from"].clone()), Some(json!("config")));
    let err = manager.list_tools("unknown").await.unwrap_err();
    assert_eq!(err.kind(), "not-configured");
    manager.shutdown_all().await;
}
