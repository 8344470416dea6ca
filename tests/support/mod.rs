// Shared helpers for suites that drive the scripted worker.

#![allow(dead_code)]

use std::time::Duration;
use toolbridge_core::config::ServerConfig;

pub const WORKER: &str = env!("CARGO_BIN_EXE_scripted-worker");

/// A generic worker config with test-sized timeouts.
pub fn worker_config(name: &str, flags: &[&str]) -> ServerConfig {
    ServerConfig::new(name, WORKER)
        .with_args(flags.iter().copied())
        .with_startup_grace(Duration::from_millis(150))
        .with_attempt_timeout(Duration::from_secs(5))
        .with_call_timeout(Duration::from_secs(10))
        .with_shutdown_grace(Duration::from_secs(2))
}

/// Polls `check` every 20 ms until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
