use super::error::ToolInvokeError;
use super::fallback::FallbackRegistry;
use super::interface::{ToolCatalog, ToolServerInterface};
use super::invoker::ToolInvoker;
use crate::config::ServerConfig;
use crate::domain::types::ToolPayload;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// One lazily created [`ToolInvoker`] per configured worker name.
pub struct ServerManager {
    configs: HashMap<String, ServerConfig>,
    fallbacks: FallbackRegistry,
    instances: Mutex<HashMap<String, ToolInvoker>>,
}

impl ServerManager {
    pub fn new(configs: Vec<ServerConfig>) -> Self {
        Self::with_fallbacks(configs, FallbackRegistry::builtin())
    }

    pub fn with_fallbacks(configs: Vec<ServerConfig>, fallbacks: FallbackRegistry) -> Self {
        let configs = configs
            .into_iter()
            .map(|cfg| (cfg.name.clone(), cfg))
            .collect();
        Self {
            configs,
            fallbacks,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the invoker for `server`, creating it on first use.
    pub fn invoker(&self, server: &str) -> Result<ToolInvoker, ToolInvokeError> {
        let mut instances = self.instances();
        if let Some(existing) = instances.get(server) {
            return Ok(existing.clone());
        }
        let config = self
            .configs
            .get(server)
            .cloned()
            .ok_or_else(|| ToolInvokeError::NotConfigured {
                server: server.to_string(),
            })?;
        let invoker = ToolInvoker::with_fallbacks(config, &self.fallbacks);
        instances.insert(server.to_string(), invoker.clone());
        Ok(invoker)
    }

    pub async fn call_tool_with_timeout(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
        limit: Duration,
    ) -> Result<ToolPayload, ToolInvokeError> {
        self.invoker(server)?
            .call_tool_with_timeout(tool, arguments, limit)
            .await
    }

    /// Stops every worker that was started, each with its own grace period.
    pub async fn shutdown_all(&self) {
        let invokers: Vec<ToolInvoker> = self.instances().values().cloned().collect();
        info!(count = invokers.len(), "Shutting down workers");
        join_all(invokers.iter().map(|invoker| invoker.stop())).await;
    }

    fn instances(&self) -> MutexGuard<'_, HashMap<String, ToolInvoker>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ToolServerInterface for ServerManager {
    async fn list_tools(&self, server: &str) -> Result<ToolCatalog, ToolInvokeError> {
        self.invoker(server)?.list_tools().await
    }

    async fn invoke_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolPayload, ToolInvokeError> {
        self.invoker(server)?.call_tool(tool, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_servers_are_not_configured() {
        let manager = ServerManager::new(vec![ServerConfig::new("local", "worker")]);
        let err = manager.invoker("remote").err().expect("missing");
        assert_eq!(err.kind(), "not-configured");
    }

    #[test]
    fn invokers_are_reused_per_name() {
        let manager = ServerManager::new(vec![
            ServerConfig::new("b", "worker"),
            ServerConfig::new("a", "worker"),
        ]);
        let first = manager.invoker("a").expect("a");
        let again = manager.invoker("a").expect("a");
        assert_eq!(first.name(), again.name());
        assert_eq!(again.state(), crate::domain::types::WorkerState::NotStarted);
        assert_eq!(manager.server_names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn catalog_comes_from_the_named_worker() {
        let manager = ServerManager::new(vec![
            ServerConfig::new("stays", "/nonexistent/worker").with_kind("airbnb"),
        ]);
        let tools = manager.list_tools("stays").await.expect("catalog");
        assert_eq!(tools.len(), 2);
        manager.shutdown_all().await;
    }
}
