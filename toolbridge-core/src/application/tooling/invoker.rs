use super::attempt::CALL_ATTEMPTS;
use super::catalog::{self, ToolCatalogCache};
use super::correlator::RequestCorrelator;
use super::error::ToolInvokeError;
use super::fallback::{FallbackProvider, FallbackRegistry};
use super::interface::ToolCatalog;
use super::supervisor::ProcessSupervisor;
use crate::config::ServerConfig;
use crate::domain::types::{ToolPayload, WorkerState};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Public call surface for one worker.
///
/// Each instance owns its own supervisor, correlator and catalog; nothing is
/// shared between instances. Clones share the same worker.
#[derive(Clone)]
pub struct ToolInvoker {
    inner: Arc<InvokerInner>,
}

struct InvokerInner {
    server: ServerConfig,
    supervisor: Arc<ProcessSupervisor>,
    correlator: Arc<RequestCorrelator>,
    catalog: Arc<ToolCatalogCache>,
    fallback: Option<Arc<dyn FallbackProvider>>,
    discovery: AsyncMutex<()>,
}

/// How the attempt loop ended without a usable result.
#[derive(Default)]
struct Exhaustion {
    last: Option<ToolInvokeError>,
    /// Last worker error that was not a protocol-level rejection.
    worker_error: Option<ToolInvokeError>,
    timeouts: usize,
    failures: usize,
    connection_lost: bool,
}

impl ToolInvoker {
    /// Creates an invoker using the built-in fallback providers.
    pub fn new(server: ServerConfig) -> Self {
        Self::with_fallbacks(server, &FallbackRegistry::builtin())
    }

    pub fn with_fallbacks(server: ServerConfig, registry: &FallbackRegistry) -> Self {
        let correlator = Arc::new(RequestCorrelator::new(server.name.clone()));
        let catalog = Arc::new(ToolCatalogCache::new(server.name.clone()));
        let supervisor = Arc::new(ProcessSupervisor::new(
            server.clone(),
            Arc::clone(&correlator),
            Arc::clone(&catalog),
        ));
        let fallback = registry.get(&server.kind);
        Self {
            inner: Arc::new(InvokerInner {
                server,
                supervisor,
                correlator,
                catalog,
                fallback,
                discovery: AsyncMutex::new(()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.server.name
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.server
    }

    /// Spawns the worker if it is not already running.
    pub async fn start(&self) -> Result<(), ToolInvokeError> {
        self.inner.supervisor.ensure_running().await
    }

    /// Stops the worker using the configured shutdown grace period.
    pub async fn stop(&self) {
        self.stop_with_grace(self.inner.server.shutdown_grace).await;
    }

    pub async fn stop_with_grace(&self, grace: Duration) {
        self.inner.supervisor.terminate(grace).await;
    }

    pub async fn is_healthy(&self) -> bool {
        self.inner.supervisor.is_healthy().await
    }

    pub fn state(&self) -> WorkerState {
        self.inner.supervisor.state()
    }

    pub fn spawn_count(&self) -> u64 {
        self.inner.supervisor.spawn_count()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.inner.supervisor.exit_code()
    }

    /// Requests still waiting for a worker response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn invalidate_catalog(&self) {
        self.inner.catalog.invalidate();
    }

    /// Returns the worker's tools, discovering them on a cache miss.
    pub async fn list_tools(&self) -> Result<ToolCatalog, ToolInvokeError> {
        let deadline = Instant::now() + self.inner.server.attempt_timeout;
        self.inner.catalog_until(deadline).await
    }

    /// Calls `tool` with the configured overall deadline.
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolPayload, ToolInvokeError> {
        self.call_tool_with_timeout(tool, arguments, self.inner.server.call_timeout)
            .await
    }

    /// Calls `tool`, giving up once `limit` has elapsed.
    pub async fn call_tool_with_timeout(
        &self,
        tool: &str,
        arguments: Value,
        limit: Duration,
    ) -> Result<ToolPayload, ToolInvokeError> {
        let started = Instant::now();
        let deadline = started + limit;
        let inner = &self.inner;

        let per_attempt = (started + inner.server.attempt_timeout).min(deadline);
        let catalog = inner.catalog_until(per_attempt).await?;
        if !catalog.iter().any(|descriptor| descriptor.name == tool) {
            warn!(server = %inner.server.name, tool, "rejecting call to unknown tool");
            return Err(ToolInvokeError::NotFound {
                server: inner.server.name.clone(),
                tool: tool.to_string(),
            });
        }

        if let Err(err) = inner.supervisor.ensure_running().await {
            return Err(match err {
                ToolInvokeError::ConnectionUnavailable { .. } => err,
                other => inner.unavailable(other.to_string()),
            });
        }

        let mut exhaustion = Exhaustion::default();
        let mut respawned = false;
        let mut attempts = CALL_ATTEMPTS.iter().copied().peekable();
        while let Some(attempt) = attempts.peek().copied() {
            let Some(call) = attempt.encode(tool, &arguments) else {
                attempts.next();
                continue;
            };
            let now = Instant::now();
            if now >= deadline {
                exhaustion.timeouts += 1;
                break;
            }
            let attempt_deadline = (now + inner.server.attempt_timeout).min(deadline);
            info!(
                server = %inner.server.name,
                tool,
                attempt = attempt.label(),
                method = %call.method,
                "Trying calling convention"
            );

            match inner.request(&call.method, &call.params, attempt_deadline).await {
                Ok(result) => {
                    if is_error_result(&result) {
                        let message = ToolPayload::from_result(result).to_text();
                        warn!(server = %inner.server.name, tool, "worker reported tool failure");
                        return Err(ToolInvokeError::Worker {
                            server: inner.server.name.clone(),
                            code: None,
                            message,
                        });
                    }
                    info!(
                        server = %inner.server.name,
                        tool,
                        attempt = attempt.label(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Calling convention succeeded"
                    );
                    return Ok(ToolPayload::from_result(result));
                }
                Err(err @ ToolInvokeError::ConnectionUnavailable { .. }) => {
                    warn!(server = %inner.server.name, tool, %err, "worker stopped mid-call");
                    return Err(err);
                }
                Err(err) if err.is_connection_loss() => {
                    warn!(server = %inner.server.name, tool, attempt = attempt.label(), %err, "lost worker mid-call");
                    if respawned || inner.supervisor.ensure_running().await.is_err() {
                        exhaustion.connection_lost = true;
                        exhaustion.last = Some(err);
                        break;
                    }
                    // Fresh worker: replay the same convention once.
                    respawned = true;
                    continue;
                }
                Err(ToolInvokeError::Timeout { .. }) => {
                    warn!(server = %inner.server.name, tool, attempt = attempt.label(), "calling convention timed out");
                    exhaustion.timeouts += 1;
                    exhaustion.last = Some(ToolInvokeError::Timeout {
                        server: inner.server.name.clone(),
                        method: call.method.clone(),
                        elapsed: started.elapsed(),
                    });
                }
                Err(err) if err.is_convention_mismatch() => {
                    debug!(server = %inner.server.name, tool, attempt = attempt.label(), %err, "calling convention rejected");
                    exhaustion.failures += 1;
                    exhaustion.last = Some(err);
                }
                Err(err @ ToolInvokeError::Worker { .. }) => {
                    warn!(server = %inner.server.name, tool, attempt = attempt.label(), %err, "calling convention answered with an error");
                    exhaustion.failures += 1;
                    exhaustion.worker_error = Some(err);
                }
                Err(err) => {
                    warn!(server = %inner.server.name, tool, attempt = attempt.label(), %err, "calling convention failed");
                    exhaustion.failures += 1;
                    exhaustion.last = Some(err);
                }
            }
            attempts.next();
        }

        inner.exhausted(tool, &arguments, exhaustion, started.elapsed())
    }
}

impl InvokerInner {
    async fn catalog_until(&self, deadline: Instant) -> Result<ToolCatalog, ToolInvokeError> {
        if let Some(cached) = self.catalog.get() {
            return Ok(cached);
        }

        let _guard = self.discovery.lock().await;
        if let Some(cached) = self.catalog.get() {
            return Ok(cached);
        }

        if let Some(tools) = self.fallback.as_ref().and_then(|provider| provider.catalog()) {
            debug!(server = %self.server.name, kind = %self.server.kind, "using built-in tool catalog");
            return Ok(self.catalog.store(self.catalog.epoch(), tools));
        }

        self.supervisor.ensure_running().await?;
        let epoch = self.catalog.epoch();
        info!(server = %self.server.name, method = %self.server.discovery_method, "Discovering tools");
        let result = self
            .request(&self.server.discovery_method, &json!({}), deadline)
            .await?;
        let tools = catalog::parse_catalog(&self.server.name, &result)?;
        info!(server = %self.server.name, tools = tools.len(), "Discovered tools");
        Ok(self.catalog.store(epoch, tools))
    }

    async fn request(&self, method: &str, params: &Value, deadline: Instant) -> Result<Value, ToolInvokeError> {
        let handle = self.supervisor.dispatch(method, params, deadline).await?;
        self.correlator.await_completion(handle, deadline).await
    }

    fn exhausted(
        &self,
        tool: &str,
        arguments: &Value,
        exhaustion: Exhaustion,
        elapsed: Duration,
    ) -> Result<ToolPayload, ToolInvokeError> {
        if self.server.placeholders {
            if let Some(payload) = self
                .fallback
                .as_ref()
                .and_then(|provider| provider.placeholder(tool, arguments))
            {
                warn!(server = %self.server.name, tool, "All calling conventions failed; returning placeholder");
                return Ok(payload);
            }
        }

        warn!(server = %self.server.name, tool, "All calling conventions failed");
        if exhaustion.connection_lost {
            let reason = exhaustion
                .last
                .map(|err| err.to_string())
                .unwrap_or_else(|| "worker connection lost".to_string());
            return Err(self.unavailable(reason));
        }
        if let Some(err) = exhaustion.worker_error {
            return Err(err);
        }
        if exhaustion.failures == 0 && exhaustion.timeouts > 0 {
            return Err(ToolInvokeError::Timeout {
                server: self.server.name.clone(),
                method: tool.to_string(),
                elapsed,
            });
        }
        Err(ToolInvokeError::AllAttemptsFailed {
            server: self.server.name.clone(),
            tool: tool.to_string(),
            last: exhaustion
                .last
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no calling convention applied".to_string()),
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::ConnectionUnavailable {
            server: self.server.name.clone(),
            reason: reason.into(),
        }
    }
}

fn is_error_result(result: &Value) -> bool {
    result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
