use super::catalog::ToolCatalogCache;
use super::correlator::{CompletionHandle, RequestCorrelator};
use super::error::ToolInvokeError;
use super::pump::{self, WorkerEvent};
use super::wire;
use crate::config::ServerConfig;
use crate::domain::types::WorkerState;
use serde_json::{Value, json};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

const TOOLS_CHANGED_NOTIFICATION: &str = "notifications/tools/list_changed";
const METHOD_NOT_FOUND: i64 = -32601;

/// Owns the worker process: spawning, liveness, and shutdown.
pub struct ProcessSupervisor {
    server: ServerConfig,
    correlator: Arc<RequestCorrelator>,
    catalog: Arc<ToolCatalogCache>,
    lifecycle: AsyncMutex<Lifecycle>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    status: Mutex<Status>,
    spawns: AtomicU64,
}

#[derive(Default)]
struct Lifecycle {
    child: Option<Child>,
}

struct Status {
    state: WorkerState,
    generation: u64,
    pid: Option<u32>,
    exit_code: Option<i32>,
}

impl ProcessSupervisor {
    pub fn new(
        server: ServerConfig,
        correlator: Arc<RequestCorrelator>,
        catalog: Arc<ToolCatalogCache>,
    ) -> Self {
        Self {
            server,
            correlator,
            catalog,
            lifecycle: AsyncMutex::new(Lifecycle::default()),
            writer: AsyncMutex::new(None),
            status: Mutex::new(Status {
                state: WorkerState::NotStarted,
                generation: 0,
                pid: None,
                exit_code: None,
            }),
            spawns: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.status().state
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status().exit_code
    }

    pub fn pid(&self) -> Option<u32> {
        self.status().pid
    }

    /// Number of spawn attempts made so far.
    pub fn spawn_count(&self) -> u64 {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Makes sure a live worker is attached, spawning one if needed.
    pub async fn ensure_running(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        let mut lifecycle = self.lifecycle.lock().await;

        if self.state().is_running() && self.probe(&mut lifecycle) {
            return Ok(());
        }

        self.discard_child(&mut lifecycle).await;
        let generation = {
            let mut status = self.status();
            status.generation += 1;
            status.exit_code = None;
            status.pid = None;
            self.transition(&mut status, WorkerState::Starting);
            status.generation
        };
        self.spawns.fetch_add(1, Ordering::SeqCst);
        info!(
            server = %self.server.name,
            command = %self.server.command_line(),
            generation,
            "Starting worker process"
        );

        let mut command = Command::new(&self.server.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.server.workdir {
            command.current_dir(dir);
        }
        if !self.server.args.is_empty() {
            command.args(&self.server.args);
        }
        for (key, value) in &self.server.env {
            command.env(key, value);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                error!(server = %self.server.name, %source, "failed to spawn worker");
                self.set_state(WorkerState::Terminated);
                return Err(self.unavailable(format!("spawn failed: {source}")));
            }
        };

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill().await;
            self.set_state(WorkerState::Terminated);
            return Err(self.unavailable("failed to capture worker stdio"));
        };
        self.status().pid = child.id();
        *self.writer.lock().await = Some(BufWriter::new(stdin));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let server = self.server.name.clone();
        let correlator = Arc::clone(&self.correlator);
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            pump::pump_primary(&server, stdout, &correlator, &events_tx).await;
            if let Some(supervisor) = weak.upgrade() {
                supervisor.on_primary_closed(generation);
            }
        });
        let server = self.server.name.clone();
        tokio::spawn(async move {
            pump::pump_diagnostic(&server, stderr).await;
        });
        tokio::spawn(handle_worker_events(Arc::downgrade(self), events_rx));

        lifecycle.child = Some(child);
        sleep(self.server.startup_grace).await;

        let exited = match lifecycle.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => None,
            Some(Ok(Some(status))) => Some(status.code()),
            Some(Err(err)) => {
                warn!(server = %self.server.name, %err, "failed to poll worker status");
                Some(None)
            }
            None => Some(None),
        };
        let still_starting = self.state() == WorkerState::Starting;

        match exited {
            None if still_starting => {
                self.set_state(WorkerState::Running);
                info!(server = %self.server.name, pid = ?self.pid(), "Worker process running");
                Ok(())
            }
            exit_code => {
                let exit_code = exit_code.flatten();
                error!(server = %self.server.name, ?exit_code, "worker exited during start-up");
                self.discard_child(&mut lifecycle).await;
                {
                    let mut status = self.status();
                    status.exit_code = exit_code;
                    self.transition(&mut status, WorkerState::Terminated);
                }
                self.fail_pending();
                Err(self.unavailable(match exit_code {
                    Some(code) => format!("worker exited during start-up with code {code}"),
                    None => "worker exited during start-up".to_string(),
                }))
            }
        }
    }

    /// Liveness check: true when the worker is running and has not exited.
    pub async fn is_healthy(&self) -> bool {
        if !self.state().is_running() {
            return false;
        }
        let mut lifecycle = self.lifecycle.lock().await;
        self.probe(&mut lifecycle)
    }

    /// Asks the worker to exit, waits up to `grace`, then kills it.
    ///
    /// In-flight calls fail with `ConnectionUnavailable`, which callers do not
    /// answer with a respawn.
    pub async fn terminate(&self, grace: Duration) {
        let mut lifecycle = self.lifecycle.lock().await;
        // Terminated before stdin closes, so the pump's EOF is not a crash.
        self.set_state(WorkerState::Terminated);
        self.fail_pending_stopped();
        // Closing stdin is the cooperative signal for stdio workers.
        self.writer.lock().await.take();

        let mut exit_code = None;
        if let Some(mut child) = lifecycle.child.take() {
            request_termination(&self.server.name, &child);
            match timeout(grace, child.wait()).await {
                Ok(Ok(status)) => exit_code = status.code(),
                Ok(Err(err)) => {
                    warn!(server = %self.server.name, %err, "failed waiting for worker exit");
                }
                Err(_) => {
                    warn!(
                        server = %self.server.name,
                        grace_ms = grace.as_millis() as u64,
                        "worker ignored termination request; killing"
                    );
                    if let Err(err) = child.kill().await {
                        debug!(server = %self.server.name, %err, "failed to kill worker (may have already exited)");
                    }
                }
            }
        }

        {
            let mut status = self.status();
            if exit_code.is_some() {
                status.exit_code = exit_code;
            }
            self.transition(&mut status, WorkerState::Terminated);
        }
        self.fail_pending_stopped();
        info!(server = %self.server.name, ?exit_code, "Worker process terminated");
    }

    /// Registers a request and writes its frame. Id allocation and the write
    /// happen under the writer lock, so frames leave in id order.
    pub(crate) async fn dispatch(
        &self,
        method: &str,
        params: &Value,
        deadline: Instant,
    ) -> Result<CompletionHandle, ToolInvokeError> {
        let mut writer = self.writer.lock().await;
        let Some(stream) = writer.as_mut() else {
            return Err(self.unavailable("worker input is closed"));
        };

        let (id, handle) = self.correlator.issue(method, deadline);
        let frame = match wire::encode_request(id, method, params) {
            Ok(frame) => frame,
            Err(source) => {
                self.correlator.fail(
                    id,
                    ToolInvokeError::InvalidJson {
                        server: self.server.name.clone(),
                        source,
                    },
                );
                return Ok(handle);
            }
        };
        debug!(server = %self.server.name, request_id = id, method, "Sending request to worker");
        if let Err(err) = write_frame(stream, &frame).await {
            warn!(server = %self.server.name, request_id = id, %err, "failed to write request");
            self.correlator.fail(
                id,
                ToolInvokeError::Transport {
                    server: self.server.name.clone(),
                    message: err.to_string(),
                },
            );
        }
        Ok(handle)
    }

    async fn send_frame(&self, frame: &str) -> Result<(), ToolInvokeError> {
        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| self.unavailable("worker input is closed"))?;
        write_frame(stream, frame)
            .await
            .map_err(|source| ToolInvokeError::Transport {
                server: self.server.name.clone(),
                message: source.to_string(),
            })
    }

    async fn answer_worker_request(&self, id: Value, method: &str) -> Result<(), ToolInvokeError> {
        let encoded = match method {
            "ping" => wire::encode_result(id, json!({})),
            other => {
                warn!(server = %self.server.name, method = other, "worker sent unsupported request");
                wire::encode_error(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("bridge does not implement method '{other}'"),
                )
            }
        };
        let frame = encoded.map_err(|source| ToolInvokeError::InvalidJson {
            server: self.server.name.clone(),
            source,
        })?;
        self.send_frame(&frame).await
    }

    fn on_primary_closed(&self, generation: u64) {
        let degraded = {
            let mut status = self.status();
            let live = matches!(status.state, WorkerState::Running | WorkerState::Starting);
            if status.generation == generation && live {
                self.transition(&mut status, WorkerState::Degraded);
                true
            } else {
                false
            }
        };
        if degraded {
            warn!(server = %self.server.name, generation, "worker output closed unexpectedly");
            self.fail_pending();
        }
    }

    /// Returns true while the child is alive; flips to `Degraded` otherwise.
    fn probe(&self, lifecycle: &mut Lifecycle) -> bool {
        let exit = match lifecycle.child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => return true,
            Some(Ok(Some(status))) => status.code(),
            Some(Err(err)) => {
                warn!(server = %self.server.name, %err, "liveness probe failed");
                None
            }
            None => None,
        };
        let mut status = self.status();
        if status.state.is_running() {
            warn!(server = %self.server.name, exit_code = ?exit, "worker exited unexpectedly");
            status.exit_code = exit;
            self.transition(&mut status, WorkerState::Degraded);
            drop(status);
            self.fail_pending();
        }
        false
    }

    async fn discard_child(&self, lifecycle: &mut Lifecycle) {
        self.writer.lock().await.take();
        if let Some(mut child) = lifecycle.child.take() {
            if let Err(err) = child.kill().await {
                debug!(server = %self.server.name, %err, "failed to kill worker (may have already exited)");
            }
        }
    }

    fn fail_pending(&self) {
        let failed = self.correlator.fail_all(|| ToolInvokeError::Terminated {
            server: self.server.name.clone(),
        });
        if failed > 0 {
            warn!(server = %self.server.name, failed, "failed in-flight requests");
        }
    }

    fn fail_pending_stopped(&self) {
        let failed = self
            .correlator
            .fail_all(|| self.unavailable("worker was stopped"));
        if failed > 0 {
            warn!(server = %self.server.name, failed, "failed in-flight requests on shutdown");
        }
    }

    fn set_state(&self, state: WorkerState) {
        let mut status = self.status();
        self.transition(&mut status, state);
    }

    fn transition(&self, status: &mut Status, next: WorkerState) {
        let previous = status.state;
        status.state = next;
        if previous != next {
            debug!(server = %self.server.name, from = %previous, to = %next, "worker state change");
        }
        if previous.is_running() && !next.is_running() {
            self.catalog.invalidate();
        }
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unavailable(&self, reason: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::ConnectionUnavailable {
            server: self.server.name.clone(),
            reason: reason.into(),
        }
    }
}

async fn handle_worker_events(
    supervisor: Weak<ProcessSupervisor>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(supervisor) = supervisor.upgrade() else {
            break;
        };
        match event {
            WorkerEvent::Request { id, method } => {
                if let Err(err) = supervisor.answer_worker_request(id, &method).await {
                    warn!(server = %supervisor.server.name, %err, "failed to answer worker request");
                }
            }
            WorkerEvent::Notification { method } => {
                debug!(server = %supervisor.server.name, method, "received notification from worker");
                if method == TOOLS_CHANGED_NOTIFICATION {
                    supervisor.catalog.invalidate();
                }
            }
        }
    }
}

async fn write_frame(stream: &mut BufWriter<ChildStdin>, frame: &str) -> std::io::Result<()> {
    stream.write_all(frame.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await
}

#[cfg(unix)]
fn request_termination(server: &str, child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(server, %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn request_termination(_server: &str, _child: &Child) {}
