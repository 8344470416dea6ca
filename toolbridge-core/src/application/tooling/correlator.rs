use super::error::ToolInvokeError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

pub(crate) type Completion = Result<Value, ToolInvokeError>;

/// Matches worker responses back to the call that produced them.
///
/// Every id handed out by [`RequestCorrelator::issue`] is completed exactly once:
/// by [`resolve`](RequestCorrelator::resolve), [`fail`](RequestCorrelator::fail),
/// or by the deadline expiring. Whoever removes the entry from the pending map
/// owns the completion, so late or duplicate responses find nothing and are dropped.
pub struct RequestCorrelator {
    server: String,
    state: Mutex<CorrelatorState>,
}

struct CorrelatorState {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

struct PendingRequest {
    method: String,
    created_at: Instant,
    deadline: Instant,
    sender: oneshot::Sender<Completion>,
}

/// Awaitable side of an issued request.
#[derive(Debug)]
pub struct CompletionHandle {
    id: u64,
    receiver: oneshot::Receiver<Completion>,
}

impl CompletionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl RequestCorrelator {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            state: Mutex::new(CorrelatorState {
                next_id: 1,
                pending: HashMap::new(),
            }),
        }
    }

    /// Allocates a fresh id and registers a pending completion for it.
    pub fn issue(&self, method: &str, deadline: Instant) -> (u64, CompletionHandle) {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();
        self.reap_locked(&mut state, Instant::now());

        let mut id = state.next_id;
        while id == 0 || state.pending.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        state.next_id = id.wrapping_add(1);
        state.pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                created_at: Instant::now(),
                deadline,
                sender,
            },
        );
        drop(state);

        debug!(server = %self.server, request_id = id, method, "issued request id");
        (id, CompletionHandle { id, receiver })
    }

    /// Completes `id` with a successful result. Returns false if nothing was pending.
    pub fn resolve(&self, id: u64, result: Value) -> bool {
        self.complete(id, Ok(result))
    }

    /// Completes `id` with an error. Returns false if nothing was pending.
    pub fn fail(&self, id: u64, error: ToolInvokeError) -> bool {
        self.complete(id, Err(error))
    }

    fn complete(&self, id: u64, completion: Completion) -> bool {
        let entry = self.lock().pending.remove(&id);
        match entry {
            Some(pending) => {
                debug!(
                    server = %self.server,
                    request_id = id,
                    method = %pending.method,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    ok = completion.is_ok(),
                    "completing request"
                );
                if pending.sender.send(completion).is_err() {
                    debug!(server = %self.server, request_id = id, "waiter already gone");
                }
                true
            }
            None => {
                warn!(
                    server = %self.server,
                    request_id = id,
                    "dropping response for unknown or expired request"
                );
                false
            }
        }
    }

    /// Waits for `handle` to complete or for `deadline` to pass.
    ///
    /// On expiry the waiter removes its own entry, so a response arriving later
    /// cannot revive the call.
    pub async fn await_completion(&self, handle: CompletionHandle, deadline: Instant) -> Completion {
        let CompletionHandle { id, mut receiver } = handle;
        let started = Instant::now();
        match timeout_at(deadline, &mut receiver).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_)) => Err(ToolInvokeError::Terminated {
                server: self.server.clone(),
            }),
            Err(_) => {
                let removed = self.lock().pending.remove(&id);
                match removed {
                    Some(pending) => {
                        warn!(
                            server = %self.server,
                            request_id = id,
                            method = %pending.method,
                            "request timed out"
                        );
                        Err(self.timeout_error(&pending.method, started.elapsed()))
                    }
                    // Completed between the timer firing and us taking the lock.
                    None => match receiver.try_recv() {
                        Ok(completion) => completion,
                        Err(_) => Err(ToolInvokeError::Terminated {
                            server: self.server.clone(),
                        }),
                    },
                }
            }
        }
    }

    /// Fails every pending request, e.g. when the worker exits.
    pub fn fail_all(&self, make_error: impl Fn() -> ToolInvokeError) -> usize {
        let drained: Vec<(u64, PendingRequest)> = self.lock().pending.drain().collect();
        let count = drained.len();
        for (id, pending) in drained {
            debug!(server = %self.server, request_id = id, "failing pending request");
            let _ = pending.sender.send(Err(make_error()));
        }
        count
    }

    /// Times out every entry whose deadline has passed.
    pub fn reap_expired(&self) -> usize {
        let mut state = self.lock();
        self.reap_locked(&mut state, Instant::now())
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.lock().pending.contains_key(&id)
    }

    fn reap_locked(&self, state: &mut CorrelatorState, now: Instant) -> usize {
        let expired: Vec<u64> = state
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now || pending.sender.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(pending) = state.pending.remove(id) {
                debug!(server = %self.server, request_id = id, "reaping expired request");
                let elapsed = now.saturating_duration_since(pending.created_at);
                let _ = pending
                    .sender
                    .send(Err(self.timeout_error(&pending.method, elapsed)));
            }
        }
        expired.len()
    }

    fn timeout_error(&self, method: &str, elapsed: Duration) -> ToolInvokeError {
        ToolInvokeError::Timeout {
            server: self.server.clone(),
            method: method.to_string(),
            elapsed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CorrelatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let correlator = RequestCorrelator::new("demo");
        let (first, _a) = correlator.issue("a", far());
        let (second, _b) = correlator.issue("b", far());
        assert!(second > first);
        assert_eq!(correlator.pending_count(), 2);
    }

    #[test]
    fn wrapping_skips_zero_and_live_ids() {
        let correlator = RequestCorrelator::new("demo");
        let (one, _keep) = correlator.issue("a", far());
        assert_eq!(one, 1);
        correlator.lock().next_id = u64::MAX;
        let (max, _h1) = correlator.issue("b", far());
        assert_eq!(max, u64::MAX);
        let (next, _h2) = correlator.issue("c", far());
        assert_eq!(next, 2, "0 is reserved and 1 is still pending");
    }

    #[tokio::test]
    async fn resolve_completes_exactly_once() {
        let correlator = RequestCorrelator::new("demo");
        let (id, handle) = correlator.issue("callTool", far());
        assert!(correlator.resolve(id, json!({"ok": true})));
        assert!(!correlator.resolve(id, json!({"ok": false})));
        assert!(!correlator.fail(
            id,
            ToolInvokeError::Terminated {
                server: "demo".into()
            }
        ));
        let value = correlator.await_completion(handle, far()).await.expect("resolved");
        assert_eq!(value, json!({"ok": true}));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn fail_delivers_the_error() {
        let correlator = RequestCorrelator::new("demo");
        let (id, handle) = correlator.issue("callTool", far());
        correlator.fail(
            id,
            ToolInvokeError::Worker {
                server: "demo".into(),
                code: Some(-32000),
                message: "nope".into(),
            },
        );
        let err = correlator.await_completion(handle, far()).await.unwrap_err();
        assert_eq!(err.kind(), "worker-error");
    }

    #[tokio::test]
    async fn unknown_ids_leave_other_entries_alone() {
        let correlator = RequestCorrelator::new("demo");
        let (id, handle) = correlator.issue("callTool", far());
        assert!(!correlator.resolve(id + 100, json!("stray")));
        assert!(correlator.is_pending(id));
        correlator.resolve(id, json!("mine"));
        let value = correlator.await_completion(handle, far()).await.expect("resolved");
        assert_eq!(value, json!("mine"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_removes_the_entry_and_late_responses_are_dropped() {
        let correlator = RequestCorrelator::new("demo");
        let deadline = Instant::now() + Duration::from_millis(250);
        let (id, handle) = correlator.issue("slow", deadline);
        let err = correlator.await_completion(handle, deadline).await.unwrap_err();
        assert!(matches!(err, ToolInvokeError::Timeout { ref method, .. } if method == "slow"));
        assert!(!correlator.is_pending(id));
        assert!(!correlator.resolve(id, json!("late")));
    }

    #[tokio::test(start_paused = true)]
    async fn reaping_times_out_abandoned_requests() {
        let correlator = RequestCorrelator::new("demo");
        let (_, handle) = correlator.issue("slow", Instant::now() + Duration::from_millis(10));
        let (_, _live) = correlator.issue("fast", far());
        tokio::time::advance(Duration::from_millis(20)).await;
        assert_eq!(correlator.reap_expired(), 1);
        assert_eq!(correlator.pending_count(), 1);
        let err = correlator.await_completion(handle, far()).await.unwrap_err();
        assert_eq!(err.kind(), "timeout");
    }

    #[tokio::test]
    async fn fail_all_drains_everything() {
        let correlator = RequestCorrelator::new("demo");
        let (_, a) = correlator.issue("a", far());
        let (_, b) = correlator.issue("b", far());
        let failed = correlator.fail_all(|| ToolInvokeError::Terminated {
            server: "demo".into(),
        });
        assert_eq!(failed, 2);
        for handle in [a, b] {
            let err = correlator.await_completion(handle, far()).await.unwrap_err();
            assert_eq!(err.kind(), "terminated");
        }
    }

    #[tokio::test]
    async fn concurrent_waiters_receive_their_own_results() {
        let correlator = Arc::new(RequestCorrelator::new("demo"));
        let mut waiters = Vec::new();
        let mut ids = Vec::new();
        for n in 0..16u64 {
            let (id, handle) = correlator.issue("echo", far());
            ids.push((id, n));
            let correlator = Arc::clone(&correlator);
            waiters.push(tokio::spawn(async move {
                (id, correlator.await_completion(handle, far()).await)
            }));
        }
        for (id, n) in ids.into_iter().rev() {
            correlator.resolve(id, json!(n));
        }
        for (index, waiter) in waiters.into_iter().enumerate() {
            let (_, result) = waiter.await.expect("join");
            assert_eq!(result.expect("resolved"), json!(index as u64));
        }
    }
}
