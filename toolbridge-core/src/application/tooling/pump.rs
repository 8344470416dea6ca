//! Background readers for the worker's output streams.
//!
//! The primary stream carries protocol frames mixed with arbitrary noise; the
//! diagnostic stream is free text. Each stream has exactly one reader, and a
//! bad line never stops it.

use super::correlator::RequestCorrelator;
use super::error::ToolInvokeError;
use super::wire::{self, InboundMessage};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const FAILURE_KEYWORDS: [&str; 3] = ["error", "exception", "fail"];
const STARTUP_KEYWORDS: [&str; 3] = ["start", "init", "ready"];

/// Traffic initiated by the worker that needs an answer or a reaction.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerEvent {
    Request { id: Value, method: String },
    Notification { method: String },
}

/// Counters reported when a primary pump finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub resolved: usize,
    pub failed: usize,
    pub unmatched: usize,
    pub unclassified: usize,
}

/// Severity a diagnostic line is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DiagnosticLevel {
    Failure,
    Startup,
    Plain,
}

/// Reads protocol frames until the stream closes.
pub(crate) async fn pump_primary<R>(
    server: &str,
    reader: R,
    correlator: &RequestCorrelator,
    events: &mpsc::UnboundedSender<WorkerEvent>,
) -> PumpStats
where
    R: AsyncRead + Unpin,
{
    let mut stats = PumpStats::default();
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(server, %err, "primary output read failed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match wire::classify(line) {
            InboundMessage::Response { id, result } => {
                if correlator.resolve(id, result) {
                    stats.resolved += 1;
                } else {
                    stats.unmatched += 1;
                }
            }
            InboundMessage::Failure { id, code, message } => {
                let error = ToolInvokeError::Worker {
                    server: server.to_string(),
                    code,
                    message,
                };
                if correlator.fail(id, error) {
                    stats.failed += 1;
                } else {
                    stats.unmatched += 1;
                }
            }
            InboundMessage::Request { id, method } => {
                let _ = events.send(WorkerEvent::Request { id, method });
            }
            InboundMessage::Notification { method } => {
                let _ = events.send(WorkerEvent::Notification { method });
            }
            InboundMessage::Unclassified { reason } => {
                stats.unclassified += 1;
                info!(server, reason, line, "worker output");
            }
        }
    }

    debug!(server, ?stats, "primary output closed");
    stats
}

/// Logs every diagnostic line until the stream closes. Returns the line count.
pub(crate) async fn pump_diagnostic<R>(server: &str, reader: R) -> usize
where
    R: AsyncRead + Unpin,
{
    let mut lines = 0;
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();

    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(server, %err, "diagnostic output read failed");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        lines += 1;
        match diagnostic_level(line) {
            DiagnosticLevel::Failure => warn!(server, line, "worker reported a failure"),
            DiagnosticLevel::Startup => info!(server, line, "worker stderr"),
            DiagnosticLevel::Plain => debug!(server, line, "worker stderr"),
        }
    }
    lines
}

pub(crate) fn diagnostic_level(line: &str) -> DiagnosticLevel {
    let lowered = line.to_lowercase();
    if FAILURE_KEYWORDS.iter().any(|word| lowered.contains(word)) {
        DiagnosticLevel::Failure
    } else if STARTUP_KEYWORDS.iter().any(|word| lowered.contains(word)) {
        DiagnosticLevel::Startup
    } else {
        DiagnosticLevel::Plain
    }
}
