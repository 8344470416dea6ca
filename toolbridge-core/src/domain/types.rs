use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Lifecycle of a supervised worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No spawn has been attempted yet.
    NotStarted,
    /// A spawn is in progress and the start-up grace period has not elapsed.
    Starting,
    /// The process is alive and its output pumps are attached.
    Running,
    /// The process exited unexpectedly; the next use respawns it.
    Degraded,
    /// The process was stopped, failed to spawn, or died during start-up.
    Terminated,
}

impl WorkerState {
    pub fn is_running(self) -> bool {
        matches!(self, WorkerState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerState::NotStarted => "not_started",
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Degraded => "degraded",
            WorkerState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized successful tool output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolPayload {
    Text(String),
    Structured(Value),
}

impl ToolPayload {
    /// Normalizes a raw `result` member from the worker.
    ///
    /// Plain strings stay text. Objects carrying a `content` array made only of
    /// text items are flattened into newline-joined text. Everything else is
    /// kept as structured JSON.
    pub fn from_result(value: Value) -> Self {
        match value {
            Value::String(text) => ToolPayload::Text(text),
            Value::Object(ref map) => match map.get("content").and_then(Value::as_array) {
                Some(items) if !items.is_empty() => {
                    let texts: Option<Vec<&str>> = items
                        .iter()
                        .map(|item| item.get("text").and_then(Value::as_str))
                        .collect();
                    match texts {
                        Some(texts) => ToolPayload::Text(texts.join("\n")),
                        None => ToolPayload::Structured(value),
                    }
                }
                _ => ToolPayload::Structured(value),
            },
            other => ToolPayload::Structured(other),
        }
    }

    /// Text rendering; structured values are pretty-printed JSON.
    pub fn to_text(&self) -> String {
        match self {
            ToolPayload::Text(text) => text.clone(),
            ToolPayload::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            ToolPayload::Text(text) => Value::String(text.clone()),
            ToolPayload::Structured(value) => value.clone(),
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ToolPayload::Structured(value) => Some(value),
            ToolPayload::Text(_) => None,
        }
    }
}
