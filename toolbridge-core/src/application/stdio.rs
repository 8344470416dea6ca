//! JSON-lines front end over a [`ServerManager`].
//!
//! One request per input line, one response per output line. Requests run
//! concurrently, so responses can come back out of order; the request `id` is
//! echoed for matching.

use crate::application::tooling::{ServerManager, ToolDescriptor, ToolInvokeError, ToolServerInterface};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize stdio response: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum StdioAction {
    List,
    #[default]
    Call,
}

#[derive(Debug, Deserialize)]
struct StdioRequest {
    #[serde(default)]
    id: Value,
    server: Option<String>,
    #[serde(default)]
    action: StdioAction,
    tool: Option<String>,
    #[serde(default)]
    arguments: Value,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StdioErrorBody {
    kind: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct StdioResponse {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<StdioErrorBody>,
}

impl StdioResponse {
    fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            tools: None,
            error: None,
        }
    }

    fn tools(id: Value, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            id,
            ok: true,
            result: None,
            tools: Some(tools),
            error: None,
        }
    }

    fn error(id: Value, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            tools: None,
            error: Some(StdioErrorBody {
                kind: kind.into(),
                message: message.into(),
            }),
        }
    }

    fn failure(id: Value, error: &ToolInvokeError) -> Self {
        Self::error(id, error.kind(), error.to_string())
    }
}

/// Serves process stdin/stdout until stdin closes.
pub async fn run(manager: Arc<ServerManager>, default_server: Option<String>) -> Result<(), StdioError> {
    info!("Serving JSON-lines requests on stdio");
    serve(manager, default_server, io::stdin(), io::stdout()).await?;
    Ok(())
}

/// Serves `reader` into `writer` and hands the writer back once every
/// in-flight request has been answered.
pub async fn serve<R, W>(
    manager: Arc<ServerManager>,
    default_server: Option<String>,
    reader: R,
    writer: W,
) -> Result<W, StdioError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (responses_tx, responses_rx) = mpsc::unbounded_channel::<StdioResponse>();
    let writer_task = tokio::spawn(write_responses(writer, responses_rx));
    let default_server: Option<Arc<str>> = default_server.map(Arc::from);

    let mut lines = BufReader::new(reader).lines();
    let mut in_flight = JoinSet::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Received STDIO line");
        let request = match serde_json::from_str::<StdioRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                error!(%err, "Failed to parse STDIO input line");
                let _ = responses_tx.send(StdioResponse::error(
                    Value::Null,
                    "invalid-request",
                    format!("invalid JSON request: {err}"),
                ));
                continue;
            }
        };

        let manager = Arc::clone(&manager);
        let default_server = default_server.clone();
        let responses_tx = responses_tx.clone();
        in_flight.spawn(async move {
            let response = handle_request(&manager, default_server.as_deref(), request).await;
            let _ = responses_tx.send(response);
        });
    }

    while in_flight.join_next().await.is_some() {}
    drop(responses_tx);

    match writer_task.await {
        Ok(result) => result,
        Err(join_err) => Err(StdioError::Io(std::io::Error::other(join_err))),
    }
}

async fn handle_request(
    manager: &ServerManager,
    default_server: Option<&str>,
    request: StdioRequest,
) -> StdioResponse {
    let id = request.id;
    let Some(server) = request.server.as_deref().or(default_server) else {
        return StdioResponse::error(id, "invalid-request", "no server given and no default configured");
    };

    match request.action {
        StdioAction::List => match manager.list_tools(server).await {
            Ok(tools) => StdioResponse::tools(id, tools.as_ref().clone()),
            Err(err) => StdioResponse::failure(id, &err),
        },
        StdioAction::Call => {
            let Some(tool) = request.tool.as_deref() else {
                return StdioResponse::error(id, "invalid-request", "'tool' is required for call");
            };
            let outcome = match request.timeout_ms {
                Some(ms) => {
                    manager
                        .call_tool_with_timeout(server, tool, request.arguments, Duration::from_millis(ms))
                        .await
                }
                None => manager.invoke_tool(server, tool, request.arguments).await,
            };
            match outcome {
                Ok(payload) => StdioResponse::result(id, payload.to_value()),
                Err(err) => {
                    error!(server, tool, %err, "STDIO tool call failed");
                    StdioResponse::failure(id, &err)
                }
            }
        }
    }
}

async fn write_responses<W>(
    mut writer: W,
    mut responses: mpsc::UnboundedReceiver<StdioResponse>,
) -> Result<W, StdioError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = responses.recv().await {
        let mut payload = serde_json::to_vec(&response)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }
    Ok(writer)
}
