// Scripted stdio worker used by the integration suites.
//
// Speaks line-delimited JSON-RPC on stdin/stdout. Which calling conventions it
// understands, and how it misbehaves, is chosen with flags.

use clap::{Parser, ValueEnum};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio::sync::Mutex;

const TOOL_PREFIX: &str = "demo_";
const TOOLS: [&str; 4] = ["demo_echo", "demo_fail", "demo_slow", "demo_crash"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Convention {
    /// `callTool` with `{name, parameters}`
    Structured,
    /// tool name as method, arguments as params
    Method,
    /// tool name as method, params `{parameters}`
    Wrapped,
    /// tool name without `demo_` as method
    Unprefixed,
}

#[derive(Parser, Debug)]
#[command(name = "scripted-worker")]
struct Args {
    /// Calling conventions this worker understands
    #[arg(long, value_enum, value_delimiter = ',', default_value = "structured")]
    accept: Vec<Convention>,
    /// Write a non-protocol line to stdout and a failure line to stderr before each response
    #[arg(long)]
    noise: bool,
    /// Never answer tool calls
    #[arg(long)]
    silent_calls: bool,
    /// Exit after answering this many tool calls
    #[arg(long)]
    exit_after: Option<usize>,
    /// Exit before reading anything
    #[arg(long)]
    exit_immediately: bool,
    /// Ping the bridge at start-up
    #[arg(long)]
    ping: bool,
    /// Announce a catalog change after every tool call
    #[arg(long)]
    announce_changes: bool,
    /// Reject unknown methods with `{"type":"error","error":"..."}` and no code
    #[arg(long)]
    codeless_rejections: bool,
}

struct Worker {
    args: Args,
    out: Mutex<Stdout>,
    received: AtomicUsize,
    answered: AtomicUsize,
    discoveries: AtomicUsize,
    pinged: AtomicBool,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    if args.exit_immediately {
        eprintln!("scripted-worker: failing start-up on request");
        std::process::exit(2);
    }
    eprintln!("scripted-worker: ready");

    let worker = Arc::new(Worker {
        args,
        out: Mutex::new(tokio::io::stdout()),
        received: AtomicUsize::new(0),
        answered: AtomicUsize::new(0),
        discoveries: AtomicUsize::new(0),
        pinged: AtomicBool::new(false),
    });
    if worker.args.ping {
        worker
            .send(&json!({"jsonrpc": "2.0", "id": "worker-ping", "method": "ping"}))
            .await?;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            eprintln!("scripted-worker: ignoring unparsable line");
            continue;
        };
        let Some(method) = message.get("method").and_then(Value::as_str).map(str::to_string) else {
            if message.get("id") == Some(&json!("worker-ping")) && message.get("result").is_some() {
                worker.pinged.store(true, Ordering::SeqCst);
            }
            continue;
        };
        let id = message.get("id").cloned().unwrap_or(Value::Null);
        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            if let Err(err) = worker.handle(id, &method, params).await {
                eprintln!("scripted-worker: write failed: {err}");
            }
        });
    }
    Ok(())
}

impl Worker {
    async fn handle(&self, id: Value, method: &str, params: Value) -> std::io::Result<()> {
        if method == "listTools" {
            let n = self.discoveries.fetch_add(1, Ordering::SeqCst) + 1;
            return self.reply(id, json!({ "tools": catalog(n) })).await;
        }

        let received = self.received.fetch_add(1, Ordering::SeqCst) + 1;
        let Some((tool, arguments)) = self.decode(method, &params) else {
            if self.args.codeless_rejections {
                return self
                    .send(&json!({"id": id, "type": "error", "error": format!("Unknown method: {method}")}))
                    .await;
            }
            return self
                .error(id, -32601, &format!("method '{method}' not found"))
                .await;
        };
        if self.args.silent_calls {
            return Ok(());
        }

        match tool.as_str() {
            "demo_fail" => {
                let reason = arguments.get("reason").and_then(Value::as_str).unwrap_or("failure requested");
                let message = format!("tool failed: {reason}");
                if arguments.get("as_result").and_then(Value::as_bool).unwrap_or(false) {
                    let result = json!({"isError": true, "content": [{"type": "text", "text": message}]});
                    self.reply(id, result).await?;
                } else {
                    self.error(id, -32000, &message).await?;
                }
            }
            "demo_crash" => {
                eprintln!("scripted-worker: crashing on request");
                std::process::exit(3);
            }
            _ => {
                if tool == "demo_slow" {
                    let delay = arguments.get("delay_ms").and_then(Value::as_u64).unwrap_or(100);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                let result = json!({
                    "tool": tool,
                    "echo": arguments,
                    "received": received,
                    "pinged": self.pinged.load(Ordering::SeqCst),
                    "pid": std::process::id(),
                });
                if self.args.announce_changes {
                    self.send(&json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}))
                        .await?;
                }
                self.reply(id, result).await?;
            }
        }

        let answered = self.answered.fetch_add(1, Ordering::SeqCst) + 1;
        if self.args.exit_after.is_some_and(|limit| answered >= limit) {
            eprintln!("scripted-worker: exiting after {answered} calls");
            std::process::exit(0);
        }
        Ok(())
    }

    /// Maps a request onto `(tool, arguments)` when its convention is accepted.
    fn decode(&self, method: &str, params: &Value) -> Option<(String, Value)> {
        let accepts = |convention| self.args.accept.contains(&convention);
        if method == "callTool" {
            let tool = params.get("name")?.as_str()?;
            return (accepts(Convention::Structured) && TOOLS.contains(&tool))
                .then(|| (tool.to_string(), params.get("parameters").cloned().unwrap_or_else(|| json!({}))));
        }
        if TOOLS.contains(&method) {
            let wrapped = params.as_object().is_some_and(|map| map.len() == 1 && map.contains_key("parameters"));
            return match wrapped {
                true if accepts(Convention::Wrapped) => Some((method.to_string(), params["parameters"].clone())),
                false if accepts(Convention::Method) => Some((method.to_string(), params.clone())),
                _ => None,
            };
        }
        let prefixed = format!("{TOOL_PREFIX}{method}");
        (accepts(Convention::Unprefixed) && TOOLS.contains(&prefixed.as_str())).then(|| (prefixed, params.clone()))
    }

    async fn reply(&self, id: Value, result: Value) -> std::io::Result<()> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "result": result})).await
    }

    async fn error(&self, id: Value, code: i64, message: &str) -> std::io::Result<()> {
        self.send(&json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}))
            .await
    }

    async fn send(&self, frame: &Value) -> std::io::Result<()> {
        let mut out = self.out.lock().await;
        if self.args.noise {
            out.write_all(b"not json at all\n").await?;
            eprintln!("scripted-worker: warning, something failed (noise)");
        }
        out.write_all(format!("{frame}\n").as_bytes()).await?;
        out.flush().await
    }
}

fn catalog(discovery: usize) -> Vec<Value> {
    TOOLS
        .iter()
        .map(|name| {
            json!({
                "name": name,
                "description": format!("{name} (discovery #{discovery})"),
                "inputSchema": {"type": "object"},
            })
        })
        .collect()
}
