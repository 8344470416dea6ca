mod cli;

use clap::Parser;
use cli::{Cli, Command};
use serde_json::{Value, json};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use toolbridge_core::config::PRESETS;
use toolbridge_core::{AppConfig, ServerManager, ToolServerInterface, stdio};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    debug!(command = ?cli.command, config = ?cli.config, "CLI arguments parsed");

    if let Command::Presets = cli.command {
        for preset in &PRESETS {
            let mut line = format!("{:<8} {} {}", preset.name, preset.command, preset.args.join(" "));
            if !preset.required_env.is_empty() {
                line.push_str(&format!("  [requires {}]", preset.required_env.join(", ")));
            }
            println!("{line}\n         {}", preset.description);
        }
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref().map(Path::new))?;
    info!(servers = config.servers.len(), "Loaded bridge configuration");
    let manager = Arc::new(ServerManager::new(config.servers.clone()));

    let outcome = run(&cli.command, &config, &manager).await;
    manager.shutdown_all().await;
    info!("Bridge execution finished");
    outcome
}

async fn run(command: &Command, config: &AppConfig, manager: &Arc<ServerManager>) -> Result<(), Box<dyn Error>> {
    match command {
        Command::List { server } => {
            let server = pick_server(config, server.as_deref())?;
            let tools = manager.list_tools(server).await?;
            println!("{}", serde_json::to_string_pretty(tools.as_ref())?);
        }
        Command::Call {
            tool,
            arguments,
            server,
            timeout_ms,
        } => {
            let server = pick_server(config, server.as_deref())?;
            let arguments: Value = serde_json::from_str(arguments)?;
            let payload = match timeout_ms {
                Some(ms) => {
                    manager
                        .call_tool_with_timeout(server, tool, arguments, Duration::from_millis(*ms))
                        .await?
                }
                None => manager.invoke_tool(server, tool, arguments).await?,
            };
            let output = json!({ "server": server, "tool": tool, "result": payload });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Stdio => {
            info!("Entering STDIO mode; awaiting JSON line input");
            let default_server = config.pick_server(None).map(str::to_string);
            stdio::run(Arc::clone(manager), default_server).await?;
        }
        Command::Presets => {}
    }
    Ok(())
}

fn pick_server<'a>(config: &'a AppConfig, requested: Option<&'a str>) -> Result<&'a str, Box<dyn Error>> {
    config
        .pick_server(requested)
        .ok_or_else(|| "no server given; pass --server or set default_server".into())
}

fn init_tracing(default_level: &str) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
