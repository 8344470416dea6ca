use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "toolbridge",
    version,
    about = "Call tools exposed by stdio worker processes"
)]
pub struct Cli {
    /// Configuration file path (defaults to config/bridge.toml)
    #[arg(long, short, global = true)]
    pub config: Option<String>,
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the tool catalog of a worker
    List {
        #[arg(long, short)]
        server: Option<String>,
    },
    /// Call one tool and print its result
    Call {
        tool: String,
        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        arguments: String,
        #[arg(long, short)]
        server: Option<String>,
        /// Overall deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// List the built-in worker presets
    Presets,
    /// Serve JSON-lines requests on stdin/stdout
    Stdio,
}
