//! Supervised stdio tool workers behind a single call interface.
//!
//! A worker is an external process speaking line-delimited JSON-RPC on its
//! stdin/stdout. [`ServerManager`] owns one [`ToolInvoker`] per configured
//! worker; invokers spawn lazily, discover the tool catalog once, and walk the
//! call conventions until one of them sticks.

pub mod application;
pub mod config;
pub mod constants;
pub mod domain;

pub use application::stdio;
pub use application::tooling::{
    FallbackProvider, FallbackRegistry, ServerManager, ToolCatalog, ToolDescriptor,
    ToolInvokeError, ToolInvoker, ToolServerInterface,
};
pub use config::{AppConfig, ConfigError, ServerConfig};
pub use domain::types::{ToolPayload, WorkerState};
