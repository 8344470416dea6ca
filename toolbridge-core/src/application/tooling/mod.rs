//! Process-backed tool bridge.
//!
//! A [`ToolInvoker`] drives one external worker over its stdio pipes:
//!
//! - [`ProcessSupervisor`] spawns, probes and terminates the worker
//! - `pump` reads the worker's stdout and stderr on dedicated tasks
//! - [`RequestCorrelator`] pairs responses with waiting callers by id
//! - [`ToolCatalogCache`] memoizes discovered tool descriptors
//! - [`CallAttempt`] lists the wire encodings tried for each call
//! - [`FallbackProvider`] supplies vendor catalogs and placeholders
//!
//! [`ServerManager`] keeps one invoker per configured worker name.

mod attempt;
mod catalog;
mod correlator;
mod error;
pub mod fallback;
mod interface;
mod invoker;
mod manager;
mod pump;
mod supervisor;
mod wire;

pub use attempt::{CALL_ATTEMPTS, CallAttempt, EncodedCall};
pub use catalog::ToolCatalogCache;
pub use correlator::{CompletionHandle, RequestCorrelator};
pub use error::ToolInvokeError;
pub use fallback::{FallbackProvider, FallbackRegistry};
pub use interface::{ToolCatalog, ToolDescriptor, ToolServerInterface};
pub use invoker::ToolInvoker;
pub use manager::ServerManager;
pub use pump::PumpStats;
pub use supervisor::ProcessSupervisor;
