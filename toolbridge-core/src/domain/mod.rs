pub mod types;

pub use types::{ToolPayload, WorkerState};
