use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::error::ToolInvokeError;
use crate::domain::types::ToolPayload;

/// A tool offered by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Cached set of descriptors for one worker.
pub type ToolCatalog = Arc<Vec<ToolDescriptor>>;

#[async_trait]
pub trait ToolServerInterface: Send + Sync {
    async fn list_tools(&self, server: &str) -> Result<ToolCatalog, ToolInvokeError>;

    async fn invoke_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<ToolPayload, ToolInvokeError>;
}
