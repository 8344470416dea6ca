//! Worker-kind specific stand-ins.
//!
//! Some workers cannot be asked for their catalog, and demo deployments want a
//! deterministic answer when no calling convention worked. Both are supplied
//! by a [`FallbackProvider`] looked up by worker kind, so the invoker itself
//! carries no vendor knowledge.

mod airbnb;

pub use airbnb::AirbnbFallback;

use super::interface::ToolDescriptor;
use crate::domain::types::ToolPayload;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub trait FallbackProvider: Send + Sync {
    /// Worker kind this provider is registered under.
    fn kind(&self) -> &str;

    /// Fixed catalog for workers whose discovery is known not to work.
    fn catalog(&self) -> Option<Vec<ToolDescriptor>> {
        None
    }

    /// Deterministic stand-in result once every calling convention failed.
    fn placeholder(&self, _tool: &str, _arguments: &Value) -> Option<ToolPayload> {
        None
    }
}

/// Providers keyed by worker kind.
#[derive(Clone, Default)]
pub struct FallbackRegistry {
    providers: HashMap<String, Arc<dyn FallbackProvider>>,
}

impl FallbackRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry containing every provider shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(AirbnbFallback));
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn FallbackProvider>) {
        self.providers.insert(provider.kind().to_string(), provider);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn FallbackProvider>> {
        self.providers.get(kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}
