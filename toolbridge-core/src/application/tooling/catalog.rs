use super::error::ToolInvokeError;
use super::interface::{ToolCatalog, ToolDescriptor};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Memoized tool catalog for a single worker.
///
/// Invalidation bumps an epoch; a discovery that started before the bump is
/// not allowed to repopulate the cache.
pub struct ToolCatalogCache {
    server: String,
    entry: Mutex<Option<ToolCatalog>>,
    epoch: AtomicU64,
}

impl ToolCatalogCache {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            entry: Mutex::new(None),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> Option<ToolCatalog> {
        self.lock().clone()
    }

    /// Epoch to pass back to [`ToolCatalogCache::store`] once a fetch completes.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Caches `tools` unless the cache was invalidated since `epoch` was read.
    /// The returned catalog is what callers should hand out either way.
    pub fn store(&self, epoch: u64, tools: Vec<ToolDescriptor>) -> ToolCatalog {
        let catalog = Arc::new(tools);
        let mut entry = self.lock();
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *entry = Some(Arc::clone(&catalog));
            debug!(server = %self.server, tools = catalog.len(), "cached tool catalog");
        } else {
            debug!(server = %self.server, "catalog went stale during discovery; not caching");
        }
        catalog
    }

    pub fn invalidate(&self) {
        let mut entry = self.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if entry.take().is_some() {
            debug!(server = %self.server, "tool catalog invalidated");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ToolCatalog>> {
        self.entry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parses a discovery result into descriptors.
///
/// Accepts either a bare array or an object with a `tools` array. The whole
/// result is rejected if any entry is unusable, so a partial catalog is never
/// produced.
pub(crate) fn parse_catalog(server: &str, result: &Value) -> Result<Vec<ToolDescriptor>, ToolInvokeError> {
    let invalid = |reason: String| ToolInvokeError::InvalidCatalog {
        server: server.to_string(),
        reason,
    };
    let entries = match result {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("missing 'tools' array".to_string()))?,
        _ => return Err(invalid("expected an array of tools".to_string())),
    };

    let mut seen = HashSet::new();
    let mut tools = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let descriptor: ToolDescriptor = serde_json::from_value(entry.clone())
            .map_err(|err| invalid(format!("entry {index}: {err}")))?;
        if descriptor.name.trim().is_empty() {
            return Err(invalid(format!("entry {index} has an empty name")));
        }
        if !seen.insert(descriptor.name.clone()) {
            return Err(invalid(format!("duplicate tool '{}'", descriptor.name)));
        }
        tools.push(descriptor);
    }
    Ok(tools)
}
