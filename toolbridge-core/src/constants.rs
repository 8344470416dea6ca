//! Application constants
//!
//! Single source of truth for paths and protocol defaults.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/bridge.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

/// Worker kind used when neither `kind` nor a preset says otherwise
pub const DEFAULT_WORKER_KIND: &str = "generic";

/// Method used to ask a worker for its tool catalog
pub const DEFAULT_DISCOVERY_METHOD: &str = "listTools";

/// How long a freshly spawned worker must stay alive before it counts as running
pub const DEFAULT_STARTUP_GRACE_MS: u64 = 1_000;

/// Deadline for a single calling convention
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;

/// Deadline for a whole tool call across all calling conventions
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 60_000;

/// How long a worker gets to exit after a termination request
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;
