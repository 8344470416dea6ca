use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("failed to read config from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },

    #[error("server entry is missing a name")]
    MissingName,

    #[error("server '{server}' has no command and no preset")]
    MissingCommand { server: String },

    #[error("server '{server}' uses unknown preset '{preset}'")]
    UnknownPreset { server: String, preset: String },

    #[error("server '{server}' requires environment variable '{variable}'")]
    MissingApiKey { server: String, variable: String },

    #[error("server '{name}' is configured more than once")]
    DuplicateServer { name: String },

    #[error("default server '{server}' not found in configured servers")]
    DefaultServerNotFound { server: String },

    #[error("server '{server}' has an invalid '{field}': {reason}")]
    InvalidTimeout {
        server: String,
        field: &'static str,
        reason: String,
    },
}
