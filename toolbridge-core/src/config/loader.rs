use super::app::AppConfig;
use super::error::ConfigError;
use super::server::RawServer;
use crate::constants::{CONFIG_PATH, ENV_PATH};
use dotenvy::from_filename;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Once;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Raw configuration structure for deserialization from TOML
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    default_server: Option<String>,
    #[serde(default)]
    servers: Vec<RawServer>,
}

/// Ensures environment variables are loaded from config/.env
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        let _ = from_filename(ENV_PATH);
    });
}

/// Load and validate configuration from a file path
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    ensure_env_loaded();
    let config_path = path.unwrap_or_else(|| Path::new(CONFIG_PATH));
    debug!(path = %config_path.display(), "Reading bridge configuration file");

    let content = fs::read_to_string(config_path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: config_path.to_path_buf(),
            }
        } else {
            ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            }
        }
    })?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let parsed: RawConfig =
        toml::from_str(content).map_err(|source| ConfigError::Parse { source })?;
    validate_and_build(parsed)
}

fn validate_and_build(parsed: RawConfig) -> Result<AppConfig, ConfigError> {
    let mut names = HashSet::new();
    let mut servers = Vec::with_capacity(parsed.servers.len());
    for raw in parsed.servers {
        let server = raw.resolve()?;
        if !names.insert(server.name.clone()) {
            return Err(ConfigError::DuplicateServer { name: server.name });
        }
        servers.push(server);
    }

    if let Some(default) = &parsed.default_server {
        if !names.contains(default) {
            return Err(ConfigError::DefaultServerNotFound {
                server: default.clone(),
            });
        }
    }

    Ok(AppConfig {
        default_server: parsed.default_server,
        servers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reads_and_validates_a_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("bridge.toml");
        fs::write(
            &path,
            "default_server = \"one\"\n[[servers]]\nname = \"one\"\ncommand = \"worker\"\n",
        )
        .expect("write");

        let config = load_config(Some(&path)).expect("config");
        assert_eq!(config.default_server.as_deref(), Some("one"));
        assert_eq!(config.servers.len(), 1);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse_config(
            "[[servers]]\nname = \"a\"\ncommand = \"x\"\n[[servers]]\nname = \"a\"\ncommand = \"y\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateServer { ref name } if name == "a"));
    }

    #[test]
    fn default_server_must_exist() {
        let err = parse_config("default_server = \"b\"\n[[servers]]\nname = \"a\"\ncommand = \"x\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::DefaultServerNotFound { .. }));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
