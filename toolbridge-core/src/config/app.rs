use super::error::ConfigError;
use super::server::ServerConfig;
use std::path::Path;

/// Bridge configuration loaded from bridge.toml
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub default_server: Option<String>,
    pub servers: Vec<ServerConfig>,
}

impl AppConfig {
    /// Load configuration from a file path (or default path if None)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        super::loader::load_config(path)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        super::loader::parse_config(content)
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }

    /// Resolve an explicit server name, falling back to `default_server`,
    /// then to the only configured server.
    pub fn pick_server<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested
            .or(self.default_server.as_deref())
            .or_else(|| match self.servers.as_slice() {
                [only] => Some(only.name.as_str()),
                _ => None,
            })
    }
}
