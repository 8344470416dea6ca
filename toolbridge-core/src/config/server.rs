use super::error::ConfigError;
use super::preset;
use crate::constants::{
    DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_CALL_TIMEOUT_MS, DEFAULT_DISCOVERY_METHOD,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STARTUP_GRACE_MS, DEFAULT_WORKER_KIND,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to launch and talk to one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    /// Selects the fallback provider (hardcoded catalog, placeholders).
    pub kind: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub discovery_method: String,
    pub startup_grace: Duration,
    pub attempt_timeout: Duration,
    pub call_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Allow placeholder payloads when every calling convention fails.
    pub placeholders: bool,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, command: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind: DEFAULT_WORKER_KIND.to_string(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            workdir: None,
            discovery_method: DEFAULT_DISCOVERY_METHOD.to_string(),
            startup_grace: Duration::from_millis(DEFAULT_STARTUP_GRACE_MS),
            attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MS),
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            placeholders: false,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_discovery_method(mut self, method: impl Into<String>) -> Self {
        self.discovery_method = method.into();
        self
    }

    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_placeholders(mut self, enabled: bool) -> Self {
        self.placeholders = enabled;
        self
    }

    /// Human-readable launch line for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.command.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawServer {
    #[serde(default)]
    name: String,
    preset: Option<String>,
    kind: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    #[serde(default)]
    args_extra: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    workdir: Option<String>,
    discovery_method: Option<String>,
    startup_grace_ms: Option<u64>,
    attempt_timeout_ms: Option<u64>,
    call_timeout_ms: Option<u64>,
    shutdown_grace_ms: Option<u64>,
    #[serde(default)]
    placeholders: bool,
}

fn expand(value: &str) -> String {
    shellexpand::full(value)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

impl RawServer {
    pub(crate) fn resolve(self) -> Result<ServerConfig, ConfigError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }

        let preset = match &self.preset {
            Some(preset_name) => Some(preset::find(preset_name).ok_or_else(|| {
                ConfigError::UnknownPreset {
                    server: name.clone(),
                    preset: preset_name.clone(),
                }
            })?),
            None => None,
        };

        let command = self
            .command
            .as_deref()
            .or(preset.map(|p| p.command))
            .map(expand)
            .ok_or_else(|| ConfigError::MissingCommand {
                server: name.clone(),
            })?;

        let mut args: Vec<String> = match self.args {
            Some(args) => args,
            None => preset
                .map(|p| p.args.iter().map(|arg| arg.to_string()).collect())
                .unwrap_or_default(),
        };
        args.extend(self.args_extra);
        let args = args.iter().map(|arg| expand(arg)).collect();

        let mut env: HashMap<String, String> = self
            .env
            .into_iter()
            .map(|(key, value)| (key, expand(&value)))
            .collect();
        if let Some(preset) = preset {
            for variable in preset.required_env {
                let present = env.get(*variable).is_some_and(|value| !value.is_empty());
                if present {
                    continue;
                }
                match std::env::var(variable) {
                    Ok(value) if !value.is_empty() => {
                        env.insert(variable.to_string(), value);
                    }
                    _ => {
                        return Err(ConfigError::MissingApiKey {
                            server: name,
                            variable: variable.to_string(),
                        });
                    }
                }
            }
        }

        let kind = self
            .kind
            .or(preset.map(|p| p.kind.to_string()))
            .unwrap_or_else(|| DEFAULT_WORKER_KIND.to_string());

        let millis = |value: Option<u64>, default: u64, field: &'static str| {
            let value = value.unwrap_or(default);
            if value == 0 {
                Err(ConfigError::InvalidTimeout {
                    server: name.clone(),
                    field,
                    reason: "must be greater than zero".to_string(),
                })
            } else {
                Ok(Duration::from_millis(value))
            }
        };
        let startup_grace = millis(self.startup_grace_ms, DEFAULT_STARTUP_GRACE_MS, "startup_grace_ms")?;
        let attempt_timeout = millis(
            self.attempt_timeout_ms,
            DEFAULT_ATTEMPT_TIMEOUT_MS,
            "attempt_timeout_ms",
        )?;
        let call_timeout = millis(
            self.call_timeout_ms,
            DEFAULT_CALL_TIMEOUT_MS.max(self.attempt_timeout_ms.unwrap_or(0)),
            "call_timeout_ms",
        )?;
        let shutdown_grace = millis(
            self.shutdown_grace_ms,
            DEFAULT_SHUTDOWN_GRACE_MS,
            "shutdown_grace_ms",
        )?;
        if call_timeout < attempt_timeout {
            return Err(ConfigError::InvalidTimeout {
                server: name,
                field: "call_timeout_ms",
                reason: "must not be shorter than attempt_timeout_ms".to_string(),
            });
        }

        Ok(ServerConfig {
            name,
            kind,
            command: PathBuf::from(command),
            args,
            env,
            workdir: self.workdir.map(|dir| PathBuf::from(expand(&dir))),
            discovery_method: self
                .discovery_method
                .unwrap_or_else(|| DEFAULT_DISCOVERY_METHOD.to_string()),
            startup_grace,
            attempt_timeout,
            call_timeout,
            shutdown_grace,
            placeholders: self.placeholders,
        })
    }
}
