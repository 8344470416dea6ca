pub mod app;
pub mod error;
pub mod loader;
pub mod preset;
pub mod server;

pub use crate::constants::CONFIG_PATH;

pub use app::AppConfig;
pub use error::ConfigError;
pub use preset::{PRESETS, Preset};
pub use server::ServerConfig;
