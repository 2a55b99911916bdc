//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use var_server_session::SessionConfig;

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    /// Initial state of every client session
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory searched by `send_file` for relative paths
    #[serde(default)]
    pub resource_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            resource_dir: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7000".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Clock resolution of the simulation
    #[serde(default = "default_tics_per_second")]
    pub tics_per_second: i64,
    /// Length of one simulation frame, in seconds
    #[serde(default = "default_frame_seconds")]
    pub frame_seconds: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tics_per_second: default_tics_per_second(),
            frame_seconds: default_frame_seconds(),
        }
    }
}

fn default_tics_per_second() -> i64 {
    1_000_000
}

fn default_frame_seconds() -> f64 {
    0.01
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .session
        .validate()
        .with_context(|| format!("Invalid [session] table in {:?}", path))?;
    if config.model.tics_per_second <= 0 || config.model.frame_seconds <= 0.0 {
        anyhow::bail!("Invalid [model] table in {:?}: rates must be positive", path);
    }

    Ok(config)
}
