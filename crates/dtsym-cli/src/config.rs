//! Configuration loading

use anyhow::Result;
use dtsym_core::GenOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub generator: GenOptions,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where generated files go when not given on the command line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// C header with `#define` lines
    #[serde(default)]
    pub header: Option<PathBuf>,
    /// `KEY=value` conf file
    #[serde(default)]
    pub conf: Option<PathBuf>,
}

/// Load configuration from file, falling back to defaults if it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}
