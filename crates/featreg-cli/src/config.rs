use anyhow::{Context, Result};
use featreg_core::PlaceholderPolicy;
use featreg_registry::JobTrackerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DB_ENV: &str = "FEATREG_DB";
const CONFIG_ENV: &str = "FEATREG_CONFIG";
const LOG_LEVEL_ENV: &str = "FEATREG_LOG_LEVEL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegistryConfig {
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub placeholder_policy: PlaceholderPolicy,
    #[serde(default)]
    pub log_level: Option<String>,
}

impl RegistryConfig {
    /// Reads the TOML config; a missing file means defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn job_tracker(&self) -> JobTrackerConfig {
        JobTrackerConfig {
            placeholder_policy: self.placeholder_policy,
        }
    }
}

pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(value) = non_empty_env(CONFIG_ENV) {
        return PathBuf::from(value);
    }
    dirs::config_dir()
        .map(|dir| dir.join("featreg").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".featreg/config.toml"))
}

pub fn resolve_db_path(flag: Option<&Path>, config: &RegistryConfig) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Some(value) = non_empty_env(DB_ENV) {
        return PathBuf::from(value);
    }
    if let Some(path) = config.db_path.as_ref() {
        return path.clone();
    }
    dirs::data_dir()
        .map(|dir| dir.join("featreg").join("registry.db"))
        .unwrap_or_else(|| PathBuf::from(".featreg/registry.db"))
}

pub fn resolve_log_level(debug: bool, config: &RegistryConfig) -> String {
    if debug {
        return "debug".to_string();
    }
    if let Some(value) = non_empty_env(LOG_LEVEL_ENV) {
        return value;
    }
    config
        .log_level
        .clone()
        .unwrap_or_else(|| "info".to_string())
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
