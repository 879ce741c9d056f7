use parley_core::policy::Policy;
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Clone, Debug, Deserialize)]
pub struct ParleyConfig {
    pub data_dir: PathBuf,
    pub listen: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub policy: Option<Policy>,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_namespace() -> String {
    "chat".to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io")]
    Io,
    #[error("parse")]
    Parse,
    #[error("invalid {0}")]
    Invalid(&'static str),
}

impl ParleyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_dir"));
        }
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Invalid("listen"));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("namespace"));
        }
        Ok(())
    }

    pub fn policy(&self) -> Policy {
        self.policy.clone().unwrap_or_default()
    }
}

pub fn load_config(path: &Path) -> Result<ParleyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
    let config: ParleyConfig = toml::from_str(&content).map_err(|_| ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}
