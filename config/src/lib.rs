//! Configuration file for asbridge.
//!
//! Read from `~/.asbridge/config.toml`, or wherever `ASBRIDGE_CONFIG` points.
//! Every section and field is optional; a missing file means "all defaults".

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use asbridge_client::ClientConfig;
use serde::Deserialize;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "ASBRIDGE_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct BridgeConfig {
    /// Debug server connection settings.
    pub client: Option<ClientConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset, e.g. `"asbridge_client=debug"`.
    pub filter: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl BridgeConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match Self::path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit file. A missing file is `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        resolve_path(std::env::var_os(CONFIG_ENV_VAR), dirs::home_dir())
    }

    /// Connection settings, falling back to defaults for a missing section.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().and_then(|log| log.filter.as_deref())
    }
}

fn resolve_path(env_override: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match env_override {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => home.map(|home| home.join(".asbridge").join("config.toml")),
    }
}
