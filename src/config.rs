//! # Daemon Configuration
//!
//! Loaded once at startup from a JSON file and shared as `Arc<Config>`. Every
//! field has a default, so an empty object is a valid configuration.

use crate::server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// The system user that owns server files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUser {
    pub uid: u32,
    pub gid: u32,
}

impl Default for SystemUser {
    fn default() -> Self {
        Self { uid: 988, gid: 988 }
    }
}

/// A server definition served by the bundled control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefinition {
    #[serde(flatten)]
    pub config: ServerConfig,
    /// Written to stdin to request a graceful stop.
    #[serde(default)]
    pub stop_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one data directory per server, named by id.
    pub data_directory: PathBuf,
    pub check_permissions_on_boot: bool,
    /// Default time a power request waits for the power lock.
    pub power_lock_wait_seconds: u64,
    /// How long a computed disk usage stays fresh.
    pub disk_check_interval_seconds: u64,
    pub user: SystemUser,
    /// Used when `RUST_LOG` is not set.
    pub log_filter: String,
    pub servers: Vec<ServerDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("/var/lib/node-agent/volumes"),
            check_permissions_on_boot: true,
            power_lock_wait_seconds: 30,
            disk_check_interval_seconds: 150,
            user: SystemUser::default(),
            log_filter: "info".to_string(),
            servers: Vec::new(),
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_directory.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("data_directory must not be empty".into()));
        }
        if self.power_lock_wait_seconds == 0 {
            return Err(ConfigError::Invalid("power_lock_wait_seconds must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.config.uuid) {
                return Err(ConfigError::Invalid(format!(
                    "server {} is defined more than once",
                    server.config.uuid
                )));
            }
        }
        Ok(())
    }

    pub fn power_lock_wait(&self) -> Duration {
        Duration::from_secs(self.power_lock_wait_seconds)
    }

    pub fn disk_check_interval(&self) -> Duration {
        Duration::from_secs(self.disk_check_interval_seconds)
    }

    /// Data directory of a single server.
    pub fn server_root(&self, server: &crate::server::ServerId) -> PathBuf {
        self.data_directory.join(server.to_string())
    }
}
