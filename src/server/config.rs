//! The server definition synchronised from the control plane.

use crate::configfiles::ConfigurationFile;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};
use uuid::Uuid;

/// Type-safe identifier for servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub Uuid);

impl ServerId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl From<Uuid> for ServerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Resource limits applied to the server process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Memory limit in MiB.
    pub memory_limit: i64,
    /// Swap limit in MiB.
    pub swap: i64,
    /// CPU limit in percent of a single core.
    pub cpu_limit: i64,
    /// Disk limit in MiB. Zero or less means unlimited.
    pub disk_space: i64,
}

/// The authoritative definition of a server, as held by the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub uuid: ServerId,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub invocation: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub build: BuildSettings,
    #[serde(default)]
    pub config_files: Vec<ConfigurationFile>,
    #[serde(default)]
    pub start_on_completion: bool,
    /// Shell script run in the data directory by the bundled installer.
    #[serde(default)]
    pub install_script: Option<String>,
}

impl ServerConfig {
    /// A definition with no invocation, limits or variables.
    pub fn new(uuid: ServerId) -> Self {
        Self {
            uuid,
            suspended: false,
            invocation: String::new(),
            environment: HashMap::new(),
            build: BuildSettings::default(),
            config_files: Vec::new(),
            start_on_completion: false,
            install_script: None,
        }
    }
}
