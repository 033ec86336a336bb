//! Configuration file loader.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pppd::{PppdCommandBuilder, DEFAULT_PPPD_PATH, DEFAULT_SUDO_PATH};

/// Supervisor configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PppdConfig {
    /// Location of the pppd binary.
    pub pppd_path: PathBuf,
    /// Location of the privilege-escalation helper.
    pub sudo_path: PathBuf,
    /// Prefix the invocation with the privilege-escalation helper.
    pub use_sudo: bool,
    /// Pacing sleep between classification rounds, in milliseconds.
    pub poll_interval_ms: u64,
    /// pppd options, emitted in order before the positional arguments.
    pub options: Vec<PppdOption>,
    /// Positional arguments, e.g. a tty device and baud rate.
    pub args: Vec<String>,
}

impl Default for PppdConfig {
    fn default() -> Self {
        Self {
            pppd_path: PathBuf::from(DEFAULT_PPPD_PATH),
            sudo_path: PathBuf::from(DEFAULT_SUDO_PATH),
            use_sudo: true,
            poll_interval_ms: 100,
            options: Vec::new(),
            args: Vec::new(),
        }
    }
}

/// One configured pppd option: a flag with an optional value token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PppdOption {
    /// The option flag, e.g. `mtu` or `noauth`.
    pub flag: String,
    /// The value token, absent for bare flags.
    pub value: Option<String>,
}

impl PppdConfig {
    /// The configured poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Build a command builder for dialing `peer` with this configuration.
    #[must_use]
    pub fn builder_for(&self, peer: impl Into<String>) -> PppdCommandBuilder {
        let mut builder = PppdCommandBuilder::new(peer)
            .pppd_path(self.pppd_path.clone())
            .sudo_path(self.sudo_path.clone())
            .use_sudo(self.use_sudo);

        for option in &self.options {
            builder = match &option.value {
                Some(value) => builder.option(&option.flag, value),
                None => builder.flag(&option.flag),
            };
        }

        for arg in &self.args {
            builder = builder.arg(arg);
        }

        builder
    }
}

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        Self {
            search_paths: vec![
                PathBuf::from("pppd-supervisor.toml"),
                PathBuf::from("/etc/pppd-supervisor.toml"),
            ],
        }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<PppdConfig, ConfigError> {
        for path in &self.search_paths {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading config file");
                return Self::load_from_path(path);
            }
        }

        tracing::debug!("No config file found, using defaults");
        Ok(PppdConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &PathBuf) -> Result<PppdConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })
    }

    /// Find the first config file that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
