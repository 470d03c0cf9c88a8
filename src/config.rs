//! Configuration System using Figment
//!
//! Strongly-typed configuration for the spectrometer controller.
//! Configuration is layered:
//! 1. Built-in defaults ([`FtsConfig::default`])
//! 2. A TOML file (`config/fts.toml` unless another path is given)
//! 3. Environment variables prefixed with `FTS_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use fts_control::config::FtsConfig;
//!
//! // FTS_CONTROLLER__HOST=10.0.0.5 overrides controller.host
//! let config = FtsConfig::load()?;
//! config.validate()?;
//! println!("Controller: {}:{}", config.controller.host, config.controller.port);
//! # Ok::<(), fts_control::error::FtsError>(())
//! ```

use crate::error::{FtsError, FtsResult};
use crate::validation;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/fts.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtsConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Motion controller connection
    pub controller: ControllerConfig,
    /// Topology description and group roles
    pub topology: TopologyConfig,
    /// Hardware data gathering
    pub gathering: GatheringConfig,
    /// Scan defaults
    pub scan: ScanConfig,
    /// Local output of scan artifacts
    pub storage: StorageConfig,
    /// Controller file tree access
    pub transport: TransportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "FTS Control".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Motion controller connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller host name or IP address
    pub host: String,
    /// TCP command port
    pub port: u16,
    /// Send/receive timeout for every call
    pub timeout_ms: u64,
    /// Login user
    pub username: String,
    /// Login password
    pub password: String,
}

impl ControllerConfig {
    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: "192.168.254.254".to_string(),
            port: 5001,
            timeout_ms: 1000,
            username: "Administrator".to_string(),
            password: "Administrator".to_string(),
        }
    }
}

/// Topology description location and role assignments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Remote path of the controller's system description
    pub description_path: String,
    /// Explicit group roles, overriding the categories in the description
    pub roles: RoleAssignments,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            description_path: "Config/system.ini".to_string(),
            roles: RoleAssignments::default(),
        }
    }
}

/// Group name for each instrument role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleAssignments {
    /// Linear stage of the pointing mirror
    pub pointing_linear: Option<String>,
    /// Rotary stage of the pointing mirror
    pub pointing_rotary: Option<String>,
    /// Scanning (moving mirror) stage
    pub moving_linear: Option<String>,
}

/// Data gathering parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatheringConfig {
    /// Number of samples the controller records
    pub dataset_count: u32,
    /// Servo cycles between samples
    pub interval: u32,
    /// Remote file the controller writes the buffer to
    pub remote_file: String,
}

impl Default for GatheringConfig {
    fn default() -> Self {
        Self {
            dataset_count: 100_000,
            interval: 8,
            remote_file: "Public/Gathering.dat".to_string(),
        }
    }
}

/// Scan defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Full back-and-forth passes per scan
    pub repeat: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { repeat: 15 }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory for data files
    pub output_dir: PathBuf,
    /// Write the timestamp file next to the gathering file
    pub write_timestamps: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            write_timestamps: true,
        }
    }
}

/// Controller file tree access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Local directory mirroring the controller's file root
    pub root: PathBuf,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/mnt/xps/Admin"),
        }
    }
}

impl FtsConfig {
    /// Load configuration from `config/fts.toml` and environment variables
    pub fn load() -> FtsResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> FtsResult<Self> {
        let config: FtsConfig = Figment::from(Serialized::defaults(FtsConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("FTS_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> FtsResult<()> {
        let invalid = |field: &str, reason: &str| {
            FtsError::Configuration(format!("{field}: {reason}"))
        };

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(FtsError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        validation::is_valid_host(&self.controller.host)
            .map_err(|e| invalid("controller.host", e))?;
        validation::is_valid_port(self.controller.port)
            .map_err(|e| invalid("controller.port", e))?;
        validation::is_in_range(self.controller.timeout_ms, 1..=600_000)
            .map_err(|e| invalid("controller.timeout_ms", e))?;

        validation::is_valid_path(&self.topology.description_path)
            .map_err(|e| invalid("topology.description_path", e))?;

        if self.gathering.dataset_count == 0 {
            return Err(invalid("gathering.dataset_count", "must be greater than 0"));
        }
        if self.gathering.interval == 0 {
            return Err(invalid("gathering.interval", "must be greater than 0"));
        }
        validation::is_valid_path(&self.gathering.remote_file)
            .map_err(|e| invalid("gathering.remote_file", e))?;

        validation::is_valid_path(&self.storage.output_dir.to_string_lossy())
            .map_err(|e| invalid("storage.output_dir", e))?;

        Ok(())
    }
}
