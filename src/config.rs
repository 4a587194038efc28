//! # Configuration
//!
//! Everything that used to be a pin constant or a timing literal lives in
//! [`CurtainConfig`]. The file is TOML, every field has a default, and a
//! default file is written on first start so it can be edited in place.
//!
//! ```toml
//! [pins]
//! motor_left = 22
//! motor_right = 23
//! switch_left = 17
//! switch_right = 27
//!
//! [motion]
//! full_travel_ms = 30000
//! settle_ms = 500
//! motor_active_level = "low"
//!
//! [switches]
//! debounce_ms = 500
//! active_level = "low"
//! pull_up = true
//!
//! [watcher]
//! sysfs_root = "/sys/class/gpio"
//! wake_interval_ms = 1000
//! edge_capacity = 32
//! command_capacity = 32
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rppal::gpio::Level;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::curtain::{ControllerSettings, TravelSettings};
use crate::gpio::sysfs::DEFAULT_SYSFS_ROOT;
use crate::gpio::{PinId, WatcherSettings};

const CONFIG_DIR: &str = "curtaind";
const CONFIG_FILE: &str = "config.toml";
pub const CONFIG_ENV: &str = "CURTAIND_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Electrical level at which a line counts as active.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActiveLevel {
    Low,
    High,
}

impl ActiveLevel {
    pub fn level(self) -> Level {
        match self {
            ActiveLevel::Low => Level::Low,
            ActiveLevel::High => Level::High,
        }
    }
}

/// BCM numbers of the motor bridge terminals and the limit switches.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PinConfig {
    pub motor_left: PinId,
    pub motor_right: PinId,
    /// Closed limit (position 0)
    pub switch_left: PinId,
    /// Open limit (position 1)
    pub switch_right: PinId,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            motor_left: 22,   // header pin 15
            motor_right: 23,  // header pin 16
            switch_left: 17,  // header pin 11
            switch_right: 27, // header pin 13
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    /// Time for one full traversal between the limit switches
    pub full_travel_ms: u64,
    /// Pause after every motion before the next request is served
    pub settle_ms: u64,
    pub motor_active_level: ActiveLevel,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            full_travel_ms: 30_000,
            settle_ms: 500,
            motor_active_level: ActiveLevel::Low,
        }
    }
}

impl MotionConfig {
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            travel: TravelSettings {
                full_travel: Duration::from_millis(self.full_travel_ms),
                settle: Duration::from_millis(self.settle_ms),
            },
            ..ControllerSettings::default()
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SwitchConfig {
    /// Quiet window of the per-switch debouncer
    pub debounce_ms: u64,
    pub active_level: ActiveLevel,
    pub pull_up: bool,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            active_level: ActiveLevel::Low,
            pull_up: true,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct WatcherConfig {
    pub sysfs_root: PathBuf,
    pub wake_interval_ms: u64,
    pub edge_capacity: usize,
    pub command_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            wake_interval_ms: 1000,
            edge_capacity: 32,
            command_capacity: 32,
        }
    }
}

impl WatcherConfig {
    pub fn settings(&self) -> WatcherSettings {
        WatcherSettings {
            wake_interval: Duration::from_millis(self.wake_interval_ms),
            edge_capacity: self.edge_capacity,
            command_capacity: self.command_capacity,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct CurtainConfig {
    pub pins: PinConfig,
    pub motion: MotionConfig,
    pub switches: SwitchConfig,
    pub watcher: WatcherConfig,
}

impl CurtainConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pins = [
            self.pins.motor_left,
            self.pins.motor_right,
            self.pins.switch_left,
            self.pins.switch_right,
        ];
        let unique: HashSet<PinId> = pins.iter().copied().collect();
        if unique.len() != pins.len() {
            return Err(ConfigError::Invalid(format!("pins must be distinct, got {:?}", pins)));
        }
        if self.motion.full_travel_ms == 0 {
            return Err(ConfigError::Invalid("motion.full_travel_ms must be positive".to_string()));
        }
        if self.watcher.wake_interval_ms == 0 {
            return Err(ConfigError::Invalid("watcher.wake_interval_ms must be positive".to_string()));
        }
        if self.watcher.edge_capacity == 0 || self.watcher.command_capacity == 0 {
            return Err(ConfigError::Invalid("watcher queue capacities must be positive".to_string()));
        }
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    /// Writes the default configuration if `path` does not exist yet.
    pub async fn ensure_default(path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if tokio::fs::try_exists(path).await.map_err(io_err)? {
            return Ok(());
        }

        info!("Creating default configuration at {}", path.display());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let content = Self::default().to_toml()?;
        tokio::fs::write(path, content).await.map_err(io_err)
    }
}

/// Config file location: explicit argument, then `$CURTAIND_CONFIG`, then the
/// user's config directory.
pub fn resolve_path(arg: Option<String>) -> PathBuf {
    if let Some(path) = arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    let mut base = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    base.push(CONFIG_DIR);
    base.push(CONFIG_FILE);
    base
}
