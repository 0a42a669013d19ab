use crate::error::config::ConfigError;
use crate::{ENGINE_BINARY, SHM_PATH_ENV};

use common::ErrorLocation;

use std::env::var_os;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "host.toml";
const CONFIG_SUBDIR: &str = "config";
const CACHE_SUBDIR: &str = "entropic";
const FRAMES_FILE_NAME: &str = "frames";

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub program: String,
    pub args: Vec<String>,
    pub startup_timeout_ms: u64,
    pub max_output_lines: usize,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            program: ENGINE_BINARY.to_string(),
            args: Vec::new(),
            startup_timeout_ms: default_startup_timeout_ms(),
            max_output_lines: default_max_output_lines(),
        }
    }
}

impl SidecarConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
    pub probe_timeout_ms: u64,
    pub max_misses: u32,
    /// Tolerance used while a heavy command is in flight.
    pub render_max_misses: u32,
    /// How long the restart step keeps retrying to map the new frame file.
    pub frame_reopen_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_misses: default_max_misses(),
            render_max_misses: default_render_max_misses(),
            frame_reopen_timeout_ms: default_frame_reopen_timeout_ms(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn frame_reopen_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_reopen_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub command_timeout_ms: u64,
    pub export_poll_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
            export_poll_interval_ms: default_export_poll_interval_ms(),
        }
    }
}

impl RelayConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn export_poll_interval(&self) -> Duration {
        Duration::from_millis(self.export_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    pub shm_path: Option<PathBuf>,
}

impl FramesConfig {
    /// Frame file to use when the sidecar does not announce one:
    /// `ENTROPIC_SHM_PATH`, then `shm_path`, then the user cache directory.
    pub fn resolve_shm_path(&self) -> PathBuf {
        if let Some(path) = var_os(SHM_PATH_ENV).filter(|p| !p.is_empty()) {
            return PathBuf::from(path);
        }

        if let Some(path) = &self.shm_path {
            return path.clone();
        }

        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(CACHE_SUBDIR)
            .join(FRAMES_FILE_NAME)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub sidecar: SidecarConfig,
    pub health: HealthConfig,
    pub relay: RelayConfig,
    pub frames: FramesConfig,
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_startup_timeout_ms() -> u64 {
    15_000
}
fn default_max_output_lines() -> usize {
    200
}
fn default_interval_ms() -> u64 {
    1_000
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_max_misses() -> u32 {
    3
}
fn default_render_max_misses() -> u32 {
    10
}
fn default_frame_reopen_timeout_ms() -> u64 {
    5_000
}
fn default_command_timeout_ms() -> u64 {
    30_000
}
fn default_export_poll_interval_ms() -> u64 {
    500
}

// ============================================
// IMPLEMENTATION
// ============================================

impl HostConfig {
    /// Load host.toml from the config directory.
    ///
    /// Tries, in order:
    /// 1. {config_dir}/host.toml
    /// 2. {config_dir}/config/host.toml
    /// 3. Falls back to defaults
    ///
    /// A file that exists but does not parse or validate is skipped with a
    /// warning.
    ///
    /// # Returns
    ///
    /// Always returns `Ok(HostConfig)` - either loaded or default.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let paths = [
            config_dir.join(CONFIG_FILE_NAME),
            config_dir.join(CONFIG_SUBDIR).join(CONFIG_FILE_NAME),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load_from_path(path) {
                    Ok(config) => {
                        info!("Host config loaded from {}", path.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        warn!("Failed to load host config from {}: {}", path.display(), e);
                    }
                }
            }
        }

        info!(
            "No {CONFIG_FILE_NAME} found in {}, using defaults",
            config_dir.display()
        );
        Ok(Self::default())
    }

    /// Load and validate one specific file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid TOML
    /// for this schema, or fails [`validate`](Self::validate).
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: HostConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sidecar.program.trim().is_empty() {
            return Err(validation_error("sidecar.program cannot be empty"));
        }

        let durations = [
            ("sidecar.startup_timeout_ms", self.sidecar.startup_timeout_ms),
            ("health.interval_ms", self.health.interval_ms),
            ("health.probe_timeout_ms", self.health.probe_timeout_ms),
            ("health.frame_reopen_timeout_ms", self.health.frame_reopen_timeout_ms),
            ("relay.command_timeout_ms", self.relay.command_timeout_ms),
            ("relay.export_poll_interval_ms", self.relay.export_poll_interval_ms),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, value)| *value == 0) {
            return Err(validation_error(format!("{name} must be greater than 0")));
        }

        if self.sidecar.max_output_lines == 0 {
            return Err(validation_error(
                "sidecar.max_output_lines must be greater than 0",
            ));
        }

        if self.health.max_misses == 0 {
            return Err(validation_error("health.max_misses must be at least 1"));
        }

        if self.health.render_max_misses < self.health.max_misses {
            return Err(validation_error(format!(
                "health.render_max_misses ({}) must be >= health.max_misses ({})",
                self.health.render_max_misses, self.health.max_misses
            )));
        }

        Ok(())
    }
}

#[track_caller]
fn validation_error(reason: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: reason.into(),
    }
}
