// Application Configuration

use anyhow::Result;
use pacer_sensors::autostart::AutoStartConfig;
use pacer_sensors::monitor::MonitorConfig;
use pacer_sensors::service::ServiceOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Motion sensor backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// ADXL345-class accelerometer on an I2C bus
    I2c,
    /// Replay of a recorded trace file
    Scripted,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("user_id must not be empty")]
    EmptyUserId,

    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("trigger_threshold must be in [0.0, 1.0), got {0}")]
    TriggerThresholdOutOfRange(f64),

    #[error("the scripted platform needs a trace_file")]
    MissingTraceFile,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Owner of the runs started on this device
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Directory holding the run journal
    #[serde(default = "default_data_dir")]
    pub data_directory: String,

    /// Watch for movement and offer to start runs
    #[serde(default = "default_true")]
    pub auto_start: bool,

    /// Send desktop notifications
    #[serde(default = "default_true")]
    pub notifications: bool,

    #[serde(default = "default_platform")]
    pub platform: PlatformKind,

    /// I2C bus device node
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: String,

    /// 7-bit accelerometer address
    #[serde(default = "default_accelerometer_address")]
    pub accelerometer_address: u8,

    /// JSON-lines readings replayed by the scripted platform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_file: Option<String>,

    /// Sensor sampling interval in milliseconds
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_ms: u64,

    /// Readings averaged before classification
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Smoothed magnitude (g) above which the device counts as moving
    #[serde(default = "default_movement_threshold")]
    pub movement_threshold: f64,

    /// Smoothed magnitude (g) mapped to full intensity
    #[serde(default = "default_high_intensity_threshold")]
    pub high_intensity_threshold: f64,

    /// Intensity that starts a movement episode
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: f64,

    /// Continuous movement required before prompting, in milliseconds
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Minimum time between two prompts, in milliseconds
    #[serde(default = "default_cooldown")]
    pub cooldown_ms: u64,

    /// Path to config file (for reference)
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_user_id() -> String { "current-user".to_string() }
fn default_data_dir() -> String { "/var/lib/pacer".to_string() }
fn default_true() -> bool { true }
fn default_platform() -> PlatformKind { PlatformKind::I2c }
fn default_i2c_bus() -> String { "/dev/i2c-1".to_string() }
fn default_accelerometer_address() -> u8 { 0x53 }
fn default_sampling_interval() -> u64 { 1000 }
fn default_smoothing_window() -> usize { 5 }
fn default_movement_threshold() -> f64 { 0.1 }
fn default_high_intensity_threshold() -> f64 { 0.3 }
fn default_trigger_threshold() -> f64 { 0.3 }
fn default_debounce() -> u64 { 3000 }
fn default_cooldown() -> u64 { 30000 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            data_directory: default_data_dir(),
            auto_start: true,
            notifications: true,
            platform: default_platform(),
            i2c_bus: default_i2c_bus(),
            accelerometer_address: default_accelerometer_address(),
            trace_file: None,
            sampling_interval_ms: default_sampling_interval(),
            smoothing_window: default_smoothing_window(),
            movement_threshold: default_movement_threshold(),
            high_intensity_threshold: default_high_intensity_threshold(),
            trigger_threshold: default_trigger_threshold(),
            debounce_ms: default_debounce(),
            cooldown_ms: default_cooldown(),
            config_path: PathBuf::new(),
        }
    }
}

const EXAMPLE: &str = r#"# Pacer Configuration File
#
# Copy this file to /etc/pacer/config.toml or ~/.config/pacer/config.toml

# Owner of the runs started on this device
user_id = "current-user"

# Directory holding the run journal (runs.jsonl)
data_directory = "/var/lib/pacer"

# Watch for movement and offer to start a run
auto_start = true

# Send desktop notifications (the confirmation prompt is shown either way)
notifications = true

# Motion sensor backend: "i2c" or "scripted"
platform = "i2c"

# I2C accelerometer
i2c_bus = "/dev/i2c-1"
accelerometer_address = 0x53

# Recorded readings for the scripted platform, one {"x","y","z"} object per line
# trace_file = "/var/lib/pacer/trace.jsonl"

# Sensor sampling interval in milliseconds
sampling_interval_ms = 1000

# Readings averaged before classification
smoothing_window = 5

# Smoothed magnitude (g, gravity removed) above which the device is moving
movement_threshold = 0.1

# Smoothed magnitude (g) that counts as full intensity
high_intensity_threshold = 0.3

# Intensity (0.0 - 1.0) that starts a movement episode
trigger_threshold = 0.3

# Continuous movement required before prompting, in milliseconds
debounce_ms = 3000

# Minimum time between two prompts, in milliseconds
cooldown_ms = 30000
"#;

impl AppConfig {
    /// Load configuration from standard paths
    pub fn load() -> Result<Self> {
        let config_paths = [
            PathBuf::from("/etc/pacer/config.toml"),
            dirs::config_dir()
                .map(|p| p.join("pacer/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("./config.toml"),
        ];

        for path in &config_paths {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Annotated example configuration
    pub fn example() -> &'static str {
        EXAMPLE
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::EmptyUserId);
        }
        if self.sampling_interval_ms == 0 {
            return Err(ConfigError::NotPositive { field: "sampling_interval_ms" });
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::NotPositive { field: "smoothing_window" });
        }
        if !(self.movement_threshold > 0.0) {
            return Err(ConfigError::NotPositive { field: "movement_threshold" });
        }
        if !(self.high_intensity_threshold > 0.0) {
            return Err(ConfigError::NotPositive { field: "high_intensity_threshold" });
        }
        if !(0.0..1.0).contains(&self.trigger_threshold) {
            return Err(ConfigError::TriggerThresholdOutOfRange(self.trigger_threshold));
        }
        if self.platform == PlatformKind::Scripted && self.trace_file.is_none() {
            return Err(ConfigError::MissingTraceFile);
        }
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sampling_interval: Duration::from_millis(self.sampling_interval_ms),
            window_size: self.smoothing_window,
            movement_threshold: self.movement_threshold,
            high_intensity_threshold: self.high_intensity_threshold,
        }
    }

    pub fn auto_start_config(&self) -> AutoStartConfig {
        AutoStartConfig {
            trigger_threshold: self.trigger_threshold,
            debounce: Duration::from_millis(self.debounce_ms),
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            user_id: self.user_id.clone(),
            notifications_enabled: self.notifications,
        }
    }
}

/// Helper for getting config directories
mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
