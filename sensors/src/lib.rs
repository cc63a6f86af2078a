//! Pacer motion sensing library
//!
//! Turns raw accelerometer readings into smoothed activity samples, fans
//! them out to observers, and decides when a sustained movement episode
//! should prompt the user to start a run.

pub mod autostart;
pub mod monitor;
pub mod recording;
pub mod service;
pub mod smoothing;

use pacer_hal::HalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One classified reading derived from a raw accelerometer tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    /// |‖a‖ − 1 g| of the raw reading
    pub raw_magnitude: f64,
    /// Mean of the smoothing window
    pub smoothed_magnitude: f64,
    /// Normalized movement intensity (0.0 - 1.0)
    pub intensity: f64,
    /// Smoothed magnitude above the movement threshold
    pub is_moving: bool,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

/// Identity of a registered observer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(String);

impl ObserverId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObserverId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Consumer of activity samples
pub trait ActivityObserver: Send {
    /// Called for every sample, in sensor order
    fn on_activity_sample(&mut self, sample: &ActivitySample) -> Result<()>;
}

/// Observer that logs every sample
pub struct LoggingObserver;

impl ActivityObserver for LoggingObserver {
    fn on_activity_sample(&mut self, sample: &ActivitySample) -> Result<()> {
        tracing::debug!(
            smoothed = sample.smoothed_magnitude,
            moving = sample.is_moving,
            "Activity sample: intensity {:.0}%",
            sample.intensity * 100.0
        );
        Ok(())
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("HAL error: {0}")]
    Hal(#[from] HalError),

    #[error("Observer {0} is closed")]
    ObserverClosed(String),

    #[error("Observer failed: {0}")]
    Observer(String),

    #[error("Auto-start monitoring is not running")]
    NotMonitoring,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Run journal error: {0}")]
    Recording(String),
}

pub type Result<T> = std::result::Result<T, SensorError>;
