//! Pacer Hardware Abstraction Layer
//!
//! Provides unified access to the motion sensor and the user-facing
//! collaborators (notifications, confirmation prompts) used by Pacer.
//!
//! # Modules
//!
//! - [`i2c`] - I2C bus interface and the ADXL345 accelerometer platform
//! - [`scripted`] - replay of recorded accelerometer readings
//! - [`notify`] - desktop and logging notification delivery
//! - [`prompt`] - accept/decline confirmation prompts
//!
//! # Example
//!
//! ```rust,no_run
//! use pacer_hal::{AccelerometerReading, MotionPlatform, ScriptedPlatform};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut platform = ScriptedPlatform::new(vec![AccelerometerReading::new(0.0, 0.0, 1.3)]);
//!
//!     if platform.is_available().await && platform.request_permission().await {
//!         let mut readings = platform.subscribe(Duration::from_millis(1000)).unwrap();
//!         while let Some(reading) = readings.recv().await {
//!             println!("|a| = {:.3} g", reading.magnitude());
//!         }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

#[cfg(feature = "i2c")]
pub mod i2c;
pub mod notify;
pub mod prompt;
pub mod scripted;

// Re-exports for convenience
#[cfg(feature = "i2c")]
pub use i2c::{I2CBus, I2cAccelerometerPlatform, ADXL345};
pub use notify::{DesktopNotifier, LoggingNotifier, Notifier};
pub use prompt::{ConfirmationPrompt, PromptRequest, PromptResponse, ScriptedPrompt, TerminalPrompt};
pub use scripted::ScriptedPlatform;

/// Capacity of the channel carrying readings from a platform to its subscriber
pub const READING_CHANNEL_CAPACITY: usize = 64;

/// One raw triaxial accelerometer reading, in units of g
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl AccelerometerReading {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean norm of the acceleration vector
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Stream of readings produced by an open subscription
pub type ReadingStream = mpsc::Receiver<AccelerometerReading>;

/// Motion sensing platform.
///
/// Availability and permission are capability queries: they answer with a
/// boolean and never fail. A platform hands out at most one live
/// subscription; the stream ends when the platform is unsubscribed or runs
/// out of data.
#[async_trait::async_trait]
pub trait MotionPlatform: Send + Sync {
    /// Platform name used in logs
    fn name(&self) -> &str;

    /// Whether a motion sensor exists on this device
    async fn is_available(&self) -> bool;

    /// Request authorization to read the motion sensor
    async fn request_permission(&mut self) -> bool;

    /// Open the sensor at a fixed sampling interval
    fn subscribe(&mut self, interval: Duration) -> Result<ReadingStream, HalError>;

    /// Close the sensor. No-op when no subscription is open.
    fn unsubscribe(&mut self);

    /// Whether a subscription is currently open
    fn is_subscribed(&self) -> bool;
}

/// HAL Error types
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Trace parse error: {0}")]
    TraceParse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude_at_rest_is_one_g() {
        let reading = AccelerometerReading::new(0.0, 0.0, 1.0);
        assert!((reading.magnitude() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_magnitude_is_euclidean_norm() {
        let reading = AccelerometerReading::new(0.3, 0.4, 1.2);
        assert!((reading.magnitude() - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_reading_deserializes_from_json_line() {
        let reading: AccelerometerReading =
            serde_json::from_str(r#"{"x":0.1,"y":-0.2,"z":0.98}"#).unwrap();
        assert_eq!(reading, AccelerometerReading::new(0.1, -0.2, 0.98));
    }
}
