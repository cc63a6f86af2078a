//! Scripted motion platform
//!
//! Replays a fixed sequence of accelerometer readings at the subscription's
//! sampling interval. Used for simulations from recorded traces and as the
//! sensor in tests.

use crate::{AccelerometerReading, HalError, MotionPlatform, ReadingStream, READING_CHANNEL_CAPACITY};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct ScriptedPlatform {
    readings: Vec<AccelerometerReading>,
    available: bool,
    grant_permission: bool,
    subscribe_calls: usize,
    feeder: Option<JoinHandle<()>>,
}

impl ScriptedPlatform {
    /// Platform that is present, grants permission and replays `readings`
    pub fn new(readings: Vec<AccelerometerReading>) -> Self {
        Self {
            readings,
            available: true,
            grant_permission: true,
            subscribe_calls: 0,
            feeder: None,
        }
    }

    /// Load a trace of JSON lines, one `{"x":..,"y":..,"z":..}` object per line.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_trace_file(path: &Path) -> Result<Self, HalError> {
        let file = std::fs::File::open(path)?;
        let mut readings = Vec::new();

        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            readings.push(serde_json::from_str(line)?);
        }

        tracing::info!("Loaded {} readings from {}", readings.len(), path.display());
        Ok(Self::new(readings))
    }

    /// Simulate a device without a motion sensor
    pub fn unavailable() -> Self {
        let mut platform = Self::new(Vec::new());
        platform.available = false;
        platform
    }

    /// Simulate the user refusing motion access
    pub fn with_permission(mut self, granted: bool) -> Self {
        self.grant_permission = granted;
        self
    }

    /// Number of times the sensor has been opened
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[async_trait::async_trait]
impl MotionPlatform for ScriptedPlatform {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn request_permission(&mut self) -> bool {
        self.available && self.grant_permission
    }

    fn subscribe(&mut self, interval: Duration) -> Result<ReadingStream, HalError> {
        if !self.available {
            return Err(HalError::DeviceNotFound("scripted sensor disabled".to_string()));
        }
        if !self.grant_permission {
            return Err(HalError::PermissionDenied("scripted sensor".to_string()));
        }
        if self.is_subscribed() {
            return Err(HalError::DeviceBusy("scripted sensor".to_string()));
        }

        self.subscribe_calls += 1;

        let readings = self.readings.clone();
        let (tx, rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
        self.feeder = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            for reading in readings {
                ticker.tick().await;
                if tx.send(reading).await.is_err() {
                    return;
                }
            }
            tracing::debug!("Scripted sensor trace exhausted");
        }));

        Ok(rx)
    }

    fn unsubscribe(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }

    fn is_subscribed(&self) -> bool {
        self.feeder.is_some()
    }
}

impl Drop for ScriptedPlatform {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
