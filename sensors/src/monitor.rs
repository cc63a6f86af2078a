//! Motion Activity Monitor
//!
//! Owns the accelerometer subscription, smooths raw readings, classifies
//! movement intensity, and fans activity samples out to every registered
//! observer. However many observers are registered, at most one sensor
//! subscription is open; it is closed when the last observer leaves.

use crate::smoothing::{motion_magnitude, IntensityClassifier, SlidingWindow};
use crate::{ActivityObserver, ActivitySample, ObserverId};
use pacer_hal::{AccelerometerReading, MotionPlatform, ReadingStream};
use std::time::Duration;

/// Configuration for the activity monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between sensor readings
    pub sampling_interval: Duration,
    /// Number of raw magnitudes averaged for classification
    pub window_size: usize,
    /// Smoothed magnitude above which `is_moving` is set
    pub movement_threshold: f64,
    /// Smoothed magnitude that maps to intensity 1.0
    pub high_intensity_threshold: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(1000),
            window_size: 5,
            movement_threshold: 0.1,
            high_intensity_threshold: 0.3,
        }
    }
}

impl MonitorConfig {
    fn classifier(&self) -> IntensityClassifier {
        IntensityClassifier {
            movement_threshold: self.movement_threshold,
            high_intensity_threshold: self.high_intensity_threshold,
        }
    }
}

/// Diagnostic snapshot of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorStatus {
    pub is_listening: bool,
    pub observer_count: usize,
}

/// One active monitoring period: from the first observer registering to
/// the last one leaving
struct MonitorSession {
    stream: ReadingStream,
    window: SlidingWindow,
    observers: Vec<(ObserverId, Box<dyn ActivityObserver>)>,
}

impl MonitorSession {
    fn contains(&self, id: &ObserverId) -> bool {
        self.observers.iter().any(|(existing, _)| existing == id)
    }
}

pub struct ActivityMonitor<P: MotionPlatform> {
    platform: P,
    config: MonitorConfig,
    classifier: IntensityClassifier,
    permission_granted: bool,
    session: Option<MonitorSession>,
}

impl<P: MotionPlatform> ActivityMonitor<P> {
    pub fn new(platform: P, config: MonitorConfig) -> Self {
        let classifier = config.classifier();
        Self {
            platform,
            config,
            classifier,
            permission_granted: false,
            session: None,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Whether the motion sensor exists on this device
    pub async fn is_available(&self) -> bool {
        self.platform.is_available().await
    }

    /// Ask for motion-sensing authorization. The answer is remembered.
    pub async fn request_permission(&mut self) -> bool {
        self.permission_granted = self.platform.request_permission().await;
        if !self.permission_granted {
            tracing::warn!("Motion permission not granted on {}", self.platform.name());
        }
        self.permission_granted
    }

    /// Register an observer, opening the sensor if it is the first one.
    ///
    /// Returns false, without subscribing, when the sensor is missing or
    /// permission is denied. Registering an id that is already present is a
    /// no-op that reports success.
    pub async fn start_detection(&mut self, id: ObserverId, observer: Box<dyn ActivityObserver>) -> bool {
        if let Some(session) = self.session.as_mut() {
            if session.contains(&id) {
                tracing::debug!("Observer {} already registered", id);
            } else {
                session.observers.push((id, observer));
            }
            return true;
        }

        if !self.is_available().await {
            tracing::warn!("Accelerometer not available on {}", self.platform.name());
            return false;
        }
        if !self.permission_granted && !self.request_permission().await {
            return false;
        }

        let stream = match self.platform.subscribe(self.config.sampling_interval) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to subscribe to {}: {}", self.platform.name(), e);
                return false;
            }
        };

        self.session = Some(MonitorSession {
            stream,
            window: SlidingWindow::new(self.config.window_size),
            observers: vec![(id, observer)],
        });

        tracing::info!(
            "Activity detection started on {} (interval {:?})",
            self.platform.name(),
            self.config.sampling_interval
        );
        true
    }

    /// Unregister one observer, or every observer when `id` is `None`.
    ///
    /// Closing the last observer closes the sensor and clears the smoothing
    /// window. Calling this while not listening does nothing.
    pub fn stop_detection(&mut self, id: Option<&ObserverId>) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Activity detection not running");
            return;
        };

        match id {
            Some(id) => session.observers.retain(|(existing, _)| existing != id),
            None => session.observers.clear(),
        }

        if !session.observers.is_empty() {
            return;
        }

        self.platform.unsubscribe();
        self.session = None;
        tracing::info!("Activity detection stopped");
    }

    pub fn status(&self) -> MonitorStatus {
        MonitorStatus {
            is_listening: self.session.is_some(),
            observer_count: self.session.as_ref().map(|s| s.observers.len()).unwrap_or(0),
        }
    }

    pub fn is_listening(&self) -> bool {
        self.session.is_some()
    }

    /// Wait for the next sensor reading and deliver it.
    ///
    /// Returns `None` when not listening, or when the sensor stream ends, in
    /// which case the session is torn down.
    pub async fn next_sample(&mut self) -> Option<ActivitySample> {
        let reading = self.session.as_mut()?.stream.recv().await;

        match reading {
            Some(reading) => self.process_reading(&reading),
            None => {
                tracing::warn!("Sensor stream from {} ended", self.platform.name());
                self.stop_detection(None);
                None
            }
        }
    }

    /// Smooth, classify and deliver one raw reading.
    ///
    /// A failing observer is logged and skipped; the others still get the
    /// sample.
    pub fn process_reading(&mut self, reading: &AccelerometerReading) -> Option<ActivitySample> {
        let session = self.session.as_mut()?;

        let raw_magnitude = motion_magnitude(reading);
        session.window.push(raw_magnitude);
        let smoothed = session.window.mean();

        let sample = ActivitySample {
            raw_magnitude,
            smoothed_magnitude: smoothed,
            intensity: self.classifier.intensity(smoothed),
            is_moving: self.classifier.is_moving(smoothed),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        for (id, observer) in session.observers.iter_mut() {
            if let Err(e) = observer.on_activity_sample(&sample) {
                tracing::error!("Error in activity observer {}: {}", id, e);
            }
        }

        Some(sample)
    }
}
