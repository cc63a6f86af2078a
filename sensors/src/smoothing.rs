//! Smoothing and intensity classification
//!
//! Raw accelerometer magnitudes are noisy; a short moving average over the
//! most recent readings feeds a two-threshold classifier.

use pacer_hal::AccelerometerReading;
use std::collections::VecDeque;

/// Magnitude with one g of gravity removed, as a non-negative value
pub fn motion_magnitude(reading: &AccelerometerReading) -> f64 {
    (reading.magnitude() - 1.0).abs()
}

/// Fixed-capacity sliding window; the oldest value is evicted first
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    data: VecDeque<f64>,
    capacity: usize,
}

impl SlidingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add value to window
    pub fn push(&mut self, value: f64) {
        if self.data.len() >= self.capacity {
            self.data.pop_front();
        }
        self.data.push_back(value);
    }

    /// Arithmetic mean of the values in the window, 0.0 when empty
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f64>() / self.data.len() as f64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check if window is full
    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Get all values, oldest first
    pub fn values(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }
}

/// Maps a smoothed magnitude onto a moving flag and a 0-1 intensity
#[derive(Debug, Clone, Copy)]
pub struct IntensityClassifier {
    /// Smoothed magnitude above which the device counts as moving
    pub movement_threshold: f64,
    /// Smoothed magnitude that maps to full intensity
    pub high_intensity_threshold: f64,
}

impl Default for IntensityClassifier {
    fn default() -> Self {
        Self {
            movement_threshold: 0.1,
            high_intensity_threshold: 0.3,
        }
    }
}

impl IntensityClassifier {
    pub fn is_moving(&self, smoothed: f64) -> bool {
        smoothed > self.movement_threshold
    }

    /// Normalized intensity, clamped to [0.0, 1.0]
    pub fn intensity(&self, smoothed: f64) -> f64 {
        let ratio = smoothed / self.high_intensity_threshold;
        if ratio.is_nan() {
            return 0.0;
        }
        ratio.clamp(0.0, 1.0)
    }
}
