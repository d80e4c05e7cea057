//! Clip boundary detection
//!
//! Splits a continuous rehearsal recording into musically active sections
//! using silence analysis across its separated stems. Detection is
//! deterministic for fixed inputs and parameters.

pub mod activity;
mod detector;
pub mod range;

use serde::{Deserialize, Serialize};

pub use activity::{StemActivity, FRAME_LENGTH, HOP_LENGTH};
pub use detector::{ClipDetector, Clips};
pub use range::{ClipBoundary, TimeRange};

/// Clip detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipDetectionConfig {
    /// Fixed activity threshold in dB below each stem's peak
    pub threshold_db: f32,
    /// Derive the threshold per stem from its own level distribution
    /// instead of using `threshold_db`
    pub adaptive_threshold: bool,
    /// Pauses shorter than this (breaths, rests) do not split activity
    pub dilation_sec: f64,
    /// Clips shorter than this are discarded
    pub min_clip_duration_sec: f64,
}

impl Default for ClipDetectionConfig {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            adaptive_threshold: true,
            dilation_sec: 0.5,
            min_clip_duration_sec: 5.0,
        }
    }
}

impl ClipDetectionConfig {
    /// Fixed-threshold configuration
    pub fn fixed(threshold_db: f32) -> Self {
        Self {
            threshold_db,
            adaptive_threshold: false,
            ..Self::default()
        }
    }
}
