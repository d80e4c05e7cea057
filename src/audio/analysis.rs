//! Per-stem loudness metrics and waveform peaks
//!
//! Only consumed to populate the completion payload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::io::read_wav;
use crate::error::Result;

/// Absolute loudness floor; anything quieter reports this value.
pub const LOUDNESS_FLOOR_LUFS: f64 = -70.0;

/// Default loudness target for gain suggestions.
pub const DEFAULT_TARGET_LUFS: f64 = -14.0;

/// Loudness numbers for one stem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StemMetrics {
    pub measured_lufs: f64,
    pub peak_amplitude: f64,
    pub gain_adjustment_db: f64,
}

/// Metadata/loudness analyzer collaborator.
pub trait LoudnessAnalyzer: Send + Sync {
    fn analyze(&self, stems: &BTreeMap<String, PathBuf>) -> Result<BTreeMap<String, StemMetrics>>;
}

/// Mean-square loudness over the whole file (BS.1770 scale, no K-weighting
/// or gating).
#[derive(Debug, Clone)]
pub struct WavLoudnessAnalyzer {
    pub target_lufs: f64,
}

impl WavLoudnessAnalyzer {
    pub fn new(target_lufs: f64) -> Self {
        Self { target_lufs }
    }

    pub fn measure(&self, path: &Path) -> Result<StemMetrics> {
        let data = read_wav(path)?;
        let channels = data.channels.max(1) as usize;
        let frames = data.num_frames();

        let mut peak = 0.0f64;
        let mut channel_power = vec![0.0f64; channels];
        for frame in data.samples.chunks_exact(channels) {
            for (ch, &s) in frame.iter().enumerate() {
                let s = s as f64;
                channel_power[ch] += s * s;
                peak = peak.max(s.abs());
            }
        }

        let measured_lufs = if frames == 0 {
            LOUDNESS_FLOOR_LUFS
        } else {
            // Channel powers are summed, not averaged
            let power: f64 = channel_power.iter().map(|p| p / frames as f64).sum();
            if power > 0.0 {
                (-0.691 + 10.0 * power.log10()).max(LOUDNESS_FLOOR_LUFS)
            } else {
                LOUDNESS_FLOOR_LUFS
            }
        };

        let gain_adjustment_db = if measured_lufs <= LOUDNESS_FLOOR_LUFS {
            0.0
        } else {
            self.target_lufs - measured_lufs
        };

        Ok(StemMetrics {
            measured_lufs,
            peak_amplitude: peak,
            gain_adjustment_db,
        })
    }
}

impl Default for WavLoudnessAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_LUFS)
    }
}

impl LoudnessAnalyzer for WavLoudnessAnalyzer {
    fn analyze(&self, stems: &BTreeMap<String, PathBuf>) -> Result<BTreeMap<String, StemMetrics>> {
        stems
            .iter()
            .map(|(name, path)| Ok((name.clone(), self.measure(path)?)))
            .collect()
    }
}

/// Min/max envelope used to draw a stem's waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformPeaks {
    pub sample_rate: u32,
    pub samples_per_bin: usize,
    pub min: Vec<f32>,
    pub max: Vec<f32>,
}

/// Default number of bins for a waveform.
pub const WAVEFORM_BINS: usize = 1000;

/// Compute `bins` min/max pairs over the mono mixdown of a WAV file.
pub fn waveform_peaks(path: &Path, bins: usize) -> Result<WaveformPeaks> {
    let data = read_wav(path)?;
    let mono = data.to_mono();
    let bins = bins.max(1);
    let samples_per_bin = mono.len().div_ceil(bins).max(1);

    let (min, max): (Vec<f32>, Vec<f32>) = mono
        .chunks(samples_per_bin)
        .map(|chunk| {
            chunk.iter().fold((0.0f32, 0.0f32), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            })
        })
        .unzip();

    Ok(WaveformPeaks {
        sample_rate: data.sample_rate,
        samples_per_bin,
        min,
        max,
    })
}
