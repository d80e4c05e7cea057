//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use stemforge::audio::{write_wav, WavData};

pub const SAMPLE_RATE: u32 = 8000;

/// Deterministic white noise in [-amplitude, amplitude].
pub fn noise(num_samples: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..num_samples)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 33) as f32 / (1u64 << 31) as f32;
            (unit * 2.0 - 1.0) * amplitude
        })
        .collect()
}

/// Noise inside `active` (seconds), digital silence elsewhere.
pub fn active_between(duration_sec: f64, active: &[(f64, f64)], seed: u64) -> Vec<f32> {
    let total = (duration_sec * SAMPLE_RATE as f64) as usize;
    let source = noise(total, 0.5, seed);
    let mut samples = vec![0.0f32; total];
    for &(start, end) in active {
        let lo = (start * SAMPLE_RATE as f64) as usize;
        let hi = ((end * SAMPLE_RATE as f64) as usize).min(total);
        samples[lo..hi].copy_from_slice(&source[lo..hi]);
    }
    samples
}

pub fn write_mono(path: &Path, samples: Vec<f32>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    write_wav(
        path,
        &WavData {
            samples,
            channels: 1,
            sample_rate: SAMPLE_RATE,
        },
    )
    .unwrap();
}
