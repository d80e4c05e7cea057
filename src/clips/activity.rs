//! Per-stem activity analysis
//!
//! Short-time RMS energy in dB relative to the stem's own peak, thresholded
//! to active/inactive frames, dilated to bridge short pauses, and turned
//! into time ranges.

use tracing::debug;

use super::range::TimeRange;
use super::ClipDetectionConfig;

/// Analysis frame length in samples
pub const FRAME_LENGTH: usize = 2048;

/// Hop between analysis frames in samples
pub const HOP_LENGTH: usize = 512;

/// Lowest dB value reported relative to the peak
pub const DB_FLOOR: f32 = -80.0;

/// Bounds for the adaptive threshold
pub const ADAPTIVE_MIN_DB: f32 = -60.0;
pub const ADAPTIVE_MAX_DB: f32 = -20.0;

const AMPLITUDE_EPSILON: f32 = 1e-10;

/// Activity of one stem on its own timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct StemActivity {
    pub ranges: Vec<TimeRange>,
    pub duration_sec: f64,
    pub threshold_db: f32,
}

/// RMS of frames centred every `HOP_LENGTH` samples, zero-padded at the
/// edges.
pub fn rms_frames(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += (s as f64) * (s as f64);
        prefix.push(acc);
    }

    let n = samples.len() as i64;
    let half = (FRAME_LENGTH / 2) as i64;
    let num_frames = 1 + samples.len() / HOP_LENGTH;

    (0..num_frames)
        .map(|i| {
            let center = (i * HOP_LENGTH) as i64;
            let lo = (center - half).clamp(0, n) as usize;
            let hi = (center + half).clamp(0, n) as usize;
            let energy = (prefix[hi] - prefix[lo]).max(0.0);
            (energy / FRAME_LENGTH as f64).sqrt() as f32
        })
        .collect()
}

/// Convert frame RMS to dB relative to the loudest frame, floored at
/// `DB_FLOOR`. A silent stem yields all-floor values.
pub fn to_relative_db(rms: &[f32]) -> Vec<f32> {
    let peak = rms.iter().copied().fold(0.0f32, f32::max);
    if peak <= AMPLITUDE_EPSILON {
        return vec![DB_FLOOR; rms.len()];
    }
    rms.iter()
        .map(|&v| (20.0 * (v.max(AMPLITUDE_EPSILON) / peak).log10()).max(DB_FLOOR))
        .collect()
}

/// Linearly interpolated percentile (`q` in 0..=100).
pub fn percentile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return DB_FLOOR;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Midpoint between the stem's noise floor (10th percentile) and typical
/// level (median), clamped to [-60, -20] dB.
pub fn adaptive_threshold_db(db: &[f32]) -> f32 {
    let floor = percentile(db, 10.0);
    let typical = percentile(db, 50.0);
    ((floor + typical) / 2.0).clamp(ADAPTIVE_MIN_DB, ADAPTIVE_MAX_DB)
}

/// Binary dilation with a centred window of `width` frames.
pub fn dilate(active: &[bool], width: usize) -> Vec<bool> {
    let radius = width / 2;
    if radius == 0 || active.is_empty() {
        return active.to_vec();
    }

    let n = active.len();
    // Distance to the nearest active frame on each side
    let mut dist_prev = vec![usize::MAX; n];
    let mut last: Option<usize> = None;
    for i in 0..n {
        if active[i] {
            last = Some(i);
        }
        if let Some(j) = last {
            dist_prev[i] = i - j;
        }
    }

    let mut next: Option<usize> = None;
    let mut out = vec![false; n];
    for i in (0..n).rev() {
        if active[i] {
            next = Some(i);
        }
        let dist_next = next.map_or(usize::MAX, |j| j - i);
        out[i] = dist_prev[i].min(dist_next) <= radius;
    }
    out
}

/// Contiguous runs of active frames as time ranges, clipped to the stem's
/// duration.
pub fn frames_to_ranges(active: &[bool], sample_rate: u32, duration_sec: f64) -> Vec<TimeRange> {
    let frame_sec = HOP_LENGTH as f64 / sample_rate as f64;
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &is_active) in active.iter().chain(std::iter::once(&false)).enumerate() {
        match (is_active, run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                let range = TimeRange::new(
                    (start as f64 * frame_sec).min(duration_sec),
                    (i as f64 * frame_sec).min(duration_sec),
                );
                if range.end > range.start {
                    ranges.push(range);
                }
                run_start = None;
            }
            _ => {}
        }
    }
    ranges
}

/// Full per-stem analysis of a mono signal.
pub fn analyze(samples: &[f32], sample_rate: u32, config: &ClipDetectionConfig) -> StemActivity {
    let duration_sec = if sample_rate == 0 {
        0.0
    } else {
        samples.len() as f64 / sample_rate as f64
    };
    if samples.is_empty() || sample_rate == 0 {
        return StemActivity {
            ranges: Vec::new(),
            duration_sec,
            threshold_db: config.threshold_db,
        };
    }

    let db = to_relative_db(&rms_frames(samples));
    let silent = db.iter().all(|&v| v <= DB_FLOOR);
    let threshold_db = if config.adaptive_threshold {
        adaptive_threshold_db(&db)
    } else {
        config.threshold_db
    };

    let active: Vec<bool> = db.iter().map(|&v| !silent && v > threshold_db).collect();
    let width = (config.dilation_sec * sample_rate as f64 / HOP_LENGTH as f64).round() as usize;
    let dilated = dilate(&active, width);
    let ranges = frames_to_ranges(&dilated, sample_rate, duration_sec);

    debug!(
        threshold_db,
        ranges = ranges.len(),
        duration_sec,
        "Stem activity analyzed"
    );

    StemActivity {
        ranges,
        duration_sec,
        threshold_db,
    }
}
