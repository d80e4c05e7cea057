//! Clip boundary detection across stems
//!
//! 1. Each stem is reduced to its own active time ranges.
//! 2. Islands are the spans where *every* stem is active at once, so a
//!    lone instrument (a soundcheck, a tuning bass) cannot seed a clip.
//! 3. Each island grows by absorbing any single stem's range that touches
//!    it, repeated to a fixed point, so a vocal pickup before the band
//!    enters stays inside the clip. Grown islands that overlap are merged
//!    and anything shorter than the minimum duration is dropped.
//!
//! If nothing survives (no island at all, or only short ones) but the
//! recording is at least the minimum duration long, the whole recording
//! becomes one clip.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info};

use super::activity::{self, StemActivity};
use super::range::{grow, intersect_all, merge_overlapping, ClipBoundary, TimeRange};
use super::ClipDetectionConfig;
use crate::audio::io::read_wav;
use crate::error::Result;

/// Clip id -> boundary, ordered by start time
pub type Clips = BTreeMap<u32, ClipBoundary>;

/// Segments a recording into musically active clips
#[derive(Debug, Clone, Default)]
pub struct ClipDetector {
    config: ClipDetectionConfig,
}

impl ClipDetector {
    pub fn new(config: ClipDetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClipDetectionConfig {
        &self.config
    }

    /// Detect clips from per-category stem files.
    pub fn detect(&self, stems: &BTreeMap<String, PathBuf>) -> Result<Clips> {
        let mut activities = Vec::with_capacity(stems.len());
        for (category, path) in stems {
            let data = read_wav(path)?;
            let activity = activity::analyze(&data.to_mono(), data.sample_rate, &self.config);
            debug!(
                stem = %category,
                threshold_db = activity.threshold_db,
                ranges = activity.ranges.len(),
                "Stem activity"
            );
            activities.push(activity);
        }

        let clips = self.detect_from_activity(&activities);
        info!(stems = stems.len(), clips = clips.len(), "Clip detection complete");
        Ok(clips)
    }

    /// Spans where every stem is active.
    pub fn islands(&self, activities: &[StemActivity]) -> Vec<TimeRange> {
        let lists: Vec<Vec<TimeRange>> = activities.iter().map(|a| a.ranges.clone()).collect();
        intersect_all(&lists)
    }

    /// Detection over already-analyzed stems.
    pub fn detect_from_activity(&self, activities: &[StemActivity]) -> Clips {
        let total_duration = activities
            .iter()
            .map(|a| a.duration_sec)
            .fold(0.0f64, f64::max);
        if activities.is_empty() || total_duration <= 0.0 {
            return Clips::new();
        }

        let islands = self.islands(activities);
        let all_ranges: Vec<TimeRange> = activities
            .iter()
            .flat_map(|a| a.ranges.iter().copied())
            .collect();

        let grown: Vec<TimeRange> = islands
            .into_iter()
            .map(|island| grow(island, &all_ranges))
            .collect();

        let clips: Clips = merge_overlapping(grown)
            .into_iter()
            .filter(|r| r.end > r.start && r.duration() >= self.config.min_clip_duration_sec)
            .enumerate()
            .map(|(id, range)| (id as u32, ClipBoundary::from(range)))
            .collect();

        // Recordings long enough for a clip always get at least one
        if clips.is_empty() && total_duration >= self.config.min_clip_duration_sec {
            debug!(total_duration, "No clip survived, using whole recording");
            return Clips::from([(0, ClipBoundary::from(TimeRange::new(0.0, total_duration)))]);
        }
        clips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn activity(ranges: &[(f64, f64)], duration: f64) -> StemActivity {
        StemActivity {
            ranges: ranges.iter().map(|&(s, e)| TimeRange::new(s, e)).collect(),
            duration_sec: duration,
            threshold_db: -40.0,
        }
    }

    #[test]
    fn test_island_grows_to_widest_touching_stem() {
        let detector = ClipDetector::default();
        let stems = vec![activity(&[(2.0, 8.0)], 12.0), activity(&[(2.0, 9.0)], 12.0)];

        assert_eq!(detector.islands(&stems), vec![TimeRange::new(2.0, 8.0)]);

        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[&0], ClipBoundary { start_time_sec: 2.0, end_time_sec: 9.0 });
    }

    #[test]
    fn test_pickup_before_band_is_absorbed() {
        let detector = ClipDetector::default();
        let stems = vec![
            activity(&[(1.0, 4.0), (4.0, 20.0)], 30.0), // vocals with pickup
            activity(&[(5.0, 20.0)], 30.0),             // drums
        ];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips[&0].start_time_sec, 1.0);
    }

    #[test]
    fn test_short_clips_are_dropped() {
        let detector = ClipDetector::default();
        let stems = vec![
            activity(&[(0.0, 10.0), (20.0, 22.0)], 30.0),
            activity(&[(0.0, 10.0), (20.0, 22.0)], 30.0),
        ];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[&0].end_time_sec, 10.0);
    }

    #[test]
    fn test_grown_islands_merge() {
        let detector = ClipDetector::default();
        let stems = vec![
            activity(&[(0.0, 6.0), (8.0, 14.0)], 20.0),
            activity(&[(0.0, 14.0)], 20.0),
        ];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[&0], ClipBoundary { start_time_sec: 0.0, end_time_sec: 14.0 });
    }

    #[test]
    fn test_fallback_when_no_islands() {
        let detector = ClipDetector::default();
        let stems = vec![activity(&[(1.0, 4.0)], 12.0), activity(&[(6.0, 9.0)], 12.0)];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[&0], ClipBoundary { start_time_sec: 0.0, end_time_sec: 12.0 });
    }

    #[test]
    fn test_fallback_when_every_island_is_too_short() {
        let detector = ClipDetector::default();
        let stems = vec![
            activity(&[(2.0, 4.0), (10.0, 12.0)], 20.0),
            activity(&[(2.0, 4.0), (10.0, 12.0)], 20.0),
        ];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.len(), 1);
        assert_eq!(clips[&0], ClipBoundary { start_time_sec: 0.0, end_time_sec: 20.0 });
    }

    #[test]
    fn test_no_fallback_for_short_recordings() {
        let detector = ClipDetector::default();
        let stems = vec![activity(&[], 3.0), activity(&[], 3.0)];
        assert!(detector.detect_from_activity(&stems).is_empty());
        assert!(detector.detect_from_activity(&[]).is_empty());
    }

    #[test]
    fn test_ids_follow_start_order() {
        let detector = ClipDetector::default();
        let stems = vec![
            activity(&[(0.0, 10.0), (40.0, 60.0)], 60.0),
            activity(&[(0.0, 10.0), (40.0, 60.0)], 60.0),
        ];
        let clips = detector.detect_from_activity(&stems);
        assert_eq!(clips.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert!(clips[&0].start_time_sec < clips[&1].start_time_sec);
        assert!(clips.values().all(|c| c.end_time_sec > c.start_time_sec));
    }
}
