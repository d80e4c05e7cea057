//! Clip Detection Tests
//!
//! Boundary detection over synthesized stem WAV files.

mod common;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use tempfile::tempdir;

use stemforge::clips::{ClipDetectionConfig, ClipDetector};

fn write_stems(dir: &Path, duration: f64, stems: &[(&str, &[(f64, f64)])]) -> BTreeMap<String, PathBuf> {
    stems
        .iter()
        .enumerate()
        .map(|(i, (name, active))| {
            let path = dir.join(format!("{}.wav", name));
            common::write_mono(&path, common::active_between(duration, active, i as u64 + 1));
            (name.to_string(), path)
        })
        .collect()
}

#[test]
fn test_island_grows_to_cover_longer_stem() {
    let dir = tempdir().unwrap();
    let stems = write_stems(
        dir.path(),
        12.0,
        &[("vocals", &[(2.0, 8.0)]), ("drums", &[(2.0, 9.0)])],
    );

    let clips = ClipDetector::default().detect(&stems).unwrap();

    assert_eq!(clips.len(), 1);
    let clip = clips[&0];
    // Frame windows and dilation widen edges by a fraction of a second
    assert!(clip.start_time_sec > 1.4 && clip.start_time_sec <= 2.0, "{:?}", clip);
    assert!(clip.end_time_sec >= 9.0 && clip.end_time_sec < 9.6, "{:?}", clip);
}

#[test]
fn test_uniform_stems_yield_one_full_length_clip() {
    let dir = tempdir().unwrap();
    let stems = write_stems(
        dir.path(),
        12.0,
        &[("vocals", &[(0.0, 12.0)]), ("drums", &[(0.0, 12.0)])],
    );

    let clips = ClipDetector::default().detect(&stems).unwrap();

    assert_eq!(clips.len(), 1);
    assert_abs_diff_eq!(clips[&0].start_time_sec, 0.0);
    assert_abs_diff_eq!(clips[&0].end_time_sec, 12.0, epsilon = 1e-9);
}

#[test]
fn test_disjoint_stems_fall_back_to_whole_recording() {
    let dir = tempdir().unwrap();
    let stems = write_stems(
        dir.path(),
        12.0,
        &[("vocals", &[(1.0, 4.0)]), ("bass", &[(6.0, 10.0)])],
    );

    let clips = ClipDetector::default().detect(&stems).unwrap();

    assert_eq!(clips.len(), 1);
    assert_abs_diff_eq!(clips[&0].start_time_sec, 0.0);
    assert_abs_diff_eq!(clips[&0].end_time_sec, 12.0, epsilon = 1e-9);
}

#[test]
fn test_short_sections_are_dropped() {
    let dir = tempdir().unwrap();
    let both: &[(f64, f64)] = &[(1.0, 3.0), (5.0, 13.0)];
    let stems = write_stems(dir.path(), 14.0, &[("vocals", both), ("drums", both)]);

    let clips = ClipDetector::default().detect(&stems).unwrap();

    assert_eq!(clips.len(), 1);
    assert!(clips[&0].start_time_sec > 4.5 && clips[&0].start_time_sec <= 5.0);
}

#[test]
fn test_songs_separated_by_silence() {
    let dir = tempdir().unwrap();
    let songs: &[(f64, f64)] = &[(1.0, 9.0), (15.0, 25.0), (30.0, 38.0)];
    let stems = write_stems(
        dir.path(),
        40.0,
        &[("vocals", songs), ("drums", songs), ("bass", songs)],
    );

    let clips = ClipDetector::default().detect(&stems).unwrap();

    assert_eq!(clips.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(clips.values().all(|c| c.end_time_sec > c.start_time_sec));
    let bounds: Vec<_> = clips.values().collect();
    assert!(bounds.windows(2).all(|w| w[0].end_time_sec < w[1].start_time_sec));
}

#[test]
fn test_fixed_threshold_matches_adaptive_on_clean_material() {
    let dir = tempdir().unwrap();
    let stems = write_stems(
        dir.path(),
        12.0,
        &[("vocals", &[(2.0, 8.0)]), ("drums", &[(2.0, 9.0)])],
    );

    let adaptive = ClipDetector::default().detect(&stems).unwrap();
    let fixed = ClipDetector::new(ClipDetectionConfig::fixed(-40.0))
        .detect(&stems)
        .unwrap();
    assert_eq!(adaptive, fixed);
}

#[test]
fn test_detection_is_deterministic() {
    let dir = tempdir().unwrap();
    let stems = write_stems(
        dir.path(),
        20.0,
        &[("vocals", &[(1.0, 7.0), (9.0, 18.0)]), ("drums", &[(2.0, 17.0)])],
    );

    let detector = ClipDetector::default();
    assert_eq!(detector.detect(&stems).unwrap(), detector.detect(&stems).unwrap());
}

#[test]
fn test_no_stems_no_clips() {
    assert!(ClipDetector::default().detect(&BTreeMap::new()).unwrap().is_empty());
}

#[test]
fn test_missing_stem_file_is_read_error() {
    let dir = tempdir().unwrap();
    let stems = BTreeMap::from([("vocals".to_string(), dir.path().join("gone.wav"))]);
    let err = ClipDetector::default().detect(&stems).unwrap_err();
    assert_eq!(err.error_code(), "AUDIO_READ_ERROR");
}
