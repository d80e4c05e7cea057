//! Resume state, evaluated once when an attempt starts

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::recording::Recording;
use crate::audio::AudioFormat;

/// First stage an attempt has to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePoint {
    Separate,
    DetectClips,
    Convert,
    Report,
}

impl fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResumePoint::Separate => "separate",
            ResumePoint::DetectClips => "detect_clips",
            ResumePoint::Convert => "convert",
            ResumePoint::Report => "report",
        };
        f.pad(name)
    }
}

/// Which stages are already done for a recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageProgress {
    /// Separation checkpoint set and every cached stem still on disk as WAV
    pub separated: bool,
    pub clips_detected: bool,
    /// Conversion done, or nothing to convert for this format
    pub converted: bool,
}

impl StageProgress {
    pub fn evaluate(recording: &Recording, delivery_format: AudioFormat) -> Self {
        let separated = recording.separated_at.is_some() && stems_intact(recording);
        if recording.separated_at.is_some() && !separated {
            warn!(
                recording_id = %recording.id,
                "Cached stems missing or not lossless, separation will run again"
            );
        }

        let converted = if !delivery_format.needs_conversion() {
            true
        } else {
            // Converted files derive from the intermediates; new
            // intermediates need a new conversion.
            separated
                && recording.converted_format == Some(delivery_format)
                && match (recording.converted_at, recording.separated_at) {
                    (Some(converted), Some(separated)) => converted >= separated,
                    _ => false,
                }
                && recording
                    .stems
                    .values()
                    .all(|path| delivery_format.apply_to(path).is_file())
        };

        Self {
            separated,
            clips_detected: recording.clips_detected_at.is_some()
                && recording.clip_boundaries.is_some(),
            converted,
        }
    }

    /// First stage lacking a checkpoint.
    pub fn resume_point(&self) -> ResumePoint {
        if !self.separated {
            ResumePoint::Separate
        } else if !self.clips_detected {
            ResumePoint::DetectClips
        } else if !self.converted {
            ResumePoint::Convert
        } else {
            ResumePoint::Report
        }
    }

    /// Whether `stage` has to run in this attempt.
    pub fn needs(&self, stage: ResumePoint) -> bool {
        match stage {
            ResumePoint::Separate => !self.separated,
            ResumePoint::DetectClips => !self.clips_detected,
            ResumePoint::Convert => !self.converted,
            ResumePoint::Report => true,
        }
    }
}

fn stems_intact(recording: &Recording) -> bool {
    !recording.stems.is_empty()
        && recording.stems.values().all(|path| {
            path.is_file() && AudioFormat::of_path(path) == Some(AudioFormat::INTERMEDIATE)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clips::Clips;
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;
    use test_case::test_case;

    fn separated_recording(dir: &Path) -> Recording {
        let stem = dir.join("vocals.wav");
        fs::write(&stem, b"RIFF").unwrap();
        let mut recording = Recording::new("in.wav", "out", "default");
        recording.mark_separated(BTreeMap::from([("vocals".to_string(), stem)]));
        recording
    }

    #[test]
    fn test_fresh_recording_starts_at_separation() {
        let recording = Recording::new("in.wav", "out", "default");
        let progress = StageProgress::evaluate(&recording, AudioFormat::Mp3);
        assert_eq!(progress.resume_point(), ResumePoint::Separate);
    }

    #[test]
    fn test_separated_resumes_at_clip_detection() {
        let dir = tempdir().unwrap();
        let recording = separated_recording(dir.path());
        let progress = StageProgress::evaluate(&recording, AudioFormat::Mp3);
        assert_eq!(progress.resume_point(), ResumePoint::DetectClips);
        assert!(!progress.needs(ResumePoint::Separate));
    }

    #[test]
    fn test_missing_stem_invalidates_separation() {
        let dir = tempdir().unwrap();
        let mut recording = separated_recording(dir.path());
        recording.mark_clips_detected(Clips::new());
        recording.mark_converted(AudioFormat::Mp3);
        fs::remove_file(dir.path().join("vocals.wav")).unwrap();

        let progress = StageProgress::evaluate(&recording, AudioFormat::Mp3);
        assert_eq!(progress.resume_point(), ResumePoint::Separate);
        assert!(!progress.needs(ResumePoint::DetectClips));
        assert!(progress.needs(ResumePoint::Convert));
    }

    #[test_case(AudioFormat::Wav, ResumePoint::Report ; "lossless delivery has nothing to convert")]
    #[test_case(AudioFormat::Flac, ResumePoint::Convert ; "lossy or other codecs convert")]
    fn test_conversion_depends_on_format(format: AudioFormat, expected: ResumePoint) {
        let dir = tempdir().unwrap();
        let mut recording = separated_recording(dir.path());
        recording.mark_clips_detected(Clips::new());
        assert_eq!(StageProgress::evaluate(&recording, format).resume_point(), expected);
    }

    #[test]
    fn test_conversion_to_another_format_does_not_count() {
        let dir = tempdir().unwrap();
        let mut recording = separated_recording(dir.path());
        recording.mark_clips_detected(Clips::new());
        recording.mark_converted(AudioFormat::Ogg);
        let progress = StageProgress::evaluate(&recording, AudioFormat::Mp3);
        assert_eq!(progress.resume_point(), ResumePoint::Convert);
    }

    #[test]
    fn test_conversion_counts_only_while_files_exist() {
        let dir = tempdir().unwrap();
        let mut recording = separated_recording(dir.path());
        recording.mark_clips_detected(Clips::new());
        recording.mark_converted(AudioFormat::Mp3);
        let converted = dir.path().join("vocals.mp3");
        fs::write(&converted, b"ID3").unwrap();
        assert_eq!(
            StageProgress::evaluate(&recording, AudioFormat::Mp3).resume_point(),
            ResumePoint::Report
        );

        fs::remove_file(&converted).unwrap();
        assert_eq!(
            StageProgress::evaluate(&recording, AudioFormat::Mp3).resume_point(),
            ResumePoint::Convert
        );
    }

    #[test]
    fn test_conversion_older_than_separation_is_stale() {
        let dir = tempdir().unwrap();
        let mut recording = separated_recording(dir.path());
        recording.mark_clips_detected(Clips::new());
        recording.mark_converted(AudioFormat::Mp3);
        fs::write(dir.path().join("vocals.mp3"), b"ID3").unwrap();
        recording.converted_at = recording
            .separated_at
            .map(|t| t - chrono::Duration::seconds(1));

        let progress = StageProgress::evaluate(&recording, AudioFormat::Mp3);
        assert_eq!(progress.resume_point(), ResumePoint::Convert);
    }
}
