//! Recording entity and its processing checkpoints

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::callback::{CompletionPayload, CompletionStatus, StemPayload};
use crate::audio::AudioFormat;
use crate::clips::Clips;
use crate::error::{Result, StemforgeError};

/// Recording lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Processing,
    Complete,
    Error,
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecordingStatus::Processing => "processing",
            RecordingStatus::Complete => "complete",
            RecordingStatus::Error => "error",
        };
        f.pad(name)
    }
}

/// One uploaded recording and everything the pipeline has learned about it.
///
/// The three checkpoint timestamps only ever move from `None` to `Some`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub status: RecordingStatus,

    /// Issued at creation; authenticates the completion callback.
    pub verification_token: String,

    /// Storage reference of the uploaded source audio
    pub input_filename: String,

    /// Base name for delivered files
    pub output_name: String,

    pub profile_name: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    // Checkpoints
    #[serde(default)]
    pub separated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clips_detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub converted_at: Option<DateTime<Utc>>,

    /// Lossless intermediate stems by final stem name
    #[serde(default)]
    pub stems: BTreeMap<String, PathBuf>,

    #[serde(default)]
    pub clip_boundaries: Option<Clips>,

    /// Format the stems were converted to, set with `converted_at`
    #[serde(default)]
    pub converted_format: Option<AudioFormat>,

    /// Stems as last reported through the completion callback
    #[serde(default)]
    pub delivered_stems: Vec<StemPayload>,

    #[serde(default)]
    pub error_message: Option<String>,
}

impl Recording {
    pub fn new(
        input_filename: impl Into<String>,
        output_name: impl Into<String>,
        profile_name: impl Into<String>,
    ) -> Self {
        Self::with_identity(
            Uuid::new_v4().to_string(),
            Uuid::new_v4().simple().to_string(),
            input_filename,
            output_name,
            profile_name,
        )
    }

    /// A recording whose id and token were issued elsewhere.
    pub fn with_identity(
        id: impl Into<String>,
        verification_token: impl Into<String>,
        input_filename: impl Into<String>,
        output_name: impl Into<String>,
        profile_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            status: RecordingStatus::Processing,
            verification_token: verification_token.into(),
            input_filename: input_filename.into(),
            output_name: output_name.into(),
            profile_name: profile_name.into(),
            created_at: now,
            updated_at: now,
            separated_at: None,
            clips_detected_at: None,
            converted_at: None,
            stems: BTreeMap::new(),
            clip_boundaries: None,
            converted_format: None,
            delivered_stems: Vec::new(),
            error_message: None,
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<()> {
        if self.verification_token == token {
            Ok(())
        } else {
            Err(StemforgeError::InvalidVerificationToken {
                id: self.id.clone(),
            })
        }
    }

    /// Start a new attempt. Checkpoints are kept.
    pub fn begin_attempt(&mut self) {
        self.status = RecordingStatus::Processing;
        self.error_message = None;
        self.touch();
    }

    pub fn mark_separated(&mut self, stems: BTreeMap<String, PathBuf>) {
        self.stems = stems;
        self.separated_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_clips_detected(&mut self, clips: Clips) {
        self.clip_boundaries = Some(clips);
        self.clips_detected_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_converted(&mut self, format: AudioFormat) {
        self.converted_format = Some(format);
        self.converted_at = Some(Utc::now());
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = RecordingStatus::Error;
        self.error_message = Some(message.into());
        self.touch();
    }

    /// Apply a completion payload the way the backend records it.
    pub fn apply_completion(&mut self, payload: &CompletionPayload) {
        match payload.status {
            CompletionStatus::Complete => {
                self.status = RecordingStatus::Complete;
                self.error_message = None;
                if let Some(stems) = &payload.stems {
                    self.delivered_stems = stems.clone();
                }
                if let Some(clips) = &payload.clip_boundaries {
                    self.clip_boundaries = Some(clips.clone());
                }
            }
            CompletionStatus::Error => {
                self.status = RecordingStatus::Error;
                self.error_message = payload.error.clone();
            }
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
