//! Error handling for Stemforge
//!
//! Errors fall into four classes: configuration problems (fatal before any
//! I/O), model execution failures (fatal for the attempt, safe to retry),
//! missing intermediates (invalidate the cache and rerun the stage) and
//! callback delivery failures (logged, never retried within a run).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stemforge operations
pub type Result<T> = std::result::Result<T, StemforgeError>;

/// Main error type for Stemforge operations
#[derive(Error, Debug)]
pub enum StemforgeError {
    // Configuration Errors
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("Unknown profile: {name}")]
    UnknownProfile { name: String },

    #[error("Model '{model}' produced slots {actual:?} but the strategy declares {expected:?}")]
    SlotMismatch {
        model: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    // Model Errors
    #[error("Failed to load model '{model}': {reason}")]
    ModelLoad { model: String, reason: String },

    #[error("Model '{model}' failed: {reason}")]
    ModelExecution { model: String, reason: String },

    // File Errors
    #[error("Intermediate stem missing: {path}")]
    MissingIntermediateFile { path: PathBuf },

    #[error("Source audio not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Failed to read audio file {path}: {source}")]
    AudioRead {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Failed to write audio file {path}: {source}")]
    AudioWrite {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Format conversion failed for {path}: {reason}")]
    Conversion { path: PathBuf, reason: String },

    // Recording Errors
    #[error("Recording not found: {id}")]
    RecordingNotFound { id: String },

    #[error("Recording {id} is already being processed")]
    RecordingBusy { id: String },

    #[error("Verification token mismatch for recording {id}")]
    InvalidVerificationToken { id: String },

    // Delivery Errors
    #[error("Callback delivery to {url} failed: {reason}")]
    CallbackDelivery { url: String, reason: String },

    #[error("Dispatch to worker {url} failed: {reason}")]
    Dispatch { url: String, reason: String },

    // Generic Errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StemforgeError {
    /// Shorthand for a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        StemforgeError::Configuration {
            reason: reason.into(),
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StemforgeError::Configuration { .. } => "CONFIGURATION_ERROR",
            StemforgeError::UnknownStrategy { .. } => "UNKNOWN_STRATEGY",
            StemforgeError::UnknownProfile { .. } => "UNKNOWN_PROFILE",
            StemforgeError::SlotMismatch { .. } => "SLOT_MISMATCH",
            StemforgeError::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            StemforgeError::ModelExecution { .. } => "MODEL_EXECUTION_ERROR",
            StemforgeError::MissingIntermediateFile { .. } => "MISSING_INTERMEDIATE_FILE",
            StemforgeError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            StemforgeError::AudioRead { .. } => "AUDIO_READ_ERROR",
            StemforgeError::AudioWrite { .. } => "AUDIO_WRITE_ERROR",
            StemforgeError::Conversion { .. } => "CONVERSION_ERROR",
            StemforgeError::RecordingNotFound { .. } => "RECORDING_NOT_FOUND",
            StemforgeError::RecordingBusy { .. } => "RECORDING_BUSY",
            StemforgeError::InvalidVerificationToken { .. } => "INVALID_VERIFICATION_TOKEN",
            StemforgeError::CallbackDelivery { .. } => "CALLBACK_DELIVERY_ERROR",
            StemforgeError::Dispatch { .. } => "DISPATCH_ERROR",
            StemforgeError::Internal(_) => "INTERNAL_ERROR",
            StemforgeError::Io(_) => "IO_ERROR",
            StemforgeError::Json(_) => "JSON_ERROR",
            StemforgeError::Yaml(_) => "YAML_ERROR",
        }
    }

    /// Configuration errors are detected before any audio is touched and
    /// will fail again on every retry until the configuration changes.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            StemforgeError::Configuration { .. }
                | StemforgeError::UnknownStrategy { .. }
                | StemforgeError::UnknownProfile { .. }
                | StemforgeError::SlotMismatch { .. }
                | StemforgeError::Yaml(_)
        )
    }

    /// Returns true if retrying the whole attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StemforgeError::ModelExecution { .. }
                | StemforgeError::ModelLoad { .. }
                | StemforgeError::MissingIntermediateFile { .. }
                | StemforgeError::CallbackDelivery { .. }
                | StemforgeError::Dispatch { .. }
                | StemforgeError::RecordingBusy { .. }
                | StemforgeError::Io(_)
        )
    }

    /// Returns a user-facing recovery suggestion.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StemforgeError::UnknownStrategy { .. } | StemforgeError::UnknownProfile { .. } => {
                Some("Check the strategies and profiles sections of the configuration file.")
            }
            StemforgeError::SlotMismatch { .. } => {
                Some("Update the strategy so its outputs match the slots the model produces.")
            }
            StemforgeError::ModelExecution { .. } | StemforgeError::ModelLoad { .. } => {
                Some("Retry processing; separation restarts from the first unfinished stage.")
            }
            StemforgeError::SourceNotFound { .. } => {
                Some("Re-upload the recording; the original audio is no longer available.")
            }
            StemforgeError::RecordingBusy { .. } => {
                Some("Wait for the running attempt to finish, or remove a stale lock file.")
            }
            StemforgeError::Conversion { .. } => Some("Make sure ffmpeg is installed and on PATH."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = StemforgeError::UnknownStrategy {
            name: "missing".to_string(),
        };
        assert_eq!(err.error_code(), "UNKNOWN_STRATEGY");
        assert!(err.is_configuration_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_model_failure_is_retryable() {
        let err = StemforgeError::ModelExecution {
            model: "htdemucs".to_string(),
            reason: "CUDA out of memory".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_configuration_error());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_slot_mismatch_message() {
        let err = StemforgeError::SlotMismatch {
            model: "htdemucs".to_string(),
            expected: vec!["bass".to_string()],
            actual: vec!["drums".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("htdemucs"));
        assert!(msg.contains("drums"));
    }
}
