//! Completion callback contract
//!
//! `POST {backend}/recordings/{id}/complete/{verification_token}`
//!
//! The payload is identical whether the pipeline ran in-process or on a
//! remote worker. Delivery is attempted once; failures are reported to the
//! caller and never retried here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::recording::Recording;
use super::store::RecordingStore;
use crate::clips::Clips;
use crate::error::{Result, StemforgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Complete,
    Error,
}

/// One delivered stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemPayload {
    pub stem_type: String,
    pub measured_lufs: f64,
    pub peak_amplitude: f64,
    pub stem_gain_adjustment_db: f64,
    pub audio_url: String,
    pub waveform_url: String,
    pub file_size_bytes: u64,
    pub duration_seconds: f64,
}

/// Body of the completion callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub status: CompletionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stems: Option<Vec<StemPayload>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clip_boundaries: Option<Clips>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompletionPayload {
    pub fn complete(stems: Vec<StemPayload>, clip_boundaries: Clips) -> Self {
        Self {
            status: CompletionStatus::Complete,
            stems: Some(stems),
            clip_boundaries: Some(clip_boundaries),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CompletionStatus::Error,
            stems: None,
            clip_boundaries: None,
            error: Some(message.into()),
        }
    }

    /// Stem types in payload order
    pub fn stem_types(&self) -> Vec<&str> {
        self.stems
            .iter()
            .flatten()
            .map(|s| s.stem_type.as_str())
            .collect()
    }
}

/// Full callback URL for a recording.
pub fn completion_url(backend_url: &str, recording_id: &str, verification_token: &str) -> String {
    format!(
        "{}/recordings/{}/complete/{}",
        backend_url.trim_end_matches('/'),
        recording_id,
        verification_token
    )
}

/// Where completion payloads go.
pub trait CallbackSink: Send + Sync {
    /// Deliver `payload` once to `callback_url`.
    fn deliver(
        &self,
        callback_url: &str,
        recording_id: &str,
        verification_token: &str,
        payload: &CompletionPayload,
    ) -> Result<()>;
}

/// HTTP callback client
pub struct CallbackClient {
    client: reqwest::blocking::Client,
}

impl CallbackClient {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StemforgeError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl CallbackSink for CallbackClient {
    fn deliver(
        &self,
        callback_url: &str,
        recording_id: &str,
        _verification_token: &str,
        payload: &CompletionPayload,
    ) -> Result<()> {
        let delivery_error = |reason: String| StemforgeError::CallbackDelivery {
            url: callback_url.to_string(),
            reason,
        };

        debug!(recording_id, status = ?payload.status, "Posting completion callback");
        let response = self
            .client
            .post(callback_url)
            .json(payload)
            .send()
            .map_err(|e| delivery_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(delivery_error(format!("backend returned {}", response.status())));
        }

        info!(recording_id, status = ?payload.status, "Completion callback delivered");
        Ok(())
    }
}

/// Sink that applies payloads directly to a recording store, for setups
/// where the backend and the pipeline share one data directory.
pub struct StoreCallbackSink<S> {
    store: S,
}

impl<S: RecordingStore> StoreCallbackSink<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: RecordingStore> CallbackSink for StoreCallbackSink<S> {
    fn deliver(
        &self,
        _callback_url: &str,
        recording_id: &str,
        verification_token: &str,
        payload: &CompletionPayload,
    ) -> Result<()> {
        receive_completion(&self.store, recording_id, verification_token, payload)?;
        Ok(())
    }
}

/// Backend side of the callback: authenticate and record the outcome.
pub fn receive_completion(
    store: &dyn RecordingStore,
    recording_id: &str,
    verification_token: &str,
    payload: &CompletionPayload,
) -> Result<Recording> {
    let mut recording = store.load(recording_id)?;
    recording.verify_token(verification_token)?;
    recording.apply_completion(payload);
    store.save(&recording)?;
    info!(recording_id, status = %recording.status, "Completion received");
    Ok(recording)
}
