//! HTTP separation bridge
//!
//! Talks to an external separation service that owns the ML runtime.
//! The service reads and writes files on a filesystem shared with this
//! process, so only paths cross the wire.
//!
//! - `GET  {bridge}/models/{model}` warms the model and reports readiness
//! - `POST {bridge}/separate` runs one separation step

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{ModelLoader, SeparationModel, SeparationResult};
use crate::error::{Result, StemforgeError};

/// Default bridge URL when none is configured
pub const DEFAULT_BRIDGE_URL: &str = "http://localhost:8001";

/// Default separation timeout (30 minutes; long recordings on CPU are slow)
pub const DEFAULT_SEPARATION_TIMEOUT_SECS: u64 = 1800;

/// Request sent to the separation bridge
#[derive(Debug, Serialize)]
struct SeparateRequest<'a> {
    model: &'a str,
    input_path: String,
    output_dir: String,
}

/// Response from the separation bridge
#[derive(Debug, Deserialize)]
struct SeparateResponse {
    success: bool,
    #[serde(default)]
    outputs: BTreeMap<String, String>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    processing_time_ms: u64,
}

/// Model readiness report
#[derive(Debug, Deserialize)]
struct ModelStatus {
    ready: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// One model served by the bridge
pub struct BridgeSeparator {
    model: String,
    bridge_url: String,
    client: reqwest::blocking::Client,
}

impl BridgeSeparator {
    fn separate_url(&self) -> String {
        format!("{}/separate", self.bridge_url.trim_end_matches('/'))
    }

    fn execution_error(&self, reason: impl Into<String>) -> StemforgeError {
        StemforgeError::ModelExecution {
            model: self.model.clone(),
            reason: reason.into(),
        }
    }
}

impl SeparationModel for BridgeSeparator {
    fn name(&self) -> &str {
        &self.model
    }

    fn separate(&self, input: &Path, output_dir: &Path) -> Result<SeparationResult> {
        let start = Instant::now();
        let request = SeparateRequest {
            model: &self.model,
            input_path: input.to_string_lossy().to_string(),
            output_dir: output_dir.to_string_lossy().to_string(),
        };

        let response = self
            .client
            .post(self.separate_url())
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    self.execution_error("separation timed out")
                } else {
                    self.execution_error(format!("bridge request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            return Err(self.execution_error(format!("bridge returned {}", response.status())));
        }

        let body: SeparateResponse = response
            .json()
            .map_err(|e| self.execution_error(format!("invalid bridge response: {}", e)))?;

        if !body.success {
            return Err(self.execution_error(
                body.error_message
                    .unwrap_or_else(|| "unknown separation error".to_string()),
            ));
        }

        debug!(
            model = %self.model,
            bridge_ms = body.processing_time_ms,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Bridge separation complete"
        );

        Ok(body
            .outputs
            .into_iter()
            .map(|(slot, path)| (slot, PathBuf::from(path)))
            .collect())
    }
}

/// Loader that binds model names to the bridge after a readiness check
pub struct BridgeModelLoader {
    bridge_url: String,
    timeout: Duration,
}

impl BridgeModelLoader {
    pub fn new(bridge_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            bridge_url: bridge_url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn load_error(&self, model: &str, reason: impl Into<String>) -> StemforgeError {
        StemforgeError::ModelLoad {
            model: model.to_string(),
            reason: reason.into(),
        }
    }
}

impl ModelLoader for BridgeModelLoader {
    fn load(&self, model: &str) -> Result<Arc<dyn SeparationModel>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| self.load_error(model, e.to_string()))?;

        let url = format!("{}/models/{}", self.bridge_url.trim_end_matches('/'), model);
        let response = client.get(&url).send().map_err(|e| {
            self.load_error(model, format!("cannot reach bridge at {}: {}", self.bridge_url, e))
        })?;

        if !response.status().is_success() {
            return Err(self.load_error(model, format!("bridge returned {}", response.status())));
        }

        let status: ModelStatus = response
            .json()
            .map_err(|e| self.load_error(model, format!("invalid status response: {}", e)))?;
        if !status.ready {
            return Err(self.load_error(
                model,
                status.reason.unwrap_or_else(|| "model not ready".to_string()),
            ));
        }

        info!(model, bridge = %self.bridge_url, "Separation model ready");
        Ok(Arc::new(BridgeSeparator {
            model: model.to_string(),
            bridge_url: self.bridge_url.clone(),
            client,
        }))
    }
}
