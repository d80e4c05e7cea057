//! Running orchestration in the background
//!
//! Locally the job runs on a background thread of this process; remotely it
//! is posted to a worker process. Either way the caller does not wait, and
//! the outcome arrives through the completion callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::orchestrator::{Orchestrator, ProcessingReport};
use crate::config::{DispatchMode, StemforgeConfig, DEFAULT_CALLBACK_TIMEOUT_SECS};
use crate::error::{Result, StemforgeError};

/// Everything a stateless worker needs to run all four stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub recording_id: String,
    pub profile_name: String,
    pub strategy_name: String,
    pub input_filename: String,
    pub output_name: String,
    pub callback_url: String,
    pub verification_token: String,
}

/// Handle to a dispatched job
pub enum Dispatched {
    /// Running on a local thread
    Local(JoinHandle<Result<ProcessingReport>>),
    /// Accepted by a remote worker
    Remote { worker_url: String },
}

impl Dispatched {
    /// Block until a local job finishes. Remote jobs return `None`.
    pub fn wait(self) -> Result<Option<ProcessingReport>> {
        match self {
            Dispatched::Local(handle) => handle
                .join()
                .map_err(|_| StemforgeError::Internal("processing thread panicked".into()))?
                .map(Some),
            Dispatched::Remote { .. } => Ok(None),
        }
    }
}

/// Starts jobs locally or on a remote worker
pub enum Dispatcher {
    Local(Arc<Orchestrator>),
    Remote(RemoteDispatcher),
}

impl Dispatcher {
    pub fn from_config(config: &StemforgeConfig, orchestrator: Arc<Orchestrator>) -> Result<Self> {
        match config.dispatch.mode {
            DispatchMode::Local => Ok(Dispatcher::Local(orchestrator)),
            DispatchMode::Remote => {
                let url = config.dispatch.worker_url.clone().ok_or_else(|| {
                    StemforgeError::config("remote dispatch requires dispatch.worker_url")
                })?;
                Ok(Dispatcher::Remote(RemoteDispatcher::new(url)?))
            }
        }
    }

    pub fn dispatch(&self, job: WorkerJob) -> Result<Dispatched> {
        match self {
            Dispatcher::Local(orchestrator) => {
                let orchestrator = Arc::clone(orchestrator);
                let recording_id = job.recording_id.clone();
                let handle = thread::Builder::new()
                    .name(format!("stemforge-{}", short_id(&recording_id)))
                    .spawn(move || {
                        let result = orchestrator.run_job(&job);
                        if let Err(e) = &result {
                            error!(recording_id = %job.recording_id, error = %e, "Background processing failed");
                        }
                        result
                    })?;
                info!(recording_id = %recording_id, "Processing dispatched locally");
                Ok(Dispatched::Local(handle))
            }
            Dispatcher::Remote(remote) => {
                remote.submit(&job)?;
                Ok(Dispatched::Remote {
                    worker_url: remote.worker_url.clone(),
                })
            }
        }
    }
}

/// Posts jobs to `{worker}/jobs`
pub struct RemoteDispatcher {
    worker_url: String,
    client: reqwest::blocking::Client,
}

impl RemoteDispatcher {
    pub fn new(worker_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_CALLBACK_TIMEOUT_SECS))
            .build()
            .map_err(|e| StemforgeError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            worker_url: worker_url.into(),
            client,
        })
    }

    pub fn jobs_url(&self) -> String {
        format!("{}/jobs", self.worker_url.trim_end_matches('/'))
    }

    pub fn submit(&self, job: &WorkerJob) -> Result<()> {
        let url = self.jobs_url();
        let response = self
            .client
            .post(&url)
            .json(job)
            .send()
            .map_err(|e| StemforgeError::Dispatch {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StemforgeError::Dispatch {
                url,
                reason: format!("worker returned {}", response.status()),
            });
        }

        info!(recording_id = %job.recording_id, worker = %self.worker_url, "Processing dispatched to worker");
        Ok(())
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
