//! Remote worker HTTP server
//!
//! - `POST /jobs`   accepts a [`WorkerJob`] and answers 202 immediately
//! - `GET  /health` liveness check
//!
//! Jobs run on tokio's blocking pool through the same orchestrator the
//! local dispatcher uses, so the completion callback is identical.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tracing::{error, info};

use crate::error::Result;
use crate::pipeline::{Orchestrator, WorkerJob};

#[derive(Debug, Serialize)]
struct JobAccepted {
    accepted: bool,
    recording_id: String,
}

/// Router for the worker endpoints
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/jobs", post(submit_job))
        .with_state(orchestrator)
}

/// Serve until the process is stopped.
pub async fn serve(orchestrator: Arc<Orchestrator>, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Worker listening");
    axum::serve(listener, router(orchestrator)).await?;
    Ok(())
}

/// GET /health
async fn health_check() -> impl IntoResponse {
    "ok"
}

/// POST /jobs
async fn submit_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(job): Json<WorkerJob>,
) -> impl IntoResponse {
    let recording_id = job.recording_id.clone();
    info!(recording_id = %recording_id, profile = %job.profile_name, "Job received");

    tokio::task::spawn_blocking(move || {
        if let Err(e) = orchestrator.run_job(&job) {
            error!(recording_id = %job.recording_id, error = %e, "Job failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            accepted: true,
            recording_id,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FfmpegConverter, WavLoudnessAnalyzer};
    use crate::config::StemforgeConfig;
    use crate::pipeline::{Collaborators, JsonRecordingStore, LocalStorage, StoreCallbackSink};
    use crate::separation::MockModelLoader;
    use tempfile::{tempdir, TempDir};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn spawn_worker() -> (TempDir, SocketAddr) {
        let dir = tempdir().unwrap();
        let config = StemforgeConfig {
            data_dir: dir.path().to_path_buf(),
            ..StemforgeConfig::default()
        };
        let store = Arc::new(JsonRecordingStore::new(config.recordings_dir()).unwrap());
        let collaborators = Collaborators {
            store: store.clone(),
            storage: Arc::new(LocalStorage::new(config.storage_root(), "http://files.test").unwrap()),
            loader: Arc::new(MockModelLoader::with_defaults()),
            converter: Arc::new(FfmpegConverter::new()),
            analyzer: Arc::new(WavLoudnessAnalyzer::new(-14.0)),
            callback: Arc::new(StoreCallbackSink::new(store)),
        };
        let orchestrator = Arc::new(Orchestrator::new(config, collaborators).sharing_models());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(orchestrator)).await.unwrap();
        });
        (dir, addr)
    }

    async fn request(addr: SocketAddr, head: &str, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let message = format!(
            "{}\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            head,
            body.len(),
            body
        );
        stream.write_all(message.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, addr) = spawn_worker().await;
        let response = request(addr, "GET /health HTTP/1.1", "").await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.ends_with("ok"));
    }

    #[tokio::test]
    async fn test_job_is_accepted_before_it_runs() {
        let (_dir, addr) = spawn_worker().await;
        let job = WorkerJob {
            recording_id: "rec-1".to_string(),
            profile_name: "lossless".to_string(),
            strategy_name: "four_stem".to_string(),
            input_filename: "missing.wav".to_string(),
            output_name: "take".to_string(),
            callback_url: "http://backend.test/recordings/rec-1/complete/tok".to_string(),
            verification_token: "tok".to_string(),
        };
        let body = serde_json::to_string(&job).unwrap();

        let response = request(addr, "POST /jobs HTTP/1.1", &body).await;
        assert!(response.starts_with("HTTP/1.1 202"), "{}", response);
        assert!(response.contains("\"recording_id\":\"rec-1\""));
    }

    #[tokio::test]
    async fn test_malformed_job_is_rejected() {
        let (_dir, addr) = spawn_worker().await;
        let response = request(addr, "POST /jobs HTTP/1.1", "{\"recording_id\": 1}").await;
        assert!(response.starts_with("HTTP/1.1 4"), "{}", response);
    }
}
