//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::audio::AudioFormat;
use crate::clips::{ClipDetectionConfig, ClipDetector};
use crate::config::StemforgeConfig;
use crate::error::Result;
use crate::pipeline::{
    Collaborators, Dispatched, Dispatcher, JsonRecordingStore, LocalStorage, Orchestrator,
    Recording, RecordingStore, StoreCallbackSink, WorkerJob,
};
use crate::separation::{
    BridgeModelLoader, MockModelLoader, ModelCache, ModelLoader, StrategyExecutor,
};

/// Options shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: StemforgeConfig,
    pub mock_models: bool,
    pub local_callback: bool,
}

impl CliContext {
    pub fn load(
        config_path: Option<&Path>,
        mock_models: bool,
        local_callback: bool,
    ) -> Result<Self> {
        Ok(Self {
            config: StemforgeConfig::load(config_path)?,
            mock_models,
            local_callback,
        })
    }

    fn model_loader(&self) -> Arc<dyn ModelLoader> {
        if self.mock_models {
            Arc::new(MockModelLoader::with_defaults())
        } else {
            Arc::new(BridgeModelLoader::new(
                self.config.separation.bridge_url.clone(),
                self.config.separation.timeout_secs,
            ))
        }
    }

    fn orchestrator(&self) -> Result<Orchestrator> {
        let mut collaborators = Collaborators::local(&self.config, self.model_loader())?;
        if self.local_callback {
            let store = Arc::clone(&collaborators.store);
            collaborators.callback = Arc::new(StoreCallbackSink::new(store));
        }
        Ok(Orchestrator::new(self.config.clone(), collaborators))
    }

    fn storage(&self) -> Result<LocalStorage> {
        LocalStorage::new(self.config.storage_root(), self.config.storage.base_url.clone())
    }
}

/// Run a strategy on one file.
pub fn separate(
    ctx: &CliContext,
    input: &Path,
    strategy: &str,
    output: Option<&Path>,
) -> Result<()> {
    info!("Separating {} with strategy '{}'", input.display(), strategy);

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_dir(input));

    let strategy = ctx.config.strategy(strategy)?;
    let mut cache = ModelCache::new(ctx.model_loader());
    let stems = StrategyExecutor::new(&mut cache).execute(&strategy, input, &output)?;

    println!("Stems written to {}:", output.display());
    for (name, path) in &stems {
        println!("  {:<12} {}", name, path.display());
    }
    Ok(())
}

/// Detect clips from `<stem>.wav` files in a directory.
pub fn detect_clips(ctx: &CliContext, stems_dir: &Path, threshold_db: Option<f32>) -> Result<()> {
    info!("Detecting clips from stems in {}", stems_dir.display());

    let mut stems = BTreeMap::new();
    for entry in fs::read_dir(stems_dir)? {
        let path = entry?.path();
        if AudioFormat::of_path(&path) != Some(AudioFormat::Wav) {
            continue;
        }
        if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
            stems.insert(name.to_string(), path.clone());
        }
    }
    if stems.is_empty() {
        warn!("No WAV stems found in {}", stems_dir.display());
        return Ok(());
    }

    let config = match threshold_db {
        Some(db) => ClipDetectionConfig {
            dilation_sec: ctx.config.clip_detection.dilation_sec,
            min_clip_duration_sec: ctx.config.clip_detection.min_clip_duration_sec,
            ..ClipDetectionConfig::fixed(db)
        },
        None => ctx.config.clip_detection.clone(),
    };
    let clips = ClipDetector::new(config).detect(&stems)?;

    if clips.is_empty() {
        println!("No clips detected.");
        return Ok(());
    }
    println!("{:>4}  {:>10}  {:>10}  {:>9}", "id", "start", "end", "duration");
    for (id, clip) in &clips {
        println!(
            "{:>4}  {:>10.2}  {:>10.2}  {:>9.2}",
            id,
            clip.start_time_sec,
            clip.end_time_sec,
            clip.duration()
        );
    }
    Ok(())
}

/// Upload a file and register a recording.
pub fn create_recording(
    ctx: &CliContext,
    input: &Path,
    profile: &str,
    name: Option<&str>,
) -> Result<()> {
    info!("Creating recording for {}", input.display());

    let output_name = match name {
        Some(name) => name.to_string(),
        None => input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("recording")
            .to_string(),
    };

    let reference = ctx.storage()?.store_upload(input)?;
    let recording = ctx
        .orchestrator()?
        .create_recording(&reference, &output_name, profile)?;

    println!("Recording created: {}", recording.id);
    println!("Verification token: {}", recording.verification_token);
    println!("Profile: {}", recording.profile_name);
    Ok(())
}

/// Process a recording through the configured dispatcher.
pub fn process(ctx: &CliContext, recording_id: &str) -> Result<()> {
    info!("Processing recording {}", recording_id);

    let orchestrator = Arc::new(ctx.orchestrator()?);
    let recording = orchestrator.store().load(recording_id)?;
    let job = orchestrator.job_for(&recording)?;
    let dispatcher = Dispatcher::from_config(&ctx.config, Arc::clone(&orchestrator))?;

    match dispatcher.dispatch(job)? {
        Dispatched::Remote { worker_url } => {
            println!("Dispatched to worker at {}", worker_url);
        }
        local => {
            if let Some(report) = local.wait()? {
                println!(
                    "Recording {} complete (resumed from {})",
                    report.recording_id, report.resumed_from
                );
                for stem in report.payload.stems.iter().flatten() {
                    println!(
                        "  {:<12} {:>7.1} LUFS  {}",
                        stem.stem_type, stem.measured_lufs, stem.audio_url
                    );
                }
                let clips = report.payload.clip_boundaries.unwrap_or_default();
                println!("  {} clip(s) detected", clips.len());
            }
        }
    }
    Ok(())
}

/// Show one recording or all of them.
pub fn status(ctx: &CliContext, recording_id: Option<&str>) -> Result<()> {
    let store = JsonRecordingStore::new(ctx.config.recordings_dir())?;

    match recording_id {
        Some(id) => print_recording(&store.load(id)?),
        None => {
            let recordings = store.list()?;
            if recordings.is_empty() {
                println!("No recordings.");
            }
            for recording in &recordings {
                println!(
                    "{}  {:<10}  {:<10}  {}",
                    recording.id, recording.status, recording.profile_name, recording.output_name
                );
            }
        }
    }
    Ok(())
}

fn print_recording(recording: &Recording) {
    let checkpoint = |t: &Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
    };

    println!("Recording: {}", recording.id);
    println!("Status: {}", recording.status);
    println!("Profile: {}", recording.profile_name);
    println!("Input: {}", recording.input_filename);
    println!("Separated: {}", checkpoint(&recording.separated_at));
    println!("Clips detected: {}", checkpoint(&recording.clips_detected_at));
    println!("Converted: {}", checkpoint(&recording.converted_at));
    if let Some(clips) = &recording.clip_boundaries {
        println!("Clips: {}", clips.len());
    }
    for stem in &recording.delivered_stems {
        println!("  {:<12} {}", stem.stem_type, stem.audio_url);
    }
    if let Some(message) = &recording.error_message {
        println!("Error: {}", message);
    }
}

/// Run a job description in the foreground.
pub fn run_job(ctx: &CliContext, job_path: &Path) -> Result<()> {
    info!("Running job from {}", job_path.display());

    let job: WorkerJob = serde_json::from_str(&fs::read_to_string(job_path)?)?;
    let report = ctx.orchestrator()?.run_job(&job)?;
    println!("{}", serde_json::to_string_pretty(&report.payload)?);
    Ok(())
}

/// Serve worker jobs over HTTP.
#[cfg(feature = "worker")]
pub fn worker(ctx: &CliContext, listen: SocketAddr) -> Result<()> {
    info!("Starting worker on {}", listen);

    let orchestrator = Arc::new(ctx.orchestrator()?.sharing_models());
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::worker::serve(orchestrator, listen))
}

#[cfg(not(feature = "worker"))]
pub fn worker(_ctx: &CliContext, _listen: SocketAddr) -> Result<()> {
    Err(crate::error::StemforgeError::config(
        "this build has no worker support; rebuild with --features worker",
    ))
}

/// Print the effective configuration as YAML.
pub fn print_config(ctx: &CliContext) -> Result<()> {
    print!("{}", ctx.config.to_yaml()?);
    Ok(())
}

/// `<input stem>_stems` next to the input.
pub fn default_output_dir(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stems");
    input.with_file_name(format!("{}_stems", stem))
}
