//! Processing orchestrator
//!
//! Runs one recording through four ordered stages:
//!
//! 1. **separate**: strategy tree to lossless stems
//! 2. **detect clips**: clip boundaries from those stems
//! 3. **convert**: stems to the profile's delivery format
//! 4. **report**: completion payload to the callback
//!
//! Stages 1-3 commit a checkpoint to the store as soon as they finish. A
//! later attempt evaluates the checkpoints once and starts at the first
//! stage lacking one. Any failure marks the recording `error` and sends one
//! best-effort error callback.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::callback::{completion_url, CallbackClient, CallbackSink, CompletionPayload, StemPayload};
use super::dispatch::WorkerJob;
use super::progress::{ResumePoint, StageProgress};
use super::recording::Recording;
use super::storage::{LocalStorage, Storage};
use super::store::{JsonRecordingStore, RecordingStore};
use crate::audio::analysis::{waveform_peaks, WAVEFORM_BINS};
use crate::audio::io::wav_duration_seconds;
use crate::audio::{FfmpegConverter, FormatConverter, LoudnessAnalyzer, WavLoudnessAnalyzer};
use crate::clips::{ClipDetector, Clips};
use crate::config::{Profile, StemforgeConfig, Strategy};
use crate::error::{Result, StemforgeError};
use crate::separation::{
    BridgeModelLoader, FinalStems, MockModelLoader, ModelCache, ModelLoader, StrategyExecutor,
};

/// External collaborators the orchestrator drives
pub struct Collaborators {
    pub store: Arc<dyn RecordingStore>,
    pub storage: Arc<dyn Storage>,
    pub loader: Arc<dyn ModelLoader>,
    pub converter: Arc<dyn FormatConverter>,
    pub analyzer: Arc<dyn LoudnessAnalyzer>,
    pub callback: Arc<dyn CallbackSink>,
}

impl Collaborators {
    /// File-backed store and storage under the data directory, ffmpeg
    /// conversion and HTTP callbacks.
    pub fn local(config: &StemforgeConfig, loader: Arc<dyn ModelLoader>) -> Result<Self> {
        Ok(Self {
            store: Arc::new(JsonRecordingStore::new(config.recordings_dir())?),
            storage: Arc::new(LocalStorage::new(
                config.storage_root(),
                config.storage.base_url.clone(),
            )?),
            loader,
            converter: Arc::new(FfmpegConverter::new()),
            analyzer: Arc::new(WavLoudnessAnalyzer::new(config.loudness.target_lufs)),
            callback: Arc::new(CallbackClient::new(config.callback.timeout_secs)?),
        })
    }
}

/// Outcome of one successful attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub recording_id: String,
    pub resumed_from: ResumePoint,
    pub payload: CompletionPayload,
}

/// Sequences the pipeline stages for recordings
pub struct Orchestrator {
    config: StemforgeConfig,
    collaborators: Collaborators,
    detector: ClipDetector,
    /// Model cache kept across runs; `None` gives each run a fresh cache.
    shared_cache: Option<Mutex<ModelCache>>,
}

impl Orchestrator {
    pub fn new(config: StemforgeConfig, collaborators: Collaborators) -> Self {
        let detector = ClipDetector::new(config.clip_detection.clone());
        Self {
            config,
            collaborators,
            detector,
            shared_cache: None,
        }
    }

    /// Orchestrator using the separation bridge from the configuration.
    pub fn from_config(config: StemforgeConfig) -> Result<Self> {
        let loader = Arc::new(BridgeModelLoader::new(
            config.separation.bridge_url.clone(),
            config.separation.timeout_secs,
        ));
        let collaborators = Collaborators::local(&config, loader)?;
        Ok(Self::new(config, collaborators))
    }

    /// Orchestrator using the built-in mock models.
    pub fn with_mock_models(config: StemforgeConfig) -> Result<Self> {
        let loader = Arc::new(MockModelLoader::with_defaults());
        let collaborators = Collaborators::local(&config, loader)?;
        Ok(Self::new(config, collaborators))
    }

    /// Keep loaded models across runs, for long-lived worker processes.
    pub fn sharing_models(mut self) -> Self {
        let cache = ModelCache::new(Arc::clone(&self.collaborators.loader));
        self.shared_cache = Some(Mutex::new(cache));
        self
    }

    pub fn config(&self) -> &StemforgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordingStore> {
        &self.collaborators.store
    }

    /// Register a new recording in `processing` state.
    pub fn create_recording(
        &self,
        input_filename: &str,
        output_name: &str,
        profile_name: &str,
    ) -> Result<Recording> {
        self.config.profile(profile_name)?;
        self.collaborators.storage.resolve_input(input_filename)?;

        let recording = Recording::new(input_filename, output_name, profile_name);
        self.store().save(&recording)?;
        info!(recording_id = %recording.id, profile = profile_name, "Recording created");
        Ok(recording)
    }

    /// Callback URL for a recording under this configuration's backend.
    pub fn callback_url_for(&self, recording: &Recording) -> String {
        completion_url(
            &self.config.backend_url,
            &recording.id,
            &recording.verification_token,
        )
    }

    /// Job description for a stored recording.
    pub fn job_for(&self, recording: &Recording) -> Result<WorkerJob> {
        let profile = self.config.profile(&recording.profile_name)?;
        Ok(WorkerJob {
            recording_id: recording.id.clone(),
            profile_name: recording.profile_name.clone(),
            strategy_name: profile.strategy.clone(),
            input_filename: recording.input_filename.clone(),
            output_name: recording.output_name.clone(),
            callback_url: self.callback_url_for(recording),
            verification_token: recording.verification_token.clone(),
        })
    }

    /// Process a stored recording in the calling thread.
    pub fn process(&self, recording_id: &str) -> Result<ProcessingReport> {
        let recording = self.store().load(recording_id)?;
        match self.job_for(&recording) {
            Ok(job) => self.run_job(&job),
            Err(e) => {
                let _claim = self.store().claim(recording_id)?;
                let callback_url = self.callback_url_for(&recording);
                let mut recording = recording;
                self.fail(&mut recording, &callback_url, &e);
                Err(e)
            }
        }
    }

    /// Run all outstanding stages for a job.
    ///
    /// A recording unknown to this store is adopted from the job, which is
    /// how a remote worker without access to the backend's records runs.
    pub fn run_job(&self, job: &WorkerJob) -> Result<ProcessingReport> {
        let _claim = self.store().claim(&job.recording_id)?;

        let mut recording = self.load_or_adopt(job)?;
        recording.verify_token(&job.verification_token)?;
        recording.begin_attempt();
        self.store().save(&recording)?;

        let start = Instant::now();
        match self.run_stages(&mut recording, job) {
            Ok(report) => {
                info!(
                    recording_id = %recording.id,
                    resumed_from = %report.resumed_from,
                    stems = report.payload.stem_types().len(),
                    elapsed_secs = start.elapsed().as_secs_f64(),
                    "Recording complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.fail(&mut recording, &job.callback_url, &e);
                Err(e)
            }
        }
    }

    fn load_or_adopt(&self, job: &WorkerJob) -> Result<Recording> {
        match self.store().load(&job.recording_id) {
            Ok(recording) => Ok(recording),
            Err(StemforgeError::RecordingNotFound { .. }) => {
                debug!(recording_id = %job.recording_id, "Adopting recording from job");
                let recording = Recording::with_identity(
                    job.recording_id.clone(),
                    job.verification_token.clone(),
                    job.input_filename.clone(),
                    job.output_name.clone(),
                    job.profile_name.clone(),
                );
                self.store().save(&recording)?;
                Ok(recording)
            }
            Err(e) => Err(e),
        }
    }

    fn run_stages(&self, recording: &mut Recording, job: &WorkerJob) -> Result<ProcessingReport> {
        let profile = self.config.profile(&job.profile_name)?.clone();
        let strategy = self.config.strategy(&job.strategy_name)?;
        strategy.validate()?;
        let format = profile.output_format;

        let progress = StageProgress::evaluate(recording, format);
        let resumed_from = progress.resume_point();
        info!(
            recording_id = %recording.id,
            resume_point = %resumed_from,
            strategy = %strategy.name,
            %format,
            "Processing recording"
        );

        if progress.needs(ResumePoint::Separate) {
            let start = Instant::now();
            let stems = self.separate(recording, &strategy)?;
            recording.mark_separated(stems);
            self.store().save(recording)?;
            stage_done(&recording.id, ResumePoint::Separate, start);
        } else {
            debug!(recording_id = %recording.id, stems = recording.stems.len(), "Reusing cached stems");
        }

        let clips = if progress.needs(ResumePoint::DetectClips) {
            let start = Instant::now();
            let clips = self.detector.detect(&recording.stems)?;
            recording.mark_clips_detected(clips.clone());
            self.store().save(recording)?;
            stage_done(&recording.id, ResumePoint::DetectClips, start);
            clips
        } else {
            debug!(recording_id = %recording.id, "Reusing cached clip boundaries");
            recording.clip_boundaries.clone().unwrap_or_default()
        };

        let delivered = if progress.needs(ResumePoint::Convert) {
            let start = Instant::now();
            let converted = self.convert(&recording.stems, &profile)?;
            recording.mark_converted(format);
            self.store().save(recording)?;
            stage_done(&recording.id, ResumePoint::Convert, start);
            converted
        } else {
            recording
                .stems
                .iter()
                .map(|(name, path)| (name.clone(), format.apply_to(path)))
                .collect()
        };

        let start = Instant::now();
        let payload = CompletionPayload::complete(self.stem_payloads(recording, &delivered)?, clips);
        self.collaborators.callback.deliver(
            &job.callback_url,
            &recording.id,
            &recording.verification_token,
            &payload,
        )?;
        recording.apply_completion(&payload);
        self.store().save(recording)?;
        stage_done(&recording.id, ResumePoint::Report, start);

        Ok(ProcessingReport {
            recording_id: recording.id.clone(),
            resumed_from,
            payload,
        })
    }

    fn separate(&self, recording: &Recording, strategy: &Strategy) -> Result<FinalStems> {
        let input = self
            .collaborators
            .storage
            .resolve_input(&recording.input_filename)?;
        let stems_dir = self.stems_dir(&recording.id);
        let scratch_root = self.recording_work_dir(&recording.id).join("scratch");

        match &self.shared_cache {
            Some(cache) => {
                // A panic inside a model leaves the cache itself intact
                let mut cache = cache.lock().unwrap_or_else(|poisoned| {
                    warn!(recording_id = %recording.id, "Model cache lock was poisoned, recovering");
                    cache.clear_poison();
                    poisoned.into_inner()
                });
                StrategyExecutor::new(&mut *cache)
                    .with_scratch_root(&scratch_root)
                    .execute(strategy, &input, &stems_dir)
            }
            None => {
                let mut cache = ModelCache::new(Arc::clone(&self.collaborators.loader));
                StrategyExecutor::new(&mut cache)
                    .with_scratch_root(&scratch_root)
                    .execute(strategy, &input, &stems_dir)
            }
        }
    }

    fn convert(
        &self,
        stems: &BTreeMap<String, PathBuf>,
        profile: &Profile,
    ) -> Result<BTreeMap<String, PathBuf>> {
        stems
            .iter()
            .map(|(name, path)| {
                require_file(path)?;
                let converted = self.collaborators.converter.convert(
                    path,
                    profile.output_format,
                    profile.bitrate_kbps,
                )?;
                Ok((name.clone(), converted))
            })
            .collect()
    }

    /// Per-stem payload entries in stem name order.
    fn stem_payloads(
        &self,
        recording: &Recording,
        delivered: &BTreeMap<String, PathBuf>,
    ) -> Result<Vec<StemPayload>> {
        let metrics = self.collaborators.analyzer.analyze(&recording.stems)?;
        let waveform_dir = self.recording_work_dir(&recording.id).join("waveforms");
        fs::create_dir_all(&waveform_dir)?;

        let mut stems = Vec::with_capacity(recording.stems.len());
        for (name, lossless) in &recording.stems {
            require_file(lossless)?;
            let metric = metrics.get(name).ok_or_else(|| {
                StemforgeError::Internal(format!("no loudness metrics for stem '{}'", name))
            })?;
            let audio_path = delivered.get(name).ok_or_else(|| {
                StemforgeError::Internal(format!("no delivered file for stem '{}'", name))
            })?;
            require_file(audio_path)?;

            let ext = audio_path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("wav");
            let base = format!("{}/{}_{}", recording.id, recording.output_name, name);
            let audio = self
                .collaborators
                .storage
                .persist(audio_path, &format!("{}.{}", base, ext))?;

            let peaks = waveform_peaks(lossless, WAVEFORM_BINS)?;
            let waveform_path = waveform_dir.join(format!("{}.json", name));
            fs::write(&waveform_path, serde_json::to_vec(&peaks)?)?;
            let waveform = self
                .collaborators
                .storage
                .persist(&waveform_path, &format!("{}_waveform.json", base))?;

            stems.push(StemPayload {
                stem_type: name.clone(),
                measured_lufs: metric.measured_lufs,
                peak_amplitude: metric.peak_amplitude,
                stem_gain_adjustment_db: metric.gain_adjustment_db,
                audio_url: audio.url,
                waveform_url: waveform.url,
                file_size_bytes: audio.size_bytes,
                duration_seconds: wav_duration_seconds(lossless)?,
            });
        }
        Ok(stems)
    }

    /// Record the failure and send one error callback. Neither step may
    /// mask the original error.
    fn fail(&self, recording: &mut Recording, callback_url: &str, error: &StemforgeError) {
        error!(
            recording_id = %recording.id,
            error_code = error.error_code(),
            error = %error,
            "Processing failed"
        );
        recording.mark_error(error.to_string());
        if let Err(e) = self.store().save(recording) {
            error!(recording_id = %recording.id, error = %e, "Failed to record error state");
        }

        let payload = CompletionPayload::error(error.to_string());
        if let Err(e) = self.collaborators.callback.deliver(
            callback_url,
            &recording.id,
            &recording.verification_token,
            &payload,
        ) {
            error!(recording_id = %recording.id, error = %e, "Error callback failed");
        }
    }

    fn recording_work_dir(&self, recording_id: &str) -> PathBuf {
        self.config.work_dir().join(recording_id)
    }

    fn stems_dir(&self, recording_id: &str) -> PathBuf {
        self.recording_work_dir(recording_id).join("stems")
    }
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        warn!(path = %path.display(), "Intermediate file missing");
        Err(StemforgeError::MissingIntermediateFile {
            path: path.to_path_buf(),
        })
    }
}

fn stage_done(recording_id: &str, stage: ResumePoint, start: Instant) {
    info!(
        recording_id,
        %stage,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Stage complete"
    );
}
