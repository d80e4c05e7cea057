//! Mock separation models
//!
//! These don't do real source separation. Each slot receives a copy of
//! the input scaled by `1 / slot_count`, so the slots sum back to the mix
//! and keep its timing. Used for offline runs (`--mock-models`) and tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::model::{ModelLoader, SeparationModel, SeparationResult};
use crate::audio::io::{read_wav, write_wav, WavData};
use crate::error::{Result, StemforgeError};

/// Standard demucs four-stem slots
pub const FOUR_STEM_SLOTS: &[&str] = &["vocals", "drums", "bass", "other"];

/// Demucs six-stem slots
pub const SIX_STEM_SLOTS: &[&str] = &["vocals", "drums", "bass", "guitar", "piano", "other"];

/// Two-stem vocal split slots
pub const VOCAL_SPLIT_SLOTS: &[&str] = &["vocals", "instrumental"];

/// Mock model that splits a WAV file into gain-scaled slot copies
pub struct MockSeparator {
    name: String,
    slots: Vec<String>,
    failure: Option<String>,
    invocations: AtomicUsize,
}

impl MockSeparator {
    pub fn new(name: &str, slots: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            slots: slots.iter().map(|s| s.to_string()).collect(),
            failure: None,
            invocations: AtomicUsize::new(0),
        }
    }

    /// A model whose every invocation fails with `reason`.
    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::new(name, &[])
        }
    }

    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// How many times `separate` has been called
    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl SeparationModel for MockSeparator {
    fn name(&self) -> &str {
        &self.name
    }

    fn separate(&self, input: &Path, output_dir: &Path) -> Result<SeparationResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        if let Some(reason) = &self.failure {
            return Err(StemforgeError::ModelExecution {
                model: self.name.clone(),
                reason: reason.clone(),
            });
        }

        let mix = read_wav(input)?;
        let gain = 1.0 / self.slots.len().max(1) as f32;
        let mut outputs = BTreeMap::new();

        for slot in &self.slots {
            let path = output_dir.join(format!("{}.wav", slot));
            let stem = WavData {
                samples: mix.samples.iter().map(|s| s * gain).collect(),
                channels: mix.channels,
                sample_rate: mix.sample_rate,
            };
            write_wav(&path, &stem)?;
            outputs.insert(slot.clone(), path);
        }

        debug!(model = %self.name, slots = outputs.len(), "Mock separation complete");
        Ok(outputs)
    }
}

/// Loader handing out shared mock models, so invocation counts survive
/// across caches.
pub struct MockModelLoader {
    models: HashMap<String, Arc<MockSeparator>>,
    loads: AtomicUsize,
}

impl MockModelLoader {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            loads: AtomicUsize::new(0),
        }
    }

    /// Loader with the standard demucs-style models
    pub fn with_defaults() -> Self {
        Self::new()
            .with_model(MockSeparator::new("htdemucs", FOUR_STEM_SLOTS))
            .with_model(MockSeparator::new("htdemucs_6s", SIX_STEM_SLOTS))
            .with_model(MockSeparator::new("vocal_split", VOCAL_SPLIT_SLOTS))
    }

    pub fn with_model(mut self, model: MockSeparator) -> Self {
        self.models.insert(model.name.clone(), Arc::new(model));
        self
    }

    /// Shared handle to a registered mock
    pub fn model(&self, name: &str) -> Option<Arc<MockSeparator>> {
        self.models.get(name).cloned()
    }

    /// Total `separate` calls across every registered mock
    pub fn total_invocations(&self) -> usize {
        self.models.values().map(|m| m.invocation_count()).sum()
    }

    /// Number of successful `load` calls
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl Default for MockModelLoader {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ModelLoader for MockModelLoader {
    fn load(&self, model: &str) -> Result<Arc<dyn SeparationModel>> {
        let handle = self
            .models
            .get(model)
            .ok_or_else(|| StemforgeError::ModelLoad {
                model: model.to_string(),
                reason: "no such mock model".to_string(),
            })?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(handle) as Arc<dyn SeparationModel>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_mock_writes_every_slot() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("mix.wav");
        write_wav(
            &input,
            &WavData {
                samples: vec![0.8; 800],
                channels: 1,
                sample_rate: 8000,
            },
        )
        .unwrap();

        let model = MockSeparator::new("htdemucs", FOUR_STEM_SLOTS);
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let result = model.separate(&input, &out_dir).unwrap();

        assert_eq!(result.len(), 4);
        assert!(result.values().all(|p| p.exists()));
        let vocals = read_wav(&result["vocals"]).unwrap();
        assert!((vocals.samples[0] - 0.2).abs() < 1e-6);
        assert_eq!(model.invocation_count(), 1);
    }

    #[test]
    fn test_failing_mock() {
        let model = MockSeparator::failing("broken", "weights corrupted");
        let err = model
            .separate(Path::new("in.wav"), Path::new("out"))
            .unwrap_err();
        assert!(matches!(err, StemforgeError::ModelExecution { .. }));
    }

    #[test]
    fn test_loader_defaults() {
        let loader = MockModelLoader::with_defaults();
        assert!(loader.load("htdemucs").is_ok());
        assert!(loader.load("vocal_split").is_ok());
        assert!(loader.load("unknown").is_err());
        assert_eq!(loader.load_count(), 2);
    }
}
