//! Separation model interface
//!
//! A separation model is the atomic capability the strategy executor
//! drives: it reads one audio file and writes one file per output slot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;

/// Slot name -> file written by the model.
pub type SeparationResult = BTreeMap<String, PathBuf>;

/// Trait that all separation models must implement
pub trait SeparationModel: Send + Sync {
    /// Model identifier, as referenced from strategy nodes
    fn name(&self) -> &str;

    /// Separate `input` into per-slot files inside `output_dir`.
    ///
    /// Outputs must be lossless WAV; `output_dir` exists and is private to
    /// this call.
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<SeparationResult>;
}

/// Creates model handles. Loading may be expensive (weights, GPU
/// contexts), so callers go through a [`super::ModelCache`].
pub trait ModelLoader: Send + Sync {
    fn load(&self, model: &str) -> Result<Arc<dyn SeparationModel>>;
}
