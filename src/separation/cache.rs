//! Model instance cache
//!
//! Handles are loaded lazily on first use and kept for the lifetime of the
//! cache. A cache lives for one orchestrator run, or for a whole worker
//! process when the worker opts into sharing it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::model::{ModelLoader, SeparationModel};
use crate::error::Result;

/// Cache of loaded separation models keyed by model name
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    models: HashMap<String, Arc<dyn SeparationModel>>,
    loads: usize,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            models: HashMap::new(),
            loads: 0,
        }
    }

    /// Get a loaded model, loading it on first request.
    pub fn get(&mut self, model: &str) -> Result<Arc<dyn SeparationModel>> {
        if let Some(handle) = self.models.get(model) {
            debug!(model, "Model cache hit");
            return Ok(Arc::clone(handle));
        }

        info!(model, "Loading separation model");
        let handle = self.loader.load(model)?;
        self.loads += 1;
        self.models.insert(model.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Number of loader invocations so far
    pub fn load_count(&self) -> usize {
        self.loads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::separation::mock::MockModelLoader;

    #[test]
    fn test_loads_once_per_model() {
        let mut cache = ModelCache::new(Arc::new(MockModelLoader::with_defaults()));

        cache.get("htdemucs").unwrap();
        cache.get("htdemucs").unwrap();
        cache.get("vocal_split").unwrap();

        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_unknown_model_is_not_cached() {
        let mut cache = ModelCache::new(Arc::new(MockModelLoader::with_defaults()));

        assert!(cache.get("nonexistent").is_err());
        assert!(cache.get("nonexistent").is_err());
        assert_eq!(cache.load_count(), 0);
    }
}
