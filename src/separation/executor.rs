//! Strategy tree executor
//!
//! Walks a strategy depth-first, running one separation step per node and
//! feeding each nested node the file of the slot it hangs off. Steps run
//! sequentially: a child needs its parent's output, and the separation
//! runtime is the scarce resource.
//!
//! Every step writes into a private scratch directory (`step_NN_<model>`)
//! that is removed when execution ends, successfully or not. Final stems
//! are moved into the output directory only after the whole tree has
//! succeeded, so a failed attempt leaves no partial stem set behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::cache::ModelCache;
use crate::audio::AudioFormat;
use crate::config::{Strategy, StrategyNode, StrategyOutput};
use crate::error::{Result, StemforgeError};

const SCRATCH_PREFIX: &str = "stemforge-separation-";

/// Final stem name -> lossless file in the output directory
pub type FinalStems = BTreeMap<String, PathBuf>;

/// Drives separation models according to a strategy tree
pub struct StrategyExecutor<'a> {
    cache: &'a mut ModelCache,
    /// Parent of the per-execution scratch directory; system temp if unset
    scratch_root: Option<PathBuf>,
}

impl<'a> StrategyExecutor<'a> {
    pub fn new(cache: &'a mut ModelCache) -> Self {
        Self {
            cache,
            scratch_root: None,
        }
    }

    /// Place scratch directories under `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: &Path) -> Self {
        self.scratch_root = Some(root.to_path_buf());
        self
    }

    /// Run `strategy` on `input`, leaving one `<final_name>.wav` per leaf in
    /// `output_dir`.
    pub fn execute(
        &mut self,
        strategy: &Strategy,
        input: &Path,
        output_dir: &Path,
    ) -> Result<FinalStems> {
        strategy.validate()?;

        if !input.is_file() {
            return Err(StemforgeError::SourceNotFound {
                path: input.to_path_buf(),
            });
        }

        let start = Instant::now();
        info!(
            strategy = %strategy.name,
            steps = strategy.root.step_count(),
            input = %input.display(),
            "Executing separation strategy"
        );

        // Dropped on every exit path, taking all intermediates with it
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let scratch = match &self.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };

        let mut step = 0usize;
        let mut staged = FinalStems::new();
        self.run_node(&strategy.root, input, scratch.path(), &mut step, &mut staged)?;

        let finals = publish(&staged, output_dir)?;

        info!(
            strategy = %strategy.name,
            stems = finals.len(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Separation strategy complete"
        );
        Ok(finals)
    }

    fn run_node(
        &mut self,
        node: &StrategyNode,
        input: &Path,
        scratch: &Path,
        step: &mut usize,
        staged: &mut FinalStems,
    ) -> Result<()> {
        *step += 1;
        let step_dir = scratch.join(format!("step_{:02}_{}", step, sanitize(&node.model)));
        fs::create_dir_all(&step_dir)?;

        let model = self.cache.get(&node.model)?;
        debug!(step = *step, model = %node.model, input = %input.display(), "Running separation step");

        let produced = model
            .separate(input, &step_dir)
            .map_err(|e| as_execution_error(&node.model, e))?;
        check_slots(node, &produced)?;

        for (slot, output) in &node.outputs {
            let path = &produced[slot];
            if !path.is_file() {
                return Err(StemforgeError::ModelExecution {
                    model: node.model.clone(),
                    reason: format!("slot '{}' file {} was not written", slot, path.display()),
                });
            }
            if AudioFormat::of_path(path) != Some(AudioFormat::INTERMEDIATE) {
                return Err(StemforgeError::ModelExecution {
                    model: node.model.clone(),
                    reason: format!(
                        "slot '{}' produced {} instead of lossless {}",
                        slot,
                        path.display(),
                        AudioFormat::INTERMEDIATE
                    ),
                });
            }

            match output {
                StrategyOutput::Leaf(name) => {
                    staged.insert(name.clone(), path.clone());
                }
                StrategyOutput::Node(child) => {
                    self.run_node(child, path, scratch, step, staged)?;
                }
            }
        }

        Ok(())
    }
}

/// The produced slot set must equal the declared one exactly.
fn check_slots(node: &StrategyNode, produced: &BTreeMap<String, PathBuf>) -> Result<()> {
    let declared = node.declared_slots();
    let actual: Vec<&str> = produced.keys().map(String::as_str).collect();

    if declared.iter().copied().eq(actual.iter().copied()) {
        return Ok(());
    }

    Err(StemforgeError::SlotMismatch {
        model: node.model.clone(),
        expected: declared.iter().map(|s| s.to_string()).collect(),
        actual: actual.iter().map(|s| s.to_string()).collect(),
    })
}

fn as_execution_error(model: &str, err: StemforgeError) -> StemforgeError {
    match err {
        StemforgeError::ModelExecution { .. } => err,
        other => StemforgeError::ModelExecution {
            model: model.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Move staged stems into `output_dir` as `<name>.wav`. On failure, stems
/// already moved are removed again.
fn publish(staged: &FinalStems, output_dir: &Path) -> Result<FinalStems> {
    fs::create_dir_all(output_dir)?;

    let mut published = FinalStems::new();
    for (name, source) in staged {
        let dest = output_dir.join(format!("{}.{}", name, AudioFormat::INTERMEDIATE.extension()));
        if let Err(e) = move_file(source, &dest) {
            for path in published.values() {
                if let Err(cleanup) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %cleanup, "Failed to remove partial stem");
                }
            }
            return Err(e.into());
        }
        published.insert(name.clone(), dest);
    }
    Ok(published)
}

fn move_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        // Scratch may live on another filesystem
        Err(_) => fs::copy(source, dest).map(|_| ()),
    }
}

fn sanitize(model: &str) -> String {
    model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::io::{write_wav, WavData};
    use crate::separation::mock::{MockModelLoader, MockSeparator};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_mix(path: &Path) {
        write_wav(
            path,
            &WavData {
                samples: vec![0.5; 4000],
                channels: 1,
                sample_rate: 8000,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_single_step_strategy() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("mix.wav");
        write_mix(&input);

        let strategy = Strategy::new(
            "four",
            StrategyNode::new("htdemucs")
                .leaf("vocals", "vocals")
                .leaf("drums", "drums")
                .leaf("bass", "bass")
                .leaf("other", "other"),
        );

        let mut cache = ModelCache::new(Arc::new(MockModelLoader::with_defaults()));
        let out = dir.path().join("stems");
        let stems = StrategyExecutor::new(&mut cache)
            .execute(&strategy, &input, &out)
            .unwrap();

        assert_eq!(stems.len(), 4);
        assert_eq!(stems["vocals"], out.join("vocals.wav"));
        assert!(stems.values().all(|p| p.is_file()));
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let dir = tempdir().unwrap();
        let strategy = Strategy::new("s", StrategyNode::new("htdemucs").leaf("vocals", "v"));
        let mut cache = ModelCache::new(Arc::new(MockModelLoader::with_defaults()));

        let err = StrategyExecutor::new(&mut cache)
            .execute(&strategy, &dir.path().join("nope.wav"), dir.path())
            .unwrap_err();
        assert!(matches!(err, StemforgeError::SourceNotFound { .. }));
        assert_eq!(cache.load_count(), 0);
    }

    #[test]
    fn test_failure_leaves_output_untouched() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("mix.wav");
        write_mix(&input);

        let loader = MockModelLoader::new()
            .with_model(MockSeparator::new("a", &["x", "y"]))
            .with_model(MockSeparator::failing("b", "boom"));
        let strategy = Strategy::new(
            "s",
            StrategyNode::new("a")
                .leaf("x", "x")
                .child("y", StrategyNode::new("b").leaf("p", "p")),
        );

        let mut cache = ModelCache::new(Arc::new(loader));
        let out = dir.path().join("stems");
        let scratch = dir.path().join("scratch");
        let err = StrategyExecutor::new(&mut cache)
            .with_scratch_root(&scratch)
            .execute(&strategy, &input, &out)
            .unwrap_err();

        assert!(matches!(err, StemforgeError::ModelExecution { .. }));
        assert!(!out.exists());
        assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn test_sanitize_model_name() {
        assert_eq!(sanitize("org/model v2"), "org_model_v2");
    }
}
