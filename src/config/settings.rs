//! Stemforge configuration file
//!
//! Stored as YAML. Every section has defaults, so an empty file (or no
//! file) gives a working local setup with the built-in strategies.
//!
//! ```yaml
//! backend_url: https://api.example.com
//! data_dir: /var/lib/stemforge
//! dispatch:
//!   mode: remote
//!   worker_url: http://gpu-worker:8090
//! profiles:
//!   band:
//!     strategy: four_stem
//!     output_format: mp3
//!     bitrate_kbps: 320
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::profile::Profile;
use super::strategy::{Strategy, StrategyNode};
use crate::audio::analysis::DEFAULT_TARGET_LUFS;
use crate::audio::AudioFormat;
use crate::clips::ClipDetectionConfig;
use crate::error::{Result, StemforgeError};
use crate::separation::{DEFAULT_BRIDGE_URL, DEFAULT_SEPARATION_TIMEOUT_SECS};

/// Callback delivery timeout, independent of model execution time
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 30;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StemforgeConfig {
    /// Base URL completion callbacks are posted to
    pub backend_url: String,

    /// Working directory for recordings, stems and checkpoints
    pub data_dir: PathBuf,

    pub storage: StorageConfig,
    pub separation: SeparationConfig,
    pub callback: CallbackConfig,
    pub dispatch: DispatchConfig,
    pub clip_detection: ClipDetectionConfig,
    pub loudness: LoudnessConfig,

    /// Strategy trees by name
    pub strategies: BTreeMap<String, StrategyNode>,

    /// Profiles by name
    pub profiles: BTreeMap<String, Profile>,
}

/// Where delivered files are persisted and how they are addressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory; `None` means `<data_dir>/storage`
    pub root: Option<PathBuf>,
    /// Public URL prefix for persisted files
    pub base_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub bridge_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    pub timeout_secs: u64,
}

/// Where orchestration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Background thread in this process
    #[default]
    Local,
    /// A separate worker process reachable over HTTP
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    pub worker_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoudnessConfig {
    pub target_lufs: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            base_url: "http://localhost:8000/files".to_string(),
        }
    }
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            bridge_url: DEFAULT_BRIDGE_URL.to_string(),
            timeout_secs: DEFAULT_SEPARATION_TIMEOUT_SECS,
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_CALLBACK_TIMEOUT_SECS,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Local,
            worker_url: None,
        }
    }
}

impl Default for LoudnessConfig {
    fn default() -> Self {
        Self {
            target_lufs: DEFAULT_TARGET_LUFS,
        }
    }
}

impl Default for StemforgeConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            data_dir: PathBuf::from("stemforge-data"),
            storage: StorageConfig::default(),
            separation: SeparationConfig::default(),
            callback: CallbackConfig::default(),
            dispatch: DispatchConfig::default(),
            clip_detection: ClipDetectionConfig::default(),
            loudness: LoudnessConfig::default(),
            strategies: builtin_strategies(),
            profiles: builtin_profiles(),
        }
    }
}

/// Strategies available without any configuration file
pub fn builtin_strategies() -> BTreeMap<String, StrategyNode> {
    BTreeMap::from([
        (
            "four_stem".to_string(),
            StrategyNode::new("htdemucs")
                .leaf("vocals", "vocals")
                .leaf("drums", "drums")
                .leaf("bass", "bass")
                .leaf("other", "other"),
        ),
        (
            "vocals_first".to_string(),
            StrategyNode::new("vocal_split").leaf("vocals", "vocals").child(
                "instrumental",
                StrategyNode::new("htdemucs")
                    .leaf("drums", "drums")
                    .leaf("bass", "bass")
                    .leaf("other", "other")
                    .leaf("vocals", "vocal_bleed"),
            ),
        ),
    ])
}

/// Profiles available without any configuration file
pub fn builtin_profiles() -> BTreeMap<String, Profile> {
    BTreeMap::from([
        (
            "default".to_string(),
            Profile::new("four_stem", AudioFormat::Mp3).with_bitrate(320),
        ),
        (
            "lossless".to_string(),
            Profile::new("four_stem", AudioFormat::Wav),
        ),
        (
            "studio".to_string(),
            Profile::new("vocals_first", AudioFormat::Flac),
        ),
    ])
}

impl StemforgeConfig {
    /// Load from `path` (or defaults when `None`), apply environment
    /// overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration");
                let content = fs::read_to_string(path)?;
                Self::from_yaml(&content)?
            }
            None => {
                debug!("No configuration file, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without environment overrides or validation.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// `STEMFORGE_*` environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var("STEMFORGE_BACKEND_URL") {
            self.backend_url = url;
        }
        if let Ok(url) = env::var("STEMFORGE_SEPARATION_URL") {
            self.separation.bridge_url = url;
        }
        if let Ok(dir) = env::var("STEMFORGE_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("STEMFORGE_WORKER_URL") {
            self.dispatch.worker_url = Some(url);
            self.dispatch.mode = DispatchMode::Remote;
        }
    }

    /// Cross-reference checks; fatal before any audio is touched.
    pub fn validate(&self) -> Result<()> {
        for (name, root) in &self.strategies {
            Strategy::new(name.clone(), root.clone()).validate()?;
        }
        for (name, profile) in &self.profiles {
            if !self.strategies.contains_key(&profile.strategy) {
                return Err(StemforgeError::config(format!(
                    "profile '{}' references unknown strategy '{}'",
                    name, profile.strategy
                )));
            }
        }
        if self.dispatch.mode == DispatchMode::Remote && self.dispatch.worker_url.is_none() {
            return Err(StemforgeError::config(
                "remote dispatch requires dispatch.worker_url",
            ));
        }
        Ok(())
    }

    pub fn strategy(&self, name: &str) -> Result<Strategy> {
        self.strategies
            .get(name)
            .map(|root| Strategy::new(name, root.clone()))
            .ok_or_else(|| StemforgeError::UnknownStrategy {
                name: name.to_string(),
            })
    }

    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| StemforgeError::UnknownProfile {
                name: name.to_string(),
            })
    }

    /// Directory holding recording checkpoint files
    pub fn recordings_dir(&self) -> PathBuf {
        self.data_dir.join("recordings")
    }

    /// Directory holding per-recording working files
    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }

    /// Directory for delivered files
    pub fn storage_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| self.data_dir.join("storage"))
    }
}
