//! Configuration: strategy trees, profiles and the YAML settings file

mod profile;
mod settings;
mod strategy;

pub use profile::Profile;
pub use settings::{
    builtin_profiles, builtin_strategies, CallbackConfig, DispatchConfig, DispatchMode,
    LoudnessConfig, SeparationConfig, StemforgeConfig, StorageConfig,
    DEFAULT_CALLBACK_TIMEOUT_SECS,
};
pub use strategy::{Strategy, StrategyNode, StrategyOutput};
