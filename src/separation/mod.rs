//! Source separation
//!
//! This module provides:
//! - `SeparationModel` trait for the atomic separation capability
//! - `ModelCache`, the explicit per-run (or per-worker) model handle cache
//! - `StrategyExecutor`, which drives models along a strategy tree
//! - An HTTP bridge to an external separation service
//! - Mock models for offline runs and testing

mod bridge;
mod cache;
mod executor;
mod mock;
mod model;

pub use bridge::{BridgeModelLoader, BridgeSeparator, DEFAULT_BRIDGE_URL, DEFAULT_SEPARATION_TIMEOUT_SECS};
pub use cache::ModelCache;
pub use executor::{FinalStems, StrategyExecutor};
pub use mock::*;
pub use model::{ModelLoader, SeparationModel, SeparationResult};
