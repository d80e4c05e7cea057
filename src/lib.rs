//! Stemforge - Resumable stem separation pipeline
//!
//! Turns one uploaded recording into a set of final stems and detected
//! clip boundaries, surviving crashes and retries without redoing
//! expensive work or reporting completion twice.
//!
//! # Architecture
//!
//! - `separation`: strategy-tree executor over black-box separation models
//! - `clips`: clip boundary detection from silence analysis across stems
//! - `pipeline`: checkpointed orchestrator, local or remote dispatch, and
//!   the completion callback contract

pub mod audio;
pub mod cli;
pub mod clips;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod separation;

#[cfg(feature = "worker")]
pub mod worker;

pub use error::{Result, StemforgeError};
