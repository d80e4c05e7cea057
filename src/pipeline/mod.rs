//! Idempotent processing pipeline
//!
//! separate → detect clips → convert → report, with a durable checkpoint
//! after each stage, an exclusive claim per recording, and the same
//! completion callback whether the work runs here or on a remote worker.

mod callback;
mod dispatch;
mod orchestrator;
mod progress;
mod recording;
mod storage;
mod store;

pub use callback::{
    completion_url, receive_completion, CallbackClient, CallbackSink, CompletionPayload,
    CompletionStatus, StemPayload, StoreCallbackSink,
};
pub use dispatch::{Dispatched, Dispatcher, RemoteDispatcher, WorkerJob};
pub use orchestrator::{Collaborators, Orchestrator, ProcessingReport};
pub use progress::{ResumePoint, StageProgress};
pub use recording::{Recording, RecordingStatus};
pub use storage::{LocalStorage, Storage, StoredObject};
pub use store::{ClaimGuard, JsonRecordingStore, RecordingStore, DEFAULT_STALE_CLAIM_HOURS};
