//! Pipeline error types.

use thiserror::Error;
use tracing::error;

use crate::canvas::DecodeError;
use crate::persistence::PersistenceError;
use crate::render::RenderError;
use crate::transport::FetchError;

use super::ingest::IngestError;
use super::mailbox::MailboxError;
use super::types::Stage;

/// Why a stage dropped a job. Jobs are never retried within a run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("encode failed: {0}")]
    Encode(#[from] RenderError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),
}

impl StageError {
    /// Short label for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Fetch(_) => "fetch",
            StageError::Decode(_) => "decode",
            StageError::Encode(_) => "encode",
            StageError::Persistence(_) => "persistence",
        }
    }
}

/// Errors of the main loop and its control surface.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no {stage} worker to remove")]
    PoolUnderflow { stage: Stage },

    #[error("cannot queue {requested} {stage} worker changes, the generator is busy")]
    TooManyRequested { stage: Stage, requested: usize },

    #[error("generation is not running")]
    NotRunning,

    #[error("generation is already running")]
    AlreadyRunning,

    #[error("invalid generation config: {0}")]
    InvalidConfig(String),

    #[error("failed to spawn {stage} worker: {message}")]
    WorkerSpawn { stage: Stage, message: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Log an unrecoverable condition and abort the process.
pub(crate) fn fatal(reason: &str) -> ! {
    error!("Fatal pipeline error: {}", reason);
    std::process::abort()
}
