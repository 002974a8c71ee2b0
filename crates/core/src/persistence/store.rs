use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::canvas::CanvasMetadata;
use crate::pipeline::ArtifactKind;

/// Error type for persistence operations.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to write {path}: {message}")]
    Filesystem { path: String, message: String },

    #[error("Database lock poisoned")]
    LockPoisoned,
}

/// Store of generation progress.
///
/// Every operation is idempotent so a restarted generation resumes where the
/// previous one left off.
pub trait Persistence: Send + Sync {
    /// Id of the instance for this repository/game server pair, created on first use.
    fn find_or_create_instance(
        &self,
        repo_url: &str,
        game_server_url: &str,
    ) -> Result<i64, PersistenceError>;

    /// Id of a commit, registering it on first sight.
    fn register_commit(
        &self,
        instance_id: i64,
        hash: &str,
        date: DateTime<Utc>,
    ) -> Result<i64, PersistenceError>;

    /// Whether an artifact of `kind` has been saved for the commit.
    fn artifact_exists(&self, commit_id: i64, kind: ArtifactKind)
        -> Result<bool, PersistenceError>;

    /// Record a saved artifact. Returns `false` if it was already recorded.
    fn record_artifact(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<bool, PersistenceError>;

    /// Record the palette and dimensions a commit's canvas uses.
    fn record_canvas_metadata(
        &self,
        commit_id: i64,
        metadata: &CanvasMetadata,
    ) -> Result<(), PersistenceError>;
}
