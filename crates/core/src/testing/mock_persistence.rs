//! Mock persistence for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::canvas::CanvasMetadata;
use crate::persistence::{Persistence, PersistenceError};
use crate::pipeline::ArtifactKind;

/// A `record_artifact` call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedArtifact {
    pub commit_id: i64,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct State {
    instances: HashMap<(String, String), i64>,
    commits: HashMap<(i64, String), i64>,
    saved: HashMap<(i64, ArtifactKind), PathBuf>,
    recorded: Vec<RecordedArtifact>,
    metadata: Vec<(i64, CanvasMetadata)>,
    next_error: Option<String>,
}

/// In-memory implementation of the Persistence trait.
///
/// Provides controllable behavior for testing:
/// - Pre-mark artifacts as saved
/// - Track recorded artifacts and metadata
/// - Fail the next operation
///
/// # Example
///
/// ```rust,ignore
/// use timelapse_core::testing::MockPersistence;
///
/// let persistence = MockPersistence::new();
/// persistence.mark_saved(1, ArtifactKind::CanvasDownload);
///
/// // ... run the pipeline ...
///
/// assert_eq!(persistence.recorded_artifacts().len(), 5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPersistence {
    state: Arc<RwLock<State>>,
}

impl MockPersistence {
    /// Create an empty mock store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_error(state: &mut State) -> Result<(), PersistenceError> {
        match state.next_error.take() {
            Some(message) => Err(PersistenceError::Database(message)),
            None => Ok(()),
        }
    }

    /// Mark an artifact as already saved, without recording a call.
    pub fn mark_saved(&self, commit_id: i64, kind: ArtifactKind) {
        self.write()
            .saved
            .insert((commit_id, kind), PathBuf::from("preexisting"));
    }

    /// Make the next operation fail with a database error.
    pub fn fail_next(&self, message: &str) {
        self.write().next_error = Some(message.to_string());
    }

    /// All successful `record_artifact` calls, in call order.
    pub fn recorded_artifacts(&self) -> Vec<RecordedArtifact> {
        self.read().recorded.clone()
    }

    /// Number of artifacts recorded through `record_artifact`.
    pub fn record_count(&self) -> usize {
        self.read().recorded.len()
    }

    /// Kinds recorded for a commit.
    pub fn recorded_kinds(&self, commit_id: i64) -> Vec<ArtifactKind> {
        self.read()
            .recorded
            .iter()
            .filter(|r| r.commit_id == commit_id)
            .map(|r| r.kind)
            .collect()
    }

    /// Canvas metadata recorded, in call order.
    pub fn metadata_records(&self) -> Vec<(i64, CanvasMetadata)> {
        self.read().metadata.clone()
    }

    /// Id assigned to a commit hash, if registered.
    pub fn commit_id(&self, hash: &str) -> Option<i64> {
        self.read()
            .commits
            .iter()
            .find(|((_, h), _)| h == hash)
            .map(|(_, id)| *id)
    }

    /// Number of registered commits.
    pub fn commit_count(&self) -> usize {
        self.read().commits.len()
    }
}

impl Persistence for MockPersistence {
    fn find_or_create_instance(
        &self,
        repo_url: &str,
        game_server_url: &str,
    ) -> Result<i64, PersistenceError> {
        let mut state = self.write();
        Self::take_error(&mut state)?;
        let next_id = state.instances.len() as i64 + 1;
        Ok(*state
            .instances
            .entry((repo_url.to_string(), game_server_url.to_string()))
            .or_insert(next_id))
    }

    fn register_commit(
        &self,
        instance_id: i64,
        hash: &str,
        _date: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let mut state = self.write();
        Self::take_error(&mut state)?;
        let next_id = state.commits.len() as i64 + 1;
        Ok(*state
            .commits
            .entry((instance_id, hash.to_string()))
            .or_insert(next_id))
    }

    fn artifact_exists(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
    ) -> Result<bool, PersistenceError> {
        let mut state = self.write();
        Self::take_error(&mut state)?;
        Ok(state.saved.contains_key(&(commit_id, kind)))
    }

    fn record_artifact(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<bool, PersistenceError> {
        let mut state = self.write();
        Self::take_error(&mut state)?;
        if state.saved.contains_key(&(commit_id, kind)) {
            return Ok(false);
        }
        state.saved.insert((commit_id, kind), path.to_path_buf());
        state.recorded.push(RecordedArtifact {
            commit_id,
            kind,
            path: path.to_path_buf(),
        });
        Ok(true)
    }

    fn record_canvas_metadata(
        &self,
        commit_id: i64,
        metadata: &CanvasMetadata,
    ) -> Result<(), PersistenceError> {
        let mut state = self.write();
        Self::take_error(&mut state)?;
        state.metadata.push((commit_id, metadata.clone()));
        Ok(())
    }
}
