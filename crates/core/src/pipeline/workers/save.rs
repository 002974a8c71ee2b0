use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::StageHandler;
use crate::metrics::{ARTIFACTS_SAVED, BYTES_SAVED};
use crate::persistence::{Persistence, PersistenceError};
use crate::pipeline::mailbox::{Command, Mailbox};
use crate::pipeline::types::{CompletedArtifact, SaveJob, WorkResult};

fn write_error(path: &Path, e: std::io::Error) -> PersistenceError {
    PersistenceError::Filesystem {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

/// Save stage: writes an artifact once, records it, and reports it.
pub struct Saver {
    persistence: Arc<dyn Persistence>,
    output_dir: PathBuf,
    mailbox: Mailbox,
}

impl Saver {
    pub fn new(persistence: Arc<dyn Persistence>, output_dir: PathBuf, mailbox: Mailbox) -> Self {
        Self {
            persistence,
            output_dir,
            mailbox,
        }
    }

    pub async fn save(&self, job: SaveJob) -> WorkResult {
        let commit = &job.commit;
        if self.persistence.artifact_exists(commit.commit_id, job.kind)? {
            debug!(
                commit = %commit.commit_hash,
                kind = %job.kind,
                "Artifact already saved, skipping"
            );
            return Ok(Vec::new());
        }

        let path = job.kind.output_path(&self.output_dir, commit);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| write_error(parent, e))?;
        }
        tokio::fs::write(&path, &job.bytes)
            .await
            .map_err(|e| write_error(&path, e))?;
        self.persistence
            .record_artifact(commit.commit_id, job.kind, &path)?;

        ARTIFACTS_SAVED
            .with_label_values(&[job.kind.as_str()])
            .inc();
        BYTES_SAVED.inc_by(job.size() as u64);

        // A closed mailbox means the generator is shutting down.
        let _ = self.mailbox.post(Command::ArtifactSaved(CompletedArtifact {
            commit_id: commit.commit_id,
            commit_hash: commit.commit_hash.clone(),
            date: commit.date,
            kind: job.kind,
            path,
        }));

        Ok(Vec::new())
    }
}

#[async_trait]
impl StageHandler for Saver {
    type Job = SaveJob;

    async fn process(&mut self, job: SaveJob) -> WorkResult {
        self.save(job).await
    }
}
