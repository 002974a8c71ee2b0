//! Decides which jobs a commit still needs from what is already saved.

use std::sync::Arc;

use crate::persistence::{Persistence, PersistenceError};

use super::stack::PipelineStacks;
use super::types::{
    ArtifactKind, CommitRecord, DownloadJob, DownloadKind, RenderJob, RenderPayload,
};

/// Artifacts produced from a canvas download.
const CANVAS_ARTIFACTS: [ArtifactKind; 2] =
    [ArtifactKind::CanvasDownload, ArtifactKind::CanvasRender];

/// Artifacts produced from a placers download.
const PLACERS_ARTIFACTS: [ArtifactKind; 3] = [
    ArtifactKind::PlacersDownload,
    ArtifactKind::TopPlacersRender,
    ArtifactKind::CanvasControlRender,
];

/// Jobs designated for one commit.
#[derive(Debug, Default)]
pub struct Designation {
    pub downloads: Vec<DownloadJob>,
    pub renders: Vec<RenderJob>,
}

impl Designation {
    pub fn len(&self) -> usize {
        self.downloads.len() + self.renders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push every designated job onto its stack.
    pub fn enqueue(self, stacks: &PipelineStacks) {
        for job in self.downloads {
            stacks.download.push(job);
        }
        for job in self.renders {
            stacks.render.push(job);
        }
    }
}

fn any_missing(
    persistence: &dyn Persistence,
    commit_id: i64,
    kinds: &[ArtifactKind],
) -> Result<bool, PersistenceError> {
    for kind in kinds {
        if !persistence.artifact_exists(commit_id, *kind)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Work out the jobs still required for `commit`.
///
/// A download is designated when its raw artifact or any render derived from
/// it is missing; the save stage skips whatever already exists. The date
/// render needs no download. A fully saved commit designates nothing.
pub fn designate_jobs(
    commit: &Arc<CommitRecord>,
    persistence: &dyn Persistence,
) -> Result<Designation, PersistenceError> {
    let mut designation = Designation::default();

    if any_missing(persistence, commit.commit_id, &CANVAS_ARTIFACTS)? {
        designation.downloads.push(DownloadJob {
            commit: Arc::clone(commit),
            kind: DownloadKind::Canvas,
        });
    }

    if any_missing(persistence, commit.commit_id, &PLACERS_ARTIFACTS)? {
        designation.downloads.push(DownloadJob {
            commit: Arc::clone(commit),
            kind: DownloadKind::Placers,
        });
    }

    if !persistence.artifact_exists(commit.commit_id, ArtifactKind::DateRender)? {
        designation.renders.push(RenderJob {
            commit: Arc::clone(commit),
            payload: RenderPayload::Date,
        });
    }

    Ok(designation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockPersistence;
    use chrono::{TimeZone, Utc};

    fn commit(id: i64, hash: &str) -> Arc<CommitRecord> {
        Arc::new(CommitRecord::new(
            id,
            hash,
            Utc.timestamp_opt(1704298864, 0).single().unwrap(),
        ))
    }

    fn download_kinds(designation: &Designation) -> Vec<DownloadKind> {
        designation.downloads.iter().map(|job| job.kind).collect()
    }

    #[test]
    fn test_nothing_saved_designates_everything() {
        let persistence = MockPersistence::new();
        let designation = designate_jobs(&commit(1, "abc123"), &persistence).unwrap();

        assert_eq!(
            download_kinds(&designation),
            vec![DownloadKind::Canvas, DownloadKind::Placers]
        );
        assert_eq!(designation.renders.len(), 1);
        assert!(matches!(designation.renders[0].payload, RenderPayload::Date));
        assert_eq!(designation.len(), 3);
    }

    #[test]
    fn test_saved_canvas_designates_placers_and_date() {
        let persistence = MockPersistence::new();
        persistence.mark_saved(2, ArtifactKind::CanvasDownload);
        persistence.mark_saved(2, ArtifactKind::CanvasRender);

        let designation = designate_jobs(&commit(2, "def456"), &persistence).unwrap();
        assert_eq!(download_kinds(&designation), vec![DownloadKind::Placers]);
        assert_eq!(designation.renders.len(), 1);
    }

    #[test]
    fn test_missing_byproduct_redesignates_download() {
        let persistence = MockPersistence::new();
        persistence.mark_saved(3, ArtifactKind::PlacersDownload);
        persistence.mark_saved(3, ArtifactKind::TopPlacersRender);
        for kind in CANVAS_ARTIFACTS {
            persistence.mark_saved(3, kind);
        }

        let designation = designate_jobs(&commit(3, "0a0a0a"), &persistence).unwrap();
        assert_eq!(download_kinds(&designation), vec![DownloadKind::Placers]);
    }

    #[test]
    fn test_fully_saved_commit_designates_nothing() {
        let persistence = MockPersistence::new();
        for kind in ArtifactKind::ALL {
            persistence.mark_saved(4, kind);
        }

        let designation = designate_jobs(&commit(4, "f00d"), &persistence).unwrap();
        assert!(designation.is_empty());
    }

    #[test]
    fn test_persistence_error_propagates() {
        let persistence = MockPersistence::new();
        persistence.fail_next("database is locked");

        let result = designate_jobs(&commit(5, "bad"), &persistence);
        assert!(matches!(result, Err(PersistenceError::Database(_))));
    }

    #[test]
    fn test_enqueue_pushes_onto_stacks() {
        let persistence = MockPersistence::new();
        let stacks = PipelineStacks::new(4);
        designate_jobs(&commit(6, "abc123"), &persistence)
            .unwrap()
            .enqueue(&stacks);

        assert_eq!(stacks.download.len(), 2);
        assert_eq!(stacks.render.len(), 1);
        assert_eq!(stacks.download.pop().unwrap().kind, DownloadKind::Placers);
    }
}
