//! Types flowing through the generation pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::canvas::{CanvasMetadata, Placer};

use super::error::StageError;

/// A commit registered with persistence. Shared by every job derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub commit_id: i64,
    pub commit_hash: String,
    pub date: DateTime<Utc>,
}

impl CommitRecord {
    pub fn new(commit_id: i64, commit_hash: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            commit_id,
            commit_hash: commit_hash.into(),
            date,
        }
    }
}

/// Pipeline stage, one worker pool each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Render,
    Save,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Download, Stage::Render, Stage::Save];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Render => "render",
            Stage::Save => "save",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every artifact persisted for a commit.
///
/// The integer codes are stored in the database and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    CanvasDownload,
    PlacersDownload,
    CanvasRender,
    DateRender,
    TopPlacersRender,
    CanvasControlRender,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 6] = [
        ArtifactKind::CanvasDownload,
        ArtifactKind::PlacersDownload,
        ArtifactKind::CanvasRender,
        ArtifactKind::DateRender,
        ArtifactKind::TopPlacersRender,
        ArtifactKind::CanvasControlRender,
    ];

    pub fn code(&self) -> i64 {
        match self {
            ArtifactKind::CanvasDownload => 0,
            ArtifactKind::PlacersDownload => 1,
            ArtifactKind::CanvasRender => 2,
            ArtifactKind::DateRender => 3,
            ArtifactKind::TopPlacersRender => 4,
            ArtifactKind::CanvasControlRender => 5,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::CanvasDownload => "canvas_download",
            ArtifactKind::PlacersDownload => "placers_download",
            ArtifactKind::CanvasRender => "canvas_render",
            ArtifactKind::DateRender => "date_render",
            ArtifactKind::TopPlacersRender => "top_placers_render",
            ArtifactKind::CanvasControlRender => "canvas_control_render",
        }
    }

    /// Directory under the output root holding this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            ArtifactKind::CanvasDownload => "canvas_downloads",
            ArtifactKind::PlacersDownload => "placer_downloads",
            ArtifactKind::CanvasRender => "canvas_renders",
            ArtifactKind::DateRender => "date_renders",
            ArtifactKind::TopPlacersRender => "top_placer_renders",
            ArtifactKind::CanvasControlRender => "canvas_control_renders",
        }
    }

    /// Raw downloads are stored without an extension.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ArtifactKind::CanvasDownload | ArtifactKind::PlacersDownload => None,
            _ => Some("png"),
        }
    }

    /// Where an artifact of this kind is written for `commit`.
    pub fn output_path(&self, output_dir: &Path, commit: &CommitRecord) -> PathBuf {
        let mut file_name = format!(
            "{}_{}_{}",
            commit.date.format("%Y-%m-%dT%H:%M:%SZ"),
            commit.commit_id,
            commit.commit_hash
        );
        if let Some(extension) = self.extension() {
            file_name.push('.');
            file_name.push_str(extension);
        }
        output_dir.join(self.dir_name()).join(file_name)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a download job fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadKind {
    Canvas,
    Placers,
}

#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub commit: Arc<CommitRecord>,
    pub kind: DownloadKind,
}

/// Input of a render job.
#[derive(Debug, Clone)]
pub enum RenderPayload {
    Canvas {
        metadata: CanvasMetadata,
        canvas: Vec<u8>,
    },
    Date,
    TopPlacers {
        placers: Vec<Placer>,
    },
    CanvasControl {
        width: u32,
        height: u32,
        placers: Vec<u32>,
        top_placers: Vec<Placer>,
    },
}

impl RenderPayload {
    /// The artifact this payload renders into.
    pub fn artifact_kind(&self) -> ArtifactKind {
        match self {
            RenderPayload::Canvas { .. } => ArtifactKind::CanvasRender,
            RenderPayload::Date => ArtifactKind::DateRender,
            RenderPayload::TopPlacers { .. } => ArtifactKind::TopPlacersRender,
            RenderPayload::CanvasControl { .. } => ArtifactKind::CanvasControlRender,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub commit: Arc<CommitRecord>,
    pub payload: RenderPayload,
}

#[derive(Debug, Clone)]
pub struct SaveJob {
    pub commit: Arc<CommitRecord>,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

impl SaveJob {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A unit of work for one of the stages.
#[derive(Debug, Clone)]
pub enum Job {
    Download(DownloadJob),
    Render(RenderJob),
    Save(SaveJob),
}

impl Job {
    pub fn stage(&self) -> Stage {
        match self {
            Job::Download(_) => Stage::Download,
            Job::Render(_) => Stage::Render,
            Job::Save(_) => Stage::Save,
        }
    }

    pub fn commit(&self) -> &Arc<CommitRecord> {
        match self {
            Job::Download(job) => &job.commit,
            Job::Render(job) => &job.commit,
            Job::Save(job) => &job.commit,
        }
    }
}

/// Downstream jobs produced by a stage, or why none were.
pub type WorkResult = Result<Vec<Job>, StageError>;

/// Common view of stage-scoped jobs, used for logging.
pub trait StageJob: Send + 'static {
    fn commit(&self) -> &Arc<CommitRecord>;
    fn describe(&self) -> &'static str;
}

impl StageJob for DownloadJob {
    fn commit(&self) -> &Arc<CommitRecord> {
        &self.commit
    }

    fn describe(&self) -> &'static str {
        match self.kind {
            DownloadKind::Canvas => "download canvas",
            DownloadKind::Placers => "download placers",
        }
    }
}

impl StageJob for RenderJob {
    fn commit(&self) -> &Arc<CommitRecord> {
        &self.commit
    }

    fn describe(&self) -> &'static str {
        match self.payload {
            RenderPayload::Canvas { .. } => "render canvas",
            RenderPayload::Date => "render date",
            RenderPayload::TopPlacers { .. } => "render top placers",
            RenderPayload::CanvasControl { .. } => "render canvas control",
        }
    }
}

impl StageJob for SaveJob {
    fn commit(&self) -> &Arc<CommitRecord> {
        &self.commit
    }

    fn describe(&self) -> &'static str {
        "save artifact"
    }
}

/// An artifact written to disk and recorded, reported back to the main loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedArtifact {
    pub commit_id: i64,
    pub commit_hash: String,
    pub date: DateTime<Utc>,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit() -> CommitRecord {
        CommitRecord::new(
            42,
            "abc123",
            Utc.timestamp_opt(1704298864, 0).single().unwrap(),
        )
    }

    #[test]
    fn test_artifact_codes_are_stable() {
        for (expected, kind) in ArtifactKind::ALL.iter().enumerate() {
            assert_eq!(kind.code(), expected as i64);
            assert_eq!(ArtifactKind::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(ArtifactKind::from_code(6), None);
    }

    #[test]
    fn test_output_path_for_download() {
        let path = ArtifactKind::CanvasDownload.output_path(Path::new("/out"), &commit());
        assert_eq!(
            path,
            PathBuf::from("/out/canvas_downloads/2024-01-03T16:21:04Z_42_abc123")
        );
    }

    #[test]
    fn test_output_path_for_render_has_png_extension() {
        let path = ArtifactKind::TopPlacersRender.output_path(Path::new("/out"), &commit());
        assert_eq!(
            path,
            PathBuf::from("/out/top_placer_renders/2024-01-03T16:21:04Z_42_abc123.png")
        );
    }

    #[test]
    fn test_render_payload_kind() {
        assert_eq!(RenderPayload::Date.artifact_kind(), ArtifactKind::DateRender);
        let payload = RenderPayload::TopPlacers {
            placers: Vec::new(),
        };
        assert_eq!(payload.artifact_kind(), ArtifactKind::TopPlacersRender);
    }

    #[test]
    fn test_stage_serde() {
        let stage: Stage = serde_json::from_str("\"download\"").unwrap();
        assert_eq!(stage, Stage::Download);
        assert_eq!(Stage::Save.to_string(), "save");
    }
}
