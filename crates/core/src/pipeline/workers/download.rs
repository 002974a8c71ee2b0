use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::StageHandler;
use crate::canvas::{
    count_top_placers, parse_canvas, parse_metadata, parse_placers, parse_user, CanvasMetadata,
    Placer, User,
};
use crate::persistence::Persistence;
use crate::pipeline::config::GenerationConfig;
use crate::pipeline::error::StageError;
use crate::pipeline::types::{
    ArtifactKind, CommitRecord, DownloadJob, DownloadKind, Job, RenderJob, RenderPayload, SaveJob,
    WorkResult,
};
use crate::transport::{canvas_url, metadata_url, placers_url, user_url, Fetcher};

/// User info shared by all download workers of a run. Entries are only added.
#[derive(Debug, Default)]
pub struct UserCache {
    users: Mutex<HashMap<u32, User>>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, int_id: u32) -> Option<User> {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&int_id)
            .cloned()
    }

    pub fn insert(&self, user: User) {
        self.users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user.int_id)
            .or_insert(user);
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Download stage: fetches a snapshot and fans it out into save and render jobs.
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    users: Arc<UserCache>,
    persistence: Arc<dyn Persistence>,
    config: Arc<GenerationConfig>,
}

impl Downloader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        users: Arc<UserCache>,
        persistence: Arc<dyn Persistence>,
        config: Arc<GenerationConfig>,
    ) -> Self {
        Self {
            fetcher,
            users,
            persistence,
            config,
        }
    }

    pub async fn download(&self, job: DownloadJob) -> WorkResult {
        let base = &self.config.download_base_url;
        let metadata_bytes = self
            .fetcher
            .fetch(&metadata_url(base, &job.commit.commit_hash))
            .await?;
        let metadata = parse_metadata(&metadata_bytes)?;

        match job.kind {
            DownloadKind::Canvas => self.download_canvas(job.commit, metadata).await,
            DownloadKind::Placers => self.download_placers(job.commit, metadata).await,
        }
    }

    /// Best-effort; called once the snapshot payload is known to be valid.
    fn record_metadata(&self, commit: &CommitRecord, metadata: &CanvasMetadata) {
        if let Err(e) = self
            .persistence
            .record_canvas_metadata(commit.commit_id, metadata)
        {
            warn!(
                commit = %commit.commit_hash,
                error = %e,
                "Failed to record canvas metadata"
            );
        }
    }

    async fn download_canvas(
        &self,
        commit: Arc<CommitRecord>,
        metadata: CanvasMetadata,
    ) -> WorkResult {
        let canvas = self
            .fetcher
            .fetch(&canvas_url(&self.config.download_base_url, &commit.commit_hash))
            .await?;
        parse_canvas(&metadata, &canvas)?;
        self.record_metadata(&commit, &metadata);

        Ok(vec![
            Job::Save(SaveJob {
                commit: Arc::clone(&commit),
                kind: ArtifactKind::CanvasDownload,
                bytes: canvas.clone(),
            }),
            Job::Render(RenderJob {
                commit,
                payload: RenderPayload::Canvas { metadata, canvas },
            }),
        ])
    }

    async fn download_placers(
        &self,
        commit: Arc<CommitRecord>,
        metadata: CanvasMetadata,
    ) -> WorkResult {
        let bytes = self
            .fetcher
            .fetch(&placers_url(&self.config.download_base_url, &commit.commit_hash))
            .await?;
        let placers = parse_placers(&metadata, &bytes)?;
        self.record_metadata(&commit, &metadata);
        let top_placers = self.top_placers(&placers).await;
        debug!(
            commit = %commit.commit_hash,
            top_placers = top_placers.len(),
            "Resolved top placers"
        );

        Ok(vec![
            Job::Save(SaveJob {
                commit: Arc::clone(&commit),
                kind: ArtifactKind::PlacersDownload,
                bytes,
            }),
            Job::Render(RenderJob {
                commit: Arc::clone(&commit),
                payload: RenderPayload::TopPlacers {
                    placers: top_placers.clone(),
                },
            }),
            Job::Render(RenderJob {
                commit,
                payload: RenderPayload::CanvasControl {
                    width: metadata.width,
                    height: metadata.height,
                    placers,
                    top_placers,
                },
            }),
        ])
    }

    /// Resolve the biggest placers. Placers whose lookup fails are skipped.
    async fn top_placers(&self, placers: &[u32]) -> Vec<Placer> {
        let mut top = Vec::new();
        for (int_id, count) in count_top_placers(placers, self.config.max_top_placers) {
            match self.user(int_id).await {
                Ok(user) => top.push(Placer::from_user(&user, count)),
                Err(e) => warn!(int_id, error = %e, "Skipping top placer, user lookup failed"),
            }
        }
        top
    }

    async fn user(&self, int_id: u32) -> Result<User, StageError> {
        if let Some(user) = self.users.get(int_id) {
            return Ok(user);
        }
        let bytes = self
            .fetcher
            .fetch(&user_url(&self.config.game_server_base_url, int_id))
            .await?;
        let user = parse_user(int_id, &bytes)?;
        self.users.insert(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl StageHandler for Downloader {
    type Job = DownloadJob;

    async fn process(&mut self, job: DownloadJob) -> WorkResult {
        self.download(job).await
    }
}
