//! Stage workers: a shared run loop plus one handler per stage.

mod download;
mod render;
mod save;

pub use download::{Downloader, UserCache};
pub use render::{render_job, RenderStage};
pub use save::Saver;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::GenerationConfig;
use super::error::PipelineError;
use super::events::{EventBus, PipelineEvent};
use super::mailbox::Mailbox;
use super::pool::{WorkerSpawner, WorkerState};
use super::stack::{PipelineStacks, Stack};
use super::types::{Stage, StageJob, WorkResult};
use crate::metrics::{JOBS_PROCESSED, JOB_DURATION};
use crate::persistence::Persistence;
use crate::render::Renderer;
use crate::transport::Transport;

/// Transforms one job of a stage into downstream jobs.
#[async_trait]
pub trait StageHandler: Send + 'static {
    type Job: StageJob;

    async fn process(&mut self, job: Self::Job) -> WorkResult;
}

/// Worker loop: pop, process, route, until cancelled.
///
/// Cancellation is only observed between jobs.
pub async fn run_worker<H: StageHandler>(
    mut handler: H,
    input: Arc<Stack<H::Job>>,
    output: PipelineStacks,
    state: Arc<WorkerState>,
    mut cancel: oneshot::Receiver<()>,
    events: EventBus,
) {
    let stage = state.stage();
    let worker_id = state.worker_id();
    debug!(%stage, worker_id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = &mut cancel => break,
            job = input.pop_wait() => job,
        };

        state.set_active(true);
        let commit = Arc::clone(job.commit());
        let description = job.describe();
        let started = Instant::now();

        match handler.process(job).await {
            Ok(downstream) => {
                JOBS_PROCESSED
                    .with_label_values(&[stage.as_str(), "ok"])
                    .inc();
                debug!(
                    %stage,
                    worker_id,
                    commit = %commit.commit_hash,
                    job = description,
                    downstream = downstream.len(),
                    "Job done"
                );
                for next in downstream {
                    output.route(next);
                }
            }
            Err(e) => {
                JOBS_PROCESSED
                    .with_label_values(&[stage.as_str(), e.kind()])
                    .inc();
                warn!(
                    %stage,
                    worker_id,
                    commit = %commit.commit_hash,
                    job = description,
                    error = %e,
                    "Job failed, dropping"
                );
                events.emit(PipelineEvent::JobFailed {
                    stage,
                    worker_id,
                    commit_hash: commit.commit_hash.clone(),
                    job: description.to_string(),
                    error_kind: e.kind().to_string(),
                    message: e.to_string(),
                });
            }
        }

        JOB_DURATION
            .with_label_values(&[stage.as_str()])
            .observe(started.elapsed().as_secs_f64());
        state.set_active(false);
    }

    info!(%stage, worker_id, "Worker stopped");
}

/// Everything a generation run's workers share.
pub struct WorkerContext {
    pub config: Arc<GenerationConfig>,
    pub stacks: PipelineStacks,
    pub persistence: Arc<dyn Persistence>,
    pub transport: Arc<dyn Transport>,
    pub renderer: Arc<dyn Renderer>,
    pub users: Arc<UserCache>,
    pub mailbox: Mailbox,
    pub events: EventBus,
}

impl WorkerSpawner for WorkerContext {
    fn spawn_worker(
        &self,
        state: Arc<WorkerState>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<JoinHandle<()>, PipelineError> {
        let stacks = self.stacks.clone();
        let events = self.events.clone();

        let handle = match state.stage() {
            Stage::Download => {
                let fetcher = self
                    .transport
                    .open()
                    .map_err(|e| PipelineError::WorkerSpawn {
                        stage: Stage::Download,
                        message: e.to_string(),
                    })?;
                let handler = Downloader::new(
                    fetcher,
                    Arc::clone(&self.users),
                    Arc::clone(&self.persistence),
                    Arc::clone(&self.config),
                );
                let input = Arc::clone(&stacks.download);
                tokio::spawn(run_worker(handler, input, stacks, state, cancel, events))
            }
            Stage::Render => {
                let handler = RenderStage::new(Arc::clone(&self.renderer));
                let input = Arc::clone(&stacks.render);
                tokio::spawn(run_worker(handler, input, stacks, state, cancel, events))
            }
            Stage::Save => {
                let handler = Saver::new(
                    Arc::clone(&self.persistence),
                    self.config.output_dir.clone(),
                    self.mailbox.clone(),
                );
                let input = Arc::clone(&stacks.save);
                tokio::spawn(run_worker(handler, input, stacks, state, cancel, events))
            }
        };

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{
        ArtifactKind, CommitRecord, DownloadJob, DownloadKind, Job, SaveJob,
    };
    use crate::pipeline::StageError;
    use crate::transport::FetchError;
    use chrono::Utc;
    use std::time::Duration;

    /// Turns every download into one save job, or fails on demand.
    struct EchoHandler {
        fail: bool,
    }

    #[async_trait]
    impl StageHandler for EchoHandler {
        type Job = DownloadJob;

        async fn process(&mut self, job: DownloadJob) -> WorkResult {
            if self.fail {
                return Err(StageError::Fetch(FetchError::Status {
                    url: "http://example.com".to_string(),
                    status: 500,
                }));
            }
            Ok(vec![Job::Save(SaveJob {
                commit: job.commit,
                kind: ArtifactKind::CanvasDownload,
                bytes: vec![1, 2, 3],
            })])
        }
    }

    fn download_job(hash: &str) -> DownloadJob {
        DownloadJob {
            commit: Arc::new(CommitRecord::new(1, hash, Utc::now())),
            kind: DownloadKind::Canvas,
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_worker_routes_downstream_jobs() {
        let stacks = PipelineStacks::new(8);
        let state = Arc::new(WorkerState::new(Stage::Download, 1));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(
            EchoHandler { fail: false },
            Arc::clone(&stacks.download),
            stacks.clone(),
            Arc::clone(&state),
            cancel_rx,
            EventBus::new(8),
        ));

        stacks.download.push(download_job("abc123"));
        wait_until(|| stacks.save.len() == 1).await;

        cancel_tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(stacks.save.pop().unwrap().size(), 3);
    }

    #[tokio::test]
    async fn test_failed_job_is_dropped_and_reported() {
        let stacks = PipelineStacks::new(8);
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(
            EchoHandler { fail: true },
            Arc::clone(&stacks.download),
            stacks.clone(),
            Arc::new(WorkerState::new(Stage::Download, 2)),
            cancel_rx,
            events,
        ));

        stacks.download.push(download_job("badbad"));
        let event = rx.recv().await.unwrap();
        match event {
            PipelineEvent::JobFailed {
                stage,
                worker_id,
                commit_hash,
                error_kind,
                ..
            } => {
                assert_eq!(stage, Stage::Download);
                assert_eq!(worker_id, 2);
                assert_eq!(commit_hash, "badbad");
                assert_eq!(error_kind, "fetch");
            }
            other => panic!("unexpected event {:?}", other),
        }

        cancel_tx.send(()).unwrap();
        handle.await.unwrap();
        assert!(stacks.download.is_empty());
        assert_eq!(stacks.depths().save, 0);
        assert_eq!(stacks.depths().render, 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiting_worker_leaves_stack_intact() {
        let stacks = PipelineStacks::new(8);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = tokio::spawn(run_worker(
            EchoHandler { fail: false },
            Arc::clone(&stacks.download),
            stacks.clone(),
            Arc::new(WorkerState::new(Stage::Download, 1)),
            cancel_rx,
            EventBus::new(8),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(()).unwrap();
        handle.await.unwrap();

        stacks.download.push(download_job("first"));
        stacks.download.push(download_job("second"));
        assert_eq!(stacks.download.len(), 2);
        assert_eq!(stacks.download.pop().unwrap().commit.commit_hash, "second");
        assert_eq!(stacks.download.pop().unwrap().commit.commit_hash, "first");
        assert!(stacks.save.is_empty());
    }
}
