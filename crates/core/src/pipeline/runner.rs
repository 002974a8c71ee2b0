//! The main loop owning a generation run, and the handle controlling it.
//!
//! Every mutation of run state (pools, run config, statistics) happens on the
//! main loop task, in mailbox order. Other tasks only read published
//! snapshots.

use std::sync::Arc;
use std::time::Instant;

use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::metrics::{GENERATION_RUNNING, STACK_DEPTH};
use crate::persistence::{Persistence, PersistenceError};
use crate::render::Renderer;
use crate::transport::Transport;

use super::config::{GenerationConfig, PipelineConfig};
use super::error::PipelineError;
use super::events::{EventBus, PipelineEvent};
use super::ingest::{IngestProgress, Ingestor};
use super::mailbox::{mailbox, Command, Mailbox, MailboxError, MailboxReceiver};
use super::pool::{PoolManager, PoolReaders, WorkerInfo};
use super::stack::PipelineStacks;
use super::stats::{RunStatistics, StatsSnapshot};
use super::types::{ArtifactKind, CompletedArtifact, Stage};
use super::workers::{UserCache, WorkerContext};

/// External collaborators of the generator.
#[derive(Clone)]
pub struct Dependencies {
    pub persistence: Arc<dyn Persistence>,
    pub transport: Arc<dyn Transport>,
    pub renderer: Arc<dyn Renderer>,
}

impl Dependencies {
    pub fn new(
        persistence: Arc<dyn Persistence>,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            persistence,
            transport,
            renderer,
        }
    }
}

/// State of a running generation.
struct ActiveRun {
    run_id: u64,
    instance_id: i64,
    context: Arc<WorkerContext>,
    ingestor: Option<Ingestor<BufReader<File>>>,
    ticker: JoinHandle<()>,
}

struct MainLoop {
    settings: PipelineConfig,
    deps: Dependencies,
    mailbox: Mailbox,
    receiver: MailboxReceiver,
    events: EventBus,
    pools: PoolManager,
    stats: RunStatistics,
    stats_tx: watch::Sender<StatsSnapshot>,
    run: Option<ActiveRun>,
    next_run_id: u64,
}

impl MainLoop {
    async fn run(mut self) {
        info!("Generator started");

        while let Some(command) = self.receiver.drain_one().await {
            debug!(command = command.name(), "Handling command");
            match command {
                Command::StartGeneration(config) => {
                    if let Err(e) = self.start(*config).await {
                        error!("Failed to start generation: {}", e);
                    }
                }
                Command::StopGeneration => {
                    if let Err(e) = self.stop() {
                        warn!("Ignoring stop: {}", e);
                    }
                }
                Command::AddWorker(stage) => self.add_worker(stage),
                Command::RemoveWorker(stage) => self.remove_worker(stage),
                Command::CollectStats => self.collect_stats(),
                Command::IngestContinuation { run_id } => self.ingest_next(run_id).await,
                Command::ArtifactSaved(artifact) => self.artifact_saved(artifact),
                Command::Shutdown => break,
            }
        }

        if self.run.is_some() {
            let _ = self.stop();
        }
        info!("Generator stopped");
    }

    async fn start(&mut self, config: GenerationConfig) -> Result<(), PipelineError> {
        if self.run.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        config.validate()?;

        let instance_id = self
            .deps
            .persistence
            .find_or_create_instance(&config.repo_url, &config.game_server_base_url)?;

        for kind in ArtifactKind::ALL {
            let dir = config.output_dir.join(kind.dir_name());
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| PersistenceError::Filesystem {
                    path: dir.display().to_string(),
                    message: e.to_string(),
                })?;
        }

        let config = Arc::new(config);
        let ingestor = Ingestor::open(
            instance_id,
            Arc::clone(&config),
            self.settings.ingest_batch_size,
        )
        .await?;

        let run_id = self.next_run_id;
        self.next_run_id += 1;

        let context = Arc::new(WorkerContext {
            config: Arc::clone(&config),
            stacks: PipelineStacks::new(self.settings.stack_capacity),
            persistence: Arc::clone(&self.deps.persistence),
            transport: Arc::clone(&self.deps.transport),
            renderer: Arc::clone(&self.deps.renderer),
            users: Arc::new(UserCache::new()),
            mailbox: self.mailbox.clone(),
            events: self.events.clone(),
        });

        if let Err(e) = self.spawn_default_workers(&context) {
            self.pools.clear();
            return Err(e);
        }

        self.stats = RunStatistics::new();
        self.run = Some(ActiveRun {
            run_id,
            instance_id,
            context,
            ingestor: Some(ingestor),
            ticker: spawn_stats_ticker(self.mailbox.clone(), self.settings.stats_interval()),
        });
        self.mailbox.post(Command::IngestContinuation { run_id })?;

        GENERATION_RUNNING.set(1);
        info!(
            run_id,
            instance_id,
            repo = %config.repo_url,
            commit_log = %config.commit_log.display(),
            output_dir = %config.output_dir.display(),
            "Generation started"
        );
        self.publish_stats();
        self.events.emit(PipelineEvent::GenerationStarted {
            run_id,
            instance_id,
            repo_url: config.repo_url.clone(),
        });
        Ok(())
    }

    fn spawn_default_workers(&mut self, context: &WorkerContext) -> Result<(), PipelineError> {
        for stage in Stage::ALL {
            for _ in 0..self.settings.workers_for(stage) {
                self.pools.add_worker(stage, context)?;
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PipelineError> {
        let run = self.run.take().ok_or(PipelineError::NotRunning)?;
        run.ticker.abort();

        let workers = self.pools.clear();
        let dropped_jobs = run.context.stacks.drain_all();
        for stage in Stage::ALL {
            STACK_DEPTH.with_label_values(&[stage.as_str()]).set(0);
        }
        GENERATION_RUNNING.set(0);

        info!(
            run_id = run.run_id,
            instance_id = run.instance_id,
            workers,
            dropped_jobs,
            completed = self.stats.completed_total(),
            "Generation stopped"
        );
        self.publish_stats();
        self.events.emit(PipelineEvent::GenerationStopped {
            run_id: run.run_id,
            dropped_jobs,
        });
        Ok(())
    }

    fn add_worker(&mut self, stage: Stage) {
        let Some(run) = self.run.as_ref() else {
            warn!(%stage, "Ignoring add worker: generation is not running");
            return;
        };
        let context = Arc::clone(&run.context);
        if let Err(e) = self.pools.add_worker(stage, context.as_ref()) {
            error!(%stage, "Failed to add worker: {}", e);
        }
    }

    fn remove_worker(&mut self, stage: Stage) {
        if self.run.is_none() {
            warn!(%stage, "Ignoring remove worker: generation is not running");
            return;
        }
        // Underflow is reported by the pool manager
        let _ = self.pools.remove_worker(stage);
    }

    async fn ingest_next(&mut self, run_id: u64) {
        let Some(run) = self.run.as_mut() else {
            debug!(run_id, "Ignoring continuation: generation is not running");
            return;
        };
        if run.run_id != run_id {
            debug!(run_id, current = run.run_id, "Ignoring continuation of a previous run");
            return;
        }
        let Some(ingestor) = run.ingestor.as_mut() else {
            return;
        };

        let progress = ingestor
            .ingest_batch(self.deps.persistence.as_ref(), &run.context.stacks)
            .await;

        match progress {
            Ok(IngestProgress::MoreAvailable { ingested }) => {
                self.stats.record_ingested(ingested);
                let depth = run.context.stacks.download.len();
                if depth <= self.settings.ingest_high_watermark {
                    if let Err(e) = self.mailbox.post(Command::IngestContinuation { run_id }) {
                        error!("Failed to continue ingest: {}", e);
                    }
                } else {
                    debug!(depth, "Download stack above watermark, backing off");
                    let mailbox = self.mailbox.clone();
                    let backoff = self.settings.ingest_backoff();
                    tokio::spawn(async move {
                        tokio::time::sleep(backoff).await;
                        // Closed when the generator shut down meanwhile
                        let _ = mailbox.post(Command::IngestContinuation { run_id });
                    });
                }
            }
            Ok(IngestProgress::Finished { ingested, total }) => {
                self.stats.record_ingested(ingested);
                run.ingestor = None;
                self.events.emit(PipelineEvent::IngestFinished {
                    run_id,
                    records: total,
                });
            }
            Err(e) => {
                error!(run_id, "Commit ingest aborted: {}", e);
                run.ingestor = None;
            }
        }
    }

    fn artifact_saved(&mut self, artifact: CompletedArtifact) {
        if self.run.is_none() {
            debug!(commit = %artifact.commit_hash, "Artifact saved after stop");
            return;
        }
        self.stats.record_completed(artifact);
    }

    fn collect_stats(&mut self) {
        if self.run.is_none() {
            return;
        }
        self.stats.collect(Instant::now());
        let snapshot = self.publish_stats();
        for stage in Stage::ALL {
            let depth = snapshot.stack_depths.get(stage);
            STACK_DEPTH
                .with_label_values(&[stage.as_str()])
                .set(depth as i64);
        }
        self.events.emit(PipelineEvent::Stats(snapshot));
    }

    fn publish_stats(&self) -> StatsSnapshot {
        let (run_id, depths) = match &self.run {
            Some(run) => (Some(run.run_id), run.context.stacks.depths()),
            None => (None, Default::default()),
        };
        let snapshot = self.stats.snapshot(run_id, depths);
        self.stats_tx.send_replace(snapshot.clone());
        snapshot
    }
}

/// Periodically asks the main loop to collect statistics.
fn spawn_stats_ticker(mailbox: Mailbox, period: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            interval.tick().await;
            match mailbox.try_post(Command::CollectStats) {
                Ok(()) => {}
                Err(MailboxError::Overflow) => debug!("Mailbox busy, skipping stats tick"),
                Err(MailboxError::Closed) => break,
            }
        }
    })
}

/// Entry point: spawns the main loop.
pub struct Generator;

impl Generator {
    /// Spawn the main loop on the current runtime.
    pub fn spawn(settings: PipelineConfig, deps: Dependencies) -> (GeneratorHandle, JoinHandle<()>) {
        let (mailbox, receiver) = mailbox(settings.mailbox_capacity);
        let events = EventBus::new(settings.event_capacity);
        let pools = PoolManager::new(events.clone());
        let (stats_tx, stats_rx) = watch::channel(StatsSnapshot::default());

        let handle = GeneratorHandle {
            mailbox: mailbox.clone(),
            events: events.clone(),
            pools: pools.readers(),
            stats: stats_rx,
        };

        let main_loop = MainLoop {
            settings,
            deps,
            mailbox,
            receiver,
            events,
            pools,
            stats: RunStatistics::new(),
            stats_tx,
            run: None,
            next_run_id: 1,
        };

        (handle, tokio::spawn(main_loop.run()))
    }
}

/// Cloneable control surface of a running generator.
///
/// Mutations are posted to the main loop and take effect in order; reads
/// come from the last published snapshot.
#[derive(Debug, Clone)]
pub struct GeneratorHandle {
    mailbox: Mailbox,
    events: EventBus,
    pools: PoolReaders,
    stats: watch::Receiver<StatsSnapshot>,
}

impl GeneratorHandle {
    pub fn is_running(&self) -> bool {
        self.stats.borrow().running
    }

    pub fn start_generation(&self, config: GenerationConfig) -> Result<(), PipelineError> {
        config.validate()?;
        if self.is_running() {
            return Err(PipelineError::AlreadyRunning);
        }
        self.mailbox
            .post(Command::StartGeneration(Box::new(config)))?;
        Ok(())
    }

    pub fn stop_generation(&self) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }
        self.mailbox.post(Command::StopGeneration)?;
        Ok(())
    }

    pub fn add_workers(&self, stage: Stage, count: usize) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }
        self.post_worker_changes(Command::AddWorker(stage), stage, count)
    }

    /// Remove the `count` most recently added workers of `stage`.
    pub fn remove_workers(&self, stage: Stage, count: usize) -> Result<(), PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }
        if self.pools.get(stage).len() < count {
            return Err(PipelineError::PoolUnderflow { stage });
        }
        self.post_worker_changes(Command::RemoveWorker(stage), stage, count)
    }

    /// Queue `count` pool changes at once. A request that does not fit the
    /// mailbox is refused instead of overflowing it.
    fn post_worker_changes(
        &self,
        command: Command,
        stage: Stage,
        count: usize,
    ) -> Result<(), PipelineError> {
        self.mailbox
            .try_post_many(command, count)
            .map_err(|e| match e {
                MailboxError::Overflow => PipelineError::TooManyRequested {
                    stage,
                    requested: count,
                },
                MailboxError::Closed => PipelineError::Mailbox(e),
            })
    }

    pub fn pool_snapshot(&self, stage: Stage) -> Vec<WorkerInfo> {
        self.pools.get_workers(stage)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Stop any running generation and end the main loop.
    pub fn shutdown(&self) -> Result<(), PipelineError> {
        match self.mailbox.post(Command::Shutdown) {
            Ok(()) | Err(MailboxError::Closed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
