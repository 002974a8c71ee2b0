//! Worker pools, one per stage, owned by the main loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::events::{EventBus, PipelineEvent};
use super::types::Stage;
use crate::metrics::WORKERS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Waiting,
    Active,
}

/// Identity and status of a worker, shared with its task.
#[derive(Debug)]
pub struct WorkerState {
    stage: Stage,
    worker_id: usize,
    active: AtomicBool,
}

impl WorkerState {
    pub fn new(stage: Stage, worker_id: usize) -> Self {
        Self {
            stage,
            worker_id,
            active: AtomicBool::new(false),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn status(&self) -> WorkerStatus {
        if self.active.load(Ordering::Acquire) {
            WorkerStatus::Active
        } else {
            WorkerStatus::Waiting
        }
    }

    pub fn info(&self) -> WorkerInfo {
        WorkerInfo {
            worker_id: self.worker_id,
            stage: self.stage,
            status: self.status(),
        }
    }
}

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    pub worker_id: usize,
    pub stage: Stage,
    pub status: WorkerStatus,
}

/// Starts the task behind a pool entry.
pub trait WorkerSpawner {
    fn spawn_worker(
        &self,
        state: Arc<WorkerState>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<JoinHandle<()>, PipelineError>;
}

struct WorkerPoolEntry {
    state: Arc<WorkerState>,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl WorkerPoolEntry {
    /// Ask the worker to exit at the top of its loop. Its task releases the
    /// stage resources it owns when it returns.
    fn cancel(mut self) -> JoinHandle<()> {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.handle
    }
}

/// Workers of a single stage. Removal is LIFO.
pub struct WorkerPool {
    stage: Stage,
    entries: Vec<WorkerPoolEntry>,
    published: watch::Sender<Vec<Arc<WorkerState>>>,
}

impl WorkerPool {
    pub fn new(stage: Stage) -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            stage,
            entries: Vec::new(),
            published,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn reader(&self) -> PoolReader {
        PoolReader {
            stage: self.stage,
            receiver: self.published.subscribe(),
        }
    }

    fn publish(&self) {
        let states = self.entries.iter().map(|e| Arc::clone(&e.state)).collect();
        self.published.send_replace(states);
        WORKERS
            .with_label_values(&[self.stage.as_str()])
            .set(self.entries.len() as i64);
    }

    /// Spawn a worker with the next dense id and append it.
    pub fn add(&mut self, spawner: &dyn WorkerSpawner) -> Result<usize, PipelineError> {
        let worker_id = self.entries.len() + 1;
        let state = Arc::new(WorkerState::new(self.stage, worker_id));
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let handle = spawner.spawn_worker(Arc::clone(&state), cancel_rx)?;

        self.entries.push(WorkerPoolEntry {
            state,
            cancel: Some(cancel_tx),
            handle,
        });
        self.publish();
        debug!(stage = %self.stage, worker_id, "Worker added");
        Ok(self.entries.len())
    }

    /// Cancel the most recently added worker.
    pub fn remove(&mut self) -> Result<(usize, JoinHandle<()>), PipelineError> {
        let entry = self
            .entries
            .pop()
            .ok_or(PipelineError::PoolUnderflow { stage: self.stage })?;
        let worker_id = entry.state.worker_id();
        let handle = entry.cancel();
        self.publish();
        debug!(stage = %self.stage, worker_id, "Worker removed");
        Ok((worker_id, handle))
    }

    /// Cancel every worker. Returns how many were cancelled.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        while let Some(entry) = self.entries.pop() {
            entry.cancel();
        }
        self.publish();
        count
    }
}

/// Read-only view of a pool, usable from any task.
///
/// Readers may lag one update behind but never observe a partial entry.
#[derive(Debug, Clone)]
pub struct PoolReader {
    stage: Stage,
    receiver: watch::Receiver<Vec<Arc<WorkerState>>>,
}

impl PoolReader {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.receiver.borrow().iter().map(|s| s.info()).collect()
    }

    pub fn len(&self) -> usize {
        self.receiver.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Readers for all three pools.
#[derive(Debug, Clone)]
pub struct PoolReaders {
    pub download: PoolReader,
    pub render: PoolReader,
    pub save: PoolReader,
}

impl PoolReaders {
    pub fn get(&self, stage: Stage) -> &PoolReader {
        match stage {
            Stage::Download => &self.download,
            Stage::Render => &self.render,
            Stage::Save => &self.save,
        }
    }

    /// Snapshot of the workers of `stage`.
    pub fn get_workers(&self, stage: Stage) -> Vec<WorkerInfo> {
        self.get(stage).workers()
    }
}

/// The three stage pools plus the bookkeeping around resizing them.
pub struct PoolManager {
    download: WorkerPool,
    render: WorkerPool,
    save: WorkerPool,
    events: EventBus,
}

impl PoolManager {
    pub fn new(events: EventBus) -> Self {
        Self {
            download: WorkerPool::new(Stage::Download),
            render: WorkerPool::new(Stage::Render),
            save: WorkerPool::new(Stage::Save),
            events,
        }
    }

    fn pool_mut(&mut self, stage: Stage) -> &mut WorkerPool {
        match stage {
            Stage::Download => &mut self.download,
            Stage::Render => &mut self.render,
            Stage::Save => &mut self.save,
        }
    }

    pub fn pool(&self, stage: Stage) -> &WorkerPool {
        match stage {
            Stage::Download => &self.download,
            Stage::Render => &self.render,
            Stage::Save => &self.save,
        }
    }

    pub fn readers(&self) -> PoolReaders {
        PoolReaders {
            download: self.download.reader(),
            render: self.render.reader(),
            save: self.save.reader(),
        }
    }

    pub fn add_worker(
        &mut self,
        stage: Stage,
        spawner: &dyn WorkerSpawner,
    ) -> Result<usize, PipelineError> {
        let count = self.pool_mut(stage).add(spawner)?;
        info!(%stage, count, "Added worker");
        self.events
            .emit(PipelineEvent::WorkerCountChanged { stage, count });
        Ok(count)
    }

    pub fn remove_worker(&mut self, stage: Stage) -> Result<usize, PipelineError> {
        match self.pool_mut(stage).remove() {
            Ok((worker_id, _handle)) => {
                let count = self.pool(stage).len();
                info!(%stage, worker_id, count, "Removed worker");
                self.events
                    .emit(PipelineEvent::WorkerCountChanged { stage, count });
                Ok(count)
            }
            Err(e) => {
                warn!(%stage, "Cannot remove worker: pool is empty");
                self.events.emit(PipelineEvent::PoolUnderflow { stage });
                Err(e)
            }
        }
    }

    /// Cancel every worker of every stage.
    pub fn clear(&mut self) -> usize {
        let mut total = 0;
        for stage in Stage::ALL {
            let removed = self.pool_mut(stage).clear();
            if removed > 0 {
                self.events
                    .emit(PipelineEvent::WorkerCountChanged { stage, count: 0 });
            }
            total += removed;
        }
        total
    }
}
