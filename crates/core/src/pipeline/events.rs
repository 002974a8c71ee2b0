//! Broadcast of pipeline events to observers.

use serde::Serialize;
use tokio::sync::broadcast;

use super::stats::StatsSnapshot;
use super::types::Stage;

/// Something observers may want to know about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    GenerationStarted {
        run_id: u64,
        instance_id: i64,
        repo_url: String,
    },
    GenerationStopped {
        run_id: u64,
        dropped_jobs: usize,
    },
    WorkerCountChanged {
        stage: Stage,
        count: usize,
    },
    PoolUnderflow {
        stage: Stage,
    },
    JobFailed {
        stage: Stage,
        worker_id: usize,
        commit_hash: String,
        job: String,
        error_kind: String,
        message: String,
    },
    IngestFinished {
        run_id: u64,
        records: u64,
    },
    Stats(StatsSnapshot),
}

/// Fan-out of [`PipelineEvent`]s over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
