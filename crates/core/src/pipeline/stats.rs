//! Completion statistics of a generation run.

use std::time::Instant;

use serde::Serialize;

use super::stack::StackDepths;
use super::types::CompletedArtifact;

/// Read-only view of the statistics, published by the main loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub run_id: Option<u64>,
    pub completed_artifacts: u64,
    pub artifacts_per_second: f64,
    pub last_completed: Option<CompletedArtifact>,
    pub ingested_commits: u64,
    pub stack_depths: StackDepths,
}

/// Statistics owned and mutated by the main loop only.
#[derive(Debug)]
pub struct RunStatistics {
    completed_total: u64,
    completed_since_collect: u64,
    last_collected: Instant,
    artifacts_per_second: f64,
    last_completed: Option<CompletedArtifact>,
    ingested_commits: u64,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            completed_total: 0,
            completed_since_collect: 0,
            last_collected: now,
            artifacts_per_second: 0.0,
            last_completed: None,
            ingested_commits: 0,
        }
    }

    pub fn record_completed(&mut self, artifact: CompletedArtifact) {
        self.completed_total += 1;
        self.completed_since_collect += 1;
        self.last_completed = Some(artifact);
    }

    pub fn record_ingested(&mut self, commits: u64) {
        self.ingested_commits += commits;
    }

    /// Recompute the completion rate over the interval since the last collection.
    pub fn collect(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_collected).as_secs_f64();
        if elapsed > 0.0 {
            self.artifacts_per_second = self.completed_since_collect as f64 / elapsed;
        }
        self.completed_since_collect = 0;
        self.last_collected = now;
    }

    pub fn completed_total(&self) -> u64 {
        self.completed_total
    }

    pub fn snapshot(&self, run_id: Option<u64>, stack_depths: StackDepths) -> StatsSnapshot {
        StatsSnapshot {
            running: run_id.is_some(),
            run_id,
            completed_artifacts: self.completed_total,
            artifacts_per_second: self.artifacts_per_second,
            last_completed: self.last_completed.clone(),
            ingested_commits: self.ingested_commits,
            stack_depths,
        }
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}
