//! Growable LIFO stack shared between pipeline stages.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use super::error::fatal;
use super::types::{DownloadJob, Job, RenderJob, SaveJob, Stage};

/// Upper bound on how long a waiting consumer sleeps before re-checking.
const RECHECK_INTERVAL: Duration = Duration::from_millis(50);

struct StackInner<T> {
    items: Vec<T>,
    capacity: usize,
}

/// Thread-safe LIFO stack.
///
/// Pushing never fails: a full stack doubles its capacity. Popping an empty
/// stack returns `None`; [`Stack::pop_wait`] suspends until an item exists.
pub struct Stack<T> {
    inner: Mutex<StackInner<T>>,
    available: Notify,
}

impl<T> Stack<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(StackInner {
                items: Vec::with_capacity(capacity),
                capacity,
            }),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StackInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, item: T) {
        let mut inner = self.lock();
        if inner.items.len() >= inner.capacity {
            let new_capacity = inner.capacity * 2;
            let additional = new_capacity - inner.items.len();
            if let Err(e) = inner.items.try_reserve_exact(additional) {
                fatal(&format!(
                    "failed to grow stack to {} items: {}",
                    new_capacity, e
                ));
            }
            debug!(from = inner.capacity, to = new_capacity, "Stack grown");
            inner.capacity = new_capacity;
        }
        inner.items.push(item);
        drop(inner);
        self.available.notify_one();
    }

    /// Remove the most recently pushed item, if any.
    pub fn pop(&self) -> Option<T> {
        self.lock().items.pop()
    }

    /// Wait until an item can be popped.
    ///
    /// Cancel-safe: an item is only removed in the same poll that returns it.
    pub async fn pop_wait(&self) -> T {
        loop {
            let notified = self.available.notified();
            if let Some(item) = self.pop() {
                return item;
            }
            let _ = tokio::time::timeout(RECHECK_INTERVAL, notified).await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// Remove every item, most recent first.
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.lock();
        let mut drained: Vec<T> = inner.items.drain(..).collect();
        drained.reverse();
        drained
    }
}

impl<T> Default for Stack<T> {
    fn default() -> Self {
        Self::with_capacity(256)
    }
}

/// Pending job counts per stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StackDepths {
    pub download: usize,
    pub render: usize,
    pub save: usize,
}

impl StackDepths {
    pub fn get(&self, stage: Stage) -> usize {
        match stage {
            Stage::Download => self.download,
            Stage::Render => self.render,
            Stage::Save => self.save,
        }
    }
}

/// The input stacks of the three stages for one generation run.
#[derive(Clone)]
pub struct PipelineStacks {
    pub download: Arc<Stack<DownloadJob>>,
    pub render: Arc<Stack<RenderJob>>,
    pub save: Arc<Stack<SaveJob>>,
}

impl PipelineStacks {
    pub fn new(capacity: usize) -> Self {
        Self {
            download: Arc::new(Stack::with_capacity(capacity)),
            render: Arc::new(Stack::with_capacity(capacity)),
            save: Arc::new(Stack::with_capacity(capacity)),
        }
    }

    /// Push a job onto its stage's stack.
    pub fn route(&self, job: Job) {
        match job {
            Job::Download(job) => self.download.push(job),
            Job::Render(job) => self.render.push(job),
            Job::Save(job) => self.save.push(job),
        }
    }

    pub fn depth(&self, stage: Stage) -> usize {
        match stage {
            Stage::Download => self.download.len(),
            Stage::Render => self.render.len(),
            Stage::Save => self.save.len(),
        }
    }

    pub fn depths(&self) -> StackDepths {
        StackDepths {
            download: self.download.len(),
            render: self.render.len(),
            save: self.save.len(),
        }
    }

    /// Drop every pending job. Returns how many were dropped.
    pub fn drain_all(&self) -> usize {
        self.download.drain().len() + self.render.drain().len() + self.save.drain().len()
    }
}
