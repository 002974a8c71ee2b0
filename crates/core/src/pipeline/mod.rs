//! Job pipeline generating timelapse artifacts from a commit log.
//!
//! A generation run moves every commit through three stages:
//! - **Download**: fetch the raw canvas and placer snapshots
//! - **Render**: encode canvas, date, top placers and control images
//! - **Save**: write each artifact once and record it
//!
//! Stages hand jobs to each other through LIFO [`Stack`]s. A single main
//! loop owns the run state and receives every mutation through the
//! [`Mailbox`]; callers drive it with a [`GeneratorHandle`].
//!
//! # Example
//!
//! ```ignore
//! use timelapse_core::pipeline::{Dependencies, Generator, PipelineConfig, Stage};
//!
//! let (handle, join) = Generator::spawn(PipelineConfig::default(), deps);
//! handle.start_generation(generation_config)?;
//! handle.add_workers(Stage::Render, 2)?;
//!
//! let mut events = handle.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

mod config;
mod error;
mod events;
mod ingest;
mod mailbox;
mod pool;
mod router;
mod runner;
mod stack;
mod stats;
mod types;
mod workers;

pub use config::{GenerationConfig, PipelineConfig};
pub use error::{PipelineError, StageError};
pub use events::{EventBus, PipelineEvent};
pub use ingest::{CommitEntry, CommitLogParser, IngestError, IngestProgress, Ingestor};
pub use mailbox::{mailbox, Command, Mailbox, MailboxError, MailboxReceiver};
pub use pool::{
    PoolManager, PoolReader, PoolReaders, WorkerInfo, WorkerPool, WorkerSpawner, WorkerState,
    WorkerStatus,
};
pub use router::{designate_jobs, Designation};
pub use runner::{Dependencies, Generator, GeneratorHandle};
pub use stack::{PipelineStacks, Stack, StackDepths};
pub use stats::{RunStatistics, StatsSnapshot};
pub use types::{
    ArtifactKind, CommitRecord, CompletedArtifact, DownloadJob, DownloadKind, Job, RenderJob,
    RenderPayload, SaveJob, Stage, StageJob, WorkResult,
};
pub use workers::{
    render_job, run_worker, Downloader, RenderStage, Saver, StageHandler, UserCache,
    WorkerContext,
};
