//! Streaming reader of the commit log.
//!
//! The log is a sequence of records:
//!
//! ```text
//! Commit: <hash>
//! Author: <name>      (optional)
//! Date: <unix seconds>
//! ```
//!
//! Records are registered and designated in batches so the main loop can
//! interleave other commands between them. Lines are read as raw bytes;
//! invalid UTF-8 is replaced rather than rejected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::metrics::{COMMITS_INGESTED, JOBS_DESIGNATED};
use crate::persistence::Persistence;

use super::config::GenerationConfig;
use super::error::PipelineError;
use super::router::designate_jobs;
use super::stack::PipelineStacks;
use super::types::CommitRecord;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Failed to open commit log {path}: {message}")]
    Open { path: String, message: String },

    #[error("Failed to read commit log: {0}")]
    Read(String),

    #[error("Malformed commit log line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// One complete commit log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub hash: String,
    pub author: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug)]
struct PartialEntry {
    hash: String,
    author: Option<String>,
}

/// Line-level state machine assembling [`CommitEntry`] records.
#[derive(Debug, Default)]
pub struct CommitLogParser {
    pending: Option<PartialEntry>,
}

impl CommitLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns a record when its `Date:` line completes it.
    ///
    /// Out-of-order property lines are skipped with a warning; lines that
    /// are not properties at all are [`IngestError::Malformed`].
    pub fn feed(
        &mut self,
        line_number: usize,
        line: &str,
    ) -> Result<Option<CommitEntry>, IngestError> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(IngestError::Malformed {
                line: line_number,
                message: format!("expected `<property>: <value>`, got {:?}", line),
            });
        };
        let value = value.trim();

        match key.trim() {
            "Commit" => {
                if value.is_empty() {
                    return Err(IngestError::Malformed {
                        line: line_number,
                        message: "empty commit hash".to_string(),
                    });
                }
                if let Some(previous) = self.pending.take() {
                    warn!(
                        line = line_number,
                        commit = %previous.hash,
                        "Commit record without a date, discarding"
                    );
                }
                self.pending = Some(PartialEntry {
                    hash: value.to_string(),
                    author: None,
                });
                Ok(None)
            }
            "Author" => {
                match self.pending.as_mut() {
                    Some(entry) => entry.author = Some(value.to_string()),
                    None => warn!(line = line_number, "Author line outside a record, skipping"),
                }
                Ok(None)
            }
            "Date" => {
                let Some(entry) = self.pending.take() else {
                    warn!(line = line_number, "Date line outside a record, skipping");
                    return Ok(None);
                };
                let seconds: i64 = value.parse().map_err(|_| IngestError::Malformed {
                    line: line_number,
                    message: format!("invalid date {:?}", value),
                })?;
                let date = DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
                    IngestError::Malformed {
                        line: line_number,
                        message: format!("date {} out of range", seconds),
                    }
                })?;
                Ok(Some(CommitEntry {
                    hash: entry.hash,
                    author: entry.author,
                    date,
                }))
            }
            other => Err(IngestError::Malformed {
                line: line_number,
                message: format!("unknown property {:?}", other),
            }),
        }
    }
}

/// Outcome of one [`Ingestor::ingest_batch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress {
    /// The batch was full; more of the log remains.
    MoreAvailable { ingested: u64 },
    /// The log is exhausted.
    Finished { ingested: u64, total: u64 },
}

/// Reads commit records and feeds them to the download and render stacks.
pub struct Ingestor<R> {
    reader: R,
    buffer: Vec<u8>,
    parser: CommitLogParser,
    instance_id: i64,
    config: Arc<GenerationConfig>,
    batch_size: usize,
    line_number: usize,
    total: u64,
    filtered: u64,
    failed: u64,
}

impl Ingestor<BufReader<File>> {
    /// Open the run's commit log.
    pub async fn open(
        instance_id: i64,
        config: Arc<GenerationConfig>,
        batch_size: usize,
    ) -> Result<Self, IngestError> {
        let file = File::open(&config.commit_log)
            .await
            .map_err(|e| IngestError::Open {
                path: config.commit_log.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(Self::from_reader(
            BufReader::new(file),
            instance_id,
            config,
            batch_size,
        ))
    }
}

impl<R> Ingestor<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn from_reader(
        reader: R,
        instance_id: i64,
        config: Arc<GenerationConfig>,
        batch_size: usize,
    ) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            parser: CommitLogParser::new(),
            instance_id,
            config,
            batch_size: batch_size.max(1),
            line_number: 0,
            total: 0,
            filtered: 0,
            failed: 0,
        }
    }

    /// Commits registered so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Records dropped because registering or designating them failed.
    pub fn failed(&self) -> u64 {
        self.failed
    }

    async fn next_line(&mut self) -> Result<Option<String>, IngestError> {
        self.buffer.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.buffer)
            .await
            .map_err(|e| IngestError::Read(e.to_string()))?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }

    /// Register and designate up to one batch of records.
    ///
    /// A record whose persistence calls fail is logged and dropped; only
    /// failing to read the log itself is an error.
    pub async fn ingest_batch(
        &mut self,
        persistence: &dyn Persistence,
        stacks: &PipelineStacks,
    ) -> Result<IngestProgress, PipelineError> {
        let mut ingested = 0u64;
        let mut seen = 0usize;

        while seen < self.batch_size {
            let Some(line) = self.next_line().await? else {
                return Ok(self.finish(ingested));
            };
            self.line_number += 1;

            let entry = match self.parser.feed(self.line_number, &line) {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            };
            seen += 1;

            if !self.config.author_allowed(entry.author.as_deref()) {
                debug!(
                    commit = %entry.hash,
                    author = ?entry.author,
                    "Skipping commit by filtered author"
                );
                self.filtered += 1;
                continue;
            }

            let hash = entry.hash.clone();
            match self.ingest_entry(entry, persistence, stacks) {
                Ok(()) => ingested += 1,
                Err(e) => {
                    error!(commit = %hash, line = self.line_number, "Dropping commit: {}", e);
                    self.failed += 1;
                }
            }
        }

        Ok(IngestProgress::MoreAvailable { ingested })
    }

    fn ingest_entry(
        &mut self,
        entry: CommitEntry,
        persistence: &dyn Persistence,
        stacks: &PipelineStacks,
    ) -> Result<(), PipelineError> {
        let commit_id = persistence.register_commit(self.instance_id, &entry.hash, entry.date)?;
        let commit = Arc::new(CommitRecord::new(commit_id, entry.hash, entry.date));
        let designation = designate_jobs(&commit, persistence)?;

        JOBS_DESIGNATED
            .with_label_values(&["download"])
            .inc_by(designation.downloads.len() as u64);
        JOBS_DESIGNATED
            .with_label_values(&["render"])
            .inc_by(designation.renders.len() as u64);
        COMMITS_INGESTED.inc();
        self.total += 1;

        if designation.is_empty() {
            debug!(commit = %commit.commit_hash, "Commit fully generated");
        } else {
            debug!(
                commit = %commit.commit_hash,
                commit_id,
                jobs = designation.len(),
                "Commit designated"
            );
            designation.enqueue(stacks);
        }
        Ok(())
    }

    fn finish(&self, ingested: u64) -> IngestProgress {
        if self.total == 0 && self.filtered == 0 && self.failed == 0 {
            warn!(path = %self.config.commit_log.display(), "Commit log contains no commits");
        } else {
            info!(
                commits = self.total,
                filtered = self.filtered,
                failed = self.failed,
                lines = self.line_number,
                "Commit log ingested"
            );
        }
        IngestProgress::Finished {
            ingested,
            total: self.total,
        }
    }
}
