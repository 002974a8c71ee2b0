//! Bounded command queue drained by the main loop.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::config::GenerationConfig;
use super::error::fatal;
use super::types::{CompletedArtifact, Stage};

/// Everything the main loop can be asked to do.
#[derive(Debug, Clone)]
pub enum Command {
    StartGeneration(Box<GenerationConfig>),
    StopGeneration,
    AddWorker(Stage),
    RemoveWorker(Stage),
    CollectStats,
    /// Ingest the next batch of commits for the given run.
    IngestContinuation { run_id: u64 },
    ArtifactSaved(CompletedArtifact),
    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartGeneration(_) => "start_generation",
            Command::StopGeneration => "stop_generation",
            Command::AddWorker(_) => "add_worker",
            Command::RemoveWorker(_) => "remove_worker",
            Command::CollectStats => "collect_stats",
            Command::IngestContinuation { .. } => "ingest_continuation",
            Command::ArtifactSaved(_) => "artifact_saved",
            Command::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("mailbox is full")]
    Overflow,

    #[error("mailbox is closed")]
    Closed,
}

/// Sending half of the mailbox. Cheap to clone, usable from any task or thread.
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::Sender<Command>,
}

/// Receiving half, owned by the main loop.
#[derive(Debug)]
pub struct MailboxReceiver {
    receiver: mpsc::Receiver<Command>,
}

/// Create a mailbox holding at most `capacity` pending commands.
pub fn mailbox(capacity: usize) -> (Mailbox, MailboxReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (Mailbox { sender }, MailboxReceiver { receiver })
}

impl Mailbox {
    /// Enqueue a command without blocking.
    pub fn try_post(&self, command: Command) -> Result<(), MailboxError> {
        self.sender.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Overflow,
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }

    /// Enqueue `count` copies of `command`, or none of them.
    ///
    /// Slots are reserved up front, so a request larger than the free space
    /// fails with [`MailboxError::Overflow`] and leaves the mailbox untouched.
    pub fn try_post_many(&self, command: Command, count: usize) -> Result<(), MailboxError> {
        if count == 0 {
            return Ok(());
        }
        let permits = self.sender.try_reserve_many(count).map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => MailboxError::Overflow,
            mpsc::error::TrySendError::Closed(()) => MailboxError::Closed,
        })?;
        for permit in permits {
            permit.send(command.clone());
        }
        Ok(())
    }

    /// Enqueue a command. A full mailbox aborts the process.
    ///
    /// Returns [`MailboxError::Closed`] once the main loop has exited.
    pub fn post(&self, command: Command) -> Result<(), MailboxError> {
        let name = command.name();
        match self.try_post(command) {
            Err(MailboxError::Overflow) => fatal(&format!(
                "mailbox overflow while posting {} (capacity {})",
                name,
                self.sender.max_capacity()
            )),
            Err(MailboxError::Closed) => {
                debug!(command = name, "Mailbox closed, command dropped");
                Err(MailboxError::Closed)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Commands currently waiting.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl MailboxReceiver {
    /// Wait for the next command. `None` once every sender is gone.
    pub async fn drain_one(&mut self) -> Option<Command> {
        self.receiver.recv().await
    }
}
