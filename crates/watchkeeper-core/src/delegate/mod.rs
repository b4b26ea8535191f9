//! Execution delegates
//!
//! How a check command is physically run is outside the engine: a delegate
//! accepts [`CheckRequest`]s without blocking and later reports a
//! [`CheckResult`] through a [`ResultSink`]. Requests it never answers are
//! timed out by the scheduler.

mod connector;
mod process;
mod protocol;

pub use connector::ConnectorDelegate;
pub use process::{run_shell, ProcessDelegate, ShellOutput};
pub use protocol::*;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::contracts::{CheckRequest, CheckResult};
use crate::engine::{EngineMessage, NotificationJob};

/// Delegate failures
#[derive(Error, Debug)]
pub enum DelegateError {
    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Delegate unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Result sink closed")]
    SinkClosed,
}

impl DelegateError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        DelegateError::Unavailable(msg.into())
    }
}

/// Runs checks and notification commands
#[cfg_attr(test, mockall::automock)]
pub trait ExecutionDelegate: Send + Sync {
    /// Start a check; must return without waiting for it
    fn submit(&self, request: CheckRequest) -> Result<(), DelegateError>;

    /// Start a rendered notification command
    fn deliver(&self, job: NotificationJob) -> Result<(), DelegateError>;
}

/// Channel back into the engine task
#[derive(Debug, Clone)]
pub struct ResultSink {
    sender: mpsc::Sender<EngineMessage>,
}

impl ResultSink {
    pub fn new(sender: mpsc::Sender<EngineMessage>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, result: CheckResult) -> Result<(), DelegateError> {
        self.sender
            .send(EngineMessage::Result(result))
            .await
            .map_err(|_| DelegateError::SinkClosed)
    }
}

fn current_runtime() -> Result<tokio::runtime::Handle, DelegateError> {
    tokio::runtime::Handle::try_current().map_err(|e| DelegateError::unavailable(e.to_string()))
}
