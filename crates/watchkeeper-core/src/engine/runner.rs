//! Async engine runner
//!
//! One tokio task owns the [`EngineContext`] and interleaves a tick interval
//! with an mpsc channel of messages, so a single mutation is in flight at
//! any time. Delegates report results through the same channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use super::{CommandReport, EngineContext, EngineSnapshot};
use crate::clock::Clock;
use crate::commands::CommandError;
use crate::contracts::{CheckResult, NotificationDispatch};
use crate::delegate::{ExecutionDelegate, ResultSink};
use crate::error::EngineError;
use crate::model::Timestamp;
use crate::registry::Registry;
use crate::Result;

/// Channel capacity of the engine inbox
pub const INBOX_CAPACITY: usize = 1024;

/// Messages served by the engine task
#[derive(Debug)]
pub enum EngineMessage {
    Result(CheckResult),
    Command {
        line: String,
        reply: Option<oneshot::Sender<std::result::Result<CommandReport, CommandError>>>,
    },
    Reload {
        registry: Registry,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot(oneshot::Sender<EngineSnapshot>),
    Shutdown,
}

/// Cloneable sender side of the engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Sink for delegates reporting check results
    pub fn result_sink(&self) -> ResultSink {
        ResultSink::new(self.sender.clone())
    }

    pub async fn submit_result(&self, result: CheckResult) -> Result<()> {
        self.send(EngineMessage::Result(result)).await
    }

    /// Execute a command and wait for its report
    pub async fn command(&self, line: impl Into<String>) -> Result<CommandReport> {
        let (reply, response) = oneshot::channel();
        self.send(EngineMessage::Command {
            line: line.into(),
            reply: Some(reply),
        })
        .await?;
        let report = response
            .await
            .map_err(|_| EngineError::stopped("command reply dropped"))??;
        Ok(report)
    }

    /// Queue a command without waiting for its outcome
    pub async fn enqueue_command(&self, line: impl Into<String>) -> Result<()> {
        self.send(EngineMessage::Command {
            line: line.into(),
            reply: None,
        })
        .await
    }

    pub async fn reload(&self, registry: Registry) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(EngineMessage::Reload { registry, reply }).await?;
        response
            .await
            .map_err(|_| EngineError::stopped("reload reply dropped"))?
    }

    pub async fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(EngineMessage::Snapshot(reply)).await?;
        response
            .await
            .map_err(|_| EngineError::stopped("snapshot reply dropped"))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineMessage::Shutdown).await
    }

    async fn send(&self, message: EngineMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| EngineError::stopped("engine task is not running"))
    }
}

/// The engine task
///
/// Created before its delegate so the delegate can be handed the result
/// sink of the returned handle.
pub struct Engine {
    context: EngineContext,
    clock: Arc<dyn Clock>,
    inbox: mpsc::Receiver<EngineMessage>,
    tick_interval: Duration,
}

impl Engine {
    pub fn new(context: EngineContext, clock: Arc<dyn Clock>) -> (Self, EngineHandle) {
        let (sender, inbox) = mpsc::channel(INBOX_CAPACITY);
        let tick_interval = Duration::from_millis(context.config().tick_interval_ms.max(1));
        (
            Self {
                context,
                clock,
                inbox,
                tick_interval,
            },
            EngineHandle { sender },
        )
    }

    /// Serve ticks and messages until shutdown; returns the final context
    pub async fn run(mut self, delegate: Arc<dyn ExecutionDelegate>) -> EngineContext {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            tick_interval_ms = self.tick_interval.as_millis() as u64,
            "Engine started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(delegate.as_ref()),
                message = self.inbox.recv() => match message {
                    Some(EngineMessage::Shutdown) | None => break,
                    Some(message) => self.on_message(message, delegate.as_ref()),
                },
            }
        }

        tracing::info!("Engine stopped");
        self.context
    }

    fn on_tick(&mut self, delegate: &dyn ExecutionDelegate) {
        let now = self.clock.now();
        let outcome = self.context.tick(now);
        for request in outcome.requests {
            let id = request.id.clone();
            if let Err(err) = delegate.submit(request) {
                // The scheduler times the check out and synthesizes a result.
                tracing::warn!(checkable = %id, error = %err, "Check submission failed");
            }
        }
        self.deliver(delegate, &outcome.dispatches, now);
    }

    fn on_message(&mut self, message: EngineMessage, delegate: &dyn ExecutionDelegate) {
        let now = self.clock.now();
        match message {
            EngineMessage::Result(result) => {
                let outcome = self.context.handle_result(result, now);
                self.deliver(delegate, outcome.dispatches(), now);
            }
            EngineMessage::Command { line, reply } => {
                let outcome = self.context.handle_command(&line, now);
                if let Ok(report) = &outcome {
                    self.deliver(delegate, &report.dispatches, now);
                }
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            EngineMessage::Reload { registry, reply } => {
                let outcome = self.context.reload(registry, now);
                if let Err(err) = &outcome {
                    tracing::error!(error = %err, "Reload rejected, keeping current registry");
                }
                let _ = reply.send(outcome);
            }
            EngineMessage::Snapshot(reply) => {
                let _ = reply.send(self.context.snapshot());
            }
            EngineMessage::Shutdown => {}
        }
    }

    fn deliver(
        &self,
        delegate: &dyn ExecutionDelegate,
        dispatches: &[NotificationDispatch],
        now: Timestamp,
    ) {
        for job in self.context.notification_jobs(dispatches, now) {
            let contact = job.dispatch.contact.clone();
            if let Err(err) = delegate.deliver(job) {
                tracing::warn!(contact = %contact, error = %err, "Notification delivery failed");
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("context", &self.context)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}
