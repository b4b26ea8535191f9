//! Event broadcaster
//!
//! Fans committed events out to zero or more listeners. A failing listener
//! is logged and skipped; the others still receive the event.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::contracts::EngineEvent;

/// Listener failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener '{listener}' failed: {message}")]
pub struct ListenerError {
    pub listener: String,
    pub message: String,
}

impl ListenerError {
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

/// Receives committed engine events
#[cfg_attr(test, mockall::automock)]
pub trait EventListener: Send + Sync {
    fn name(&self) -> String;

    fn on_event(&self, event: &EngineEvent) -> Result<(), ListenerError>;
}

/// Forwards events into an unbounded channel for async consumers
#[derive(Debug, Clone)]
pub struct ChannelListener {
    name: String,
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelListener {
    pub fn new(name: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

impl EventListener for ChannelListener {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn on_event(&self, event: &EngineEvent) -> Result<(), ListenerError> {
        self.sender
            .send(event.clone())
            .map_err(|_| ListenerError::new(&self.name, "receiver dropped"))
    }
}

/// Logs every event at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogListener;

impl EventListener for LogListener {
    fn name(&self) -> String {
        "log".to_string()
    }

    fn on_event(&self, event: &EngineEvent) -> Result<(), ListenerError> {
        tracing::debug!(
            event_id = %event.event_id,
            checkable = %event.payload.checkable(),
            "Engine event"
        );
        Ok(())
    }
}

/// Delivery summary of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

/// Ordered set of listeners
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    listeners: Vec<Arc<dyn EventListener>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: Arc<dyn EventListener>) {
        tracing::debug!(listener = %listener.name(), "Listener subscribed");
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver one event to every listener
    pub fn notify(&self, event: &EngineEvent) -> Delivery {
        let mut delivery = Delivery::default();
        for listener in &self.listeners {
            match listener.on_event(event) {
                Ok(()) => delivery.delivered += 1,
                Err(err) => {
                    delivery.failed += 1;
                    tracing::warn!(
                        error = %err,
                        event_id = %event.event_id,
                        "Event listener failed"
                    );
                }
            }
        }
        delivery
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("EventBroadcaster")
            .field("listeners", &names)
            .finish()
    }
}
