//! Committed engine events
//!
//! Everything the engine broadcasts to listeners once a mutation is final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::model::{CheckableId, CheckableState, FlapTransition, StateType, Timestamp};

/// Classification outcome that changed a checkable's status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeEvent {
    pub id: CheckableId,
    pub timestamp: Timestamp,
    pub previous_state: CheckableState,
    pub previous_state_type: StateType,
    pub state: CheckableState,
    pub state_type: StateType,
    /// Attempt number that produced this state (before any reset)
    pub attempt: u32,
    pub max_attempts: u32,
    /// A hard state was entered or changed
    pub hard_change: bool,
    pub passive: bool,
    pub output: String,
}

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Problem,
    Recovery,
    Acknowledgement,
    FlappingStart,
    FlappingStop,
    Custom,
}

impl NotificationKind {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Problem => "problem",
            NotificationKind::Recovery => "recovery",
            NotificationKind::Acknowledgement => "acknowledgement",
            NotificationKind::FlappingStart => "flapping_start",
            NotificationKind::FlappingStop => "flapping_stop",
            NotificationKind::Custom => "custom",
        }
    }

    pub fn is_flapping(&self) -> bool {
        matches!(self, NotificationKind::FlappingStart | NotificationKind::FlappingStop)
    }
}

impl From<FlapTransition> for NotificationKind {
    fn from(transition: FlapTransition) -> Self {
        match transition {
            FlapTransition::Started => NotificationKind::FlappingStart,
            FlapTransition::Stopped => NotificationKind::FlappingStop,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationKind::Problem => "PROBLEM",
            NotificationKind::Recovery => "RECOVERY",
            NotificationKind::Acknowledgement => "ACKNOWLEDGEMENT",
            NotificationKind::FlappingStart => "FLAPPINGSTART",
            NotificationKind::FlappingStop => "FLAPPINGSTOP",
            NotificationKind::Custom => "CUSTOM",
        };
        f.write_str(name)
    }
}

/// One notification addressed to one contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDispatch {
    pub id: CheckableId,
    pub kind: NotificationKind,
    pub contact: String,
    pub timestamp: Timestamp,
    /// Notification number within the current problem episode
    pub notification_number: u32,
    /// Monotonic per-checkable notification id
    pub notification_id: u64,
    pub state: CheckableState,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Payload of a broadcast event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StateChange(StateChangeEvent),
    Notification(NotificationDispatch),
    Flapping {
        id: CheckableId,
        transition: FlapTransition,
        percent_state_change: f64,
    },
    Downtime {
        id: CheckableId,
        active: bool,
    },
}

impl EventPayload {
    pub fn checkable(&self) -> &CheckableId {
        match self {
            EventPayload::StateChange(event) => &event.id,
            EventPayload::Notification(dispatch) => &dispatch.id,
            EventPayload::Flapping { id, .. } | EventPayload::Downtime { id, .. } => id,
        }
    }
}

/// Envelope delivered to broadcast listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub event_id: Uuid,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EngineEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            emitted_at: Utc::now(),
            payload,
        }
    }
}
