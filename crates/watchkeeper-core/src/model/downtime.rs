//! Scheduled downtime windows

use serde::{Deserialize, Serialize};

use super::Timestamp;

/// Fixed downtime window `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downtime {
    pub id: u64,
    pub start: Timestamp,
    pub end: Timestamp,
    pub author: String,
    pub comment: String,
}

impl Downtime {
    pub fn is_active(&self, now: Timestamp) -> bool {
        now >= self.start && now < self.end
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.end
    }
}

/// Acknowledgement of a problem by an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub author: String,
    pub comment: String,
    /// Sticky acknowledgements survive problem-to-problem changes
    pub sticky: bool,
    pub entry_time: Timestamp,
}
