//! Check request/result contracts exchanged with execution delegates

use serde::{Deserialize, Serialize};

use crate::model::{CheckableId, Generation, Timestamp};

/// Request handed to an execution delegate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub id: CheckableId,
    pub generation: Generation,
    /// Fully rendered command line
    pub command: String,
    /// Timeout in seconds
    pub timeout_secs: u64,
    pub scheduled_at: Timestamp,
}

/// Where a result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Reply to a scheduled check request
    Active,
    /// Externally submitted result
    Passive,
    /// Synthesized by the scheduler when the delegate did not answer in time
    Timeout,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSource::Active => "active",
            ResultSource::Passive => "passive",
            ResultSource::Timeout => "timeout",
        }
    }
}

/// Raw outcome of a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: CheckableId,
    /// Generation of the request this answers (`None` for passive results)
    pub generation: Option<Generation>,
    pub return_code: i32,
    pub output: String,
    pub duration_ms: u64,
    pub source: ResultSource,
}

impl CheckResult {
    /// Result answering an active check request
    pub fn active(
        id: CheckableId,
        generation: Generation,
        return_code: i32,
        output: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            id,
            generation: Some(generation),
            return_code,
            output: output.into(),
            duration_ms,
            source: ResultSource::Active,
        }
    }

    /// Externally submitted result
    pub fn passive(id: CheckableId, return_code: i32, output: impl Into<String>) -> Self {
        Self {
            id,
            generation: None,
            return_code,
            output: output.into(),
            duration_ms: 0,
            source: ResultSource::Passive,
        }
    }

    /// Terminal result for a request the delegate never answered
    pub fn timed_out(
        id: CheckableId,
        generation: Generation,
        return_code: i32,
        timeout_secs: u64,
    ) -> Self {
        Self {
            id,
            generation: Some(generation),
            return_code,
            output: format!("(Check timed out after {} seconds)", timeout_secs),
            duration_ms: timeout_secs * 1000,
            source: ResultSource::Timeout,
        }
    }

    pub fn is_passive(&self) -> bool {
        self.source == ResultSource::Passive
    }
}
