//! Monitoring engine
//!
//! The state machine, the check scheduler and the notification decision
//! engine, tied together by a single-writer [`EngineContext`] and driven by
//! the async [`Engine`] runner.

mod context;
mod notification;
mod runner;
mod scheduler;
mod state_machine;

pub use context::*;
pub use notification::*;
pub use runner::*;
pub use scheduler::*;
pub use state_machine::*;

use serde::Serialize;

use crate::config::EngineConfig;

/// Process-wide switches and counters owned by the engine context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessState {
    pub flap_detection_enabled: bool,
    pub low_flap_threshold: f64,
    pub high_flap_threshold: f64,
    next_downtime_id: u64,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self {
            flap_detection_enabled: true,
            low_flap_threshold: 20.0,
            high_flap_threshold: 30.0,
            next_downtime_id: 1,
        }
    }
}

impl ProcessState {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            flap_detection_enabled: config.enable_flap_detection,
            low_flap_threshold: config.low_flap_threshold,
            high_flap_threshold: config.high_flap_threshold,
            ..Self::default()
        }
    }

    /// Id the next scheduled downtime receives
    pub fn next_downtime_id(&self) -> u64 {
        self.next_downtime_id
    }

    pub fn allocate_downtime_id(&mut self) -> u64 {
        let id = self.next_downtime_id;
        self.next_downtime_id += 1;
        id
    }
}
