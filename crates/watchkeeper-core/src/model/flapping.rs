//! Flap detection over recent state history

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::CheckableState;

/// Number of results kept for flap detection
pub const FLAP_HISTORY_SIZE: usize = 21;

/// Flapping start/stop transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlapTransition {
    Started,
    Stopped,
}

/// Rolling window of recent states
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlapHistory {
    states: VecDeque<CheckableState>,
}

impl FlapHistory {
    pub fn record(&mut self, state: CheckableState) {
        if self.states.len() == FLAP_HISTORY_SIZE {
            self.states.pop_front();
        }
        self.states.push_back(state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Weighted percentage of state changes; recent changes weigh more (0.75 to 1.25)
    pub fn percent_state_change(&self) -> f64 {
        let samples = self.states.len();
        if samples < 2 {
            return 0.0;
        }

        let transitions = samples - 1;
        let mut weighted = 0.0;
        for (index, pair) in self.states.iter().zip(self.states.iter().skip(1)).enumerate() {
            if pair.0 != pair.1 {
                let position = if transitions > 1 {
                    index as f64 / (transitions - 1) as f64
                } else {
                    0.5
                };
                weighted += 0.75 + 0.5 * position;
            }
        }
        (weighted * 100.0 / transitions as f64).min(100.0)
    }

    /// Evaluate thresholds against the current flapping flag; needs a full window
    pub fn evaluate(&self, is_flapping: bool, low: f64, high: f64) -> Option<FlapTransition> {
        if self.states.len() < FLAP_HISTORY_SIZE {
            return None;
        }
        let percent = self.percent_state_change();
        if !is_flapping && percent >= high {
            Some(FlapTransition::Started)
        } else if is_flapping && percent < low {
            Some(FlapTransition::Stopped)
        } else {
            None
        }
    }
}
