//! Soft/hard state machine
//!
//! Classifies one result for one checkable. A non-OK result accumulates soft
//! attempts until `max_attempts` is reached; an OK/UP result is always hard.

use crate::contracts::{CheckResult, StateChangeEvent};
use crate::model::{Checkable, CheckableId, CheckableState, HostState, NotifyOn, StateType, Timestamp};
use crate::registry::Registry;

/// State machine behaviour switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateMachineOptions {
    /// Passive non-OK results become hard immediately
    pub passive_results_always_hard: bool,
}

/// A result already mapped to the checkable's state domain
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedResult {
    pub state: CheckableState,
    pub output: String,
    pub passive: bool,
}

impl ClassifiedResult {
    pub fn new(state: CheckableState, output: impl Into<String>, passive: bool) -> Self {
        Self {
            state,
            output: output.into(),
            passive,
        }
    }
}

/// Map a raw result to a state, taking parent hosts into account
///
/// A host that is not UP while none of its parents is UP is UNREACHABLE
/// rather than DOWN.
pub fn classify(registry: &Registry, result: &CheckResult) -> Option<ClassifiedResult> {
    let checkable = registry.checkable(&result.id)?;
    let mut state = checkable.classify(result.return_code);

    if let (CheckableId::Host(name), CheckableState::Host(HostState::Down)) = (&result.id, state) {
        let parents = registry.host(name).map(|host| host.parents.as_slice()).unwrap_or(&[]);
        let any_parent_up = parents.iter().any(|parent| {
            registry
                .host(parent)
                .map(|host| host.checkable.current_state.is_ok())
                .unwrap_or(false)
        });
        if !parents.is_empty() && !any_parent_up {
            state = CheckableState::Host(HostState::Unreachable);
        }
    }

    Some(ClassifiedResult::new(
        state,
        result.output.clone(),
        result.is_passive(),
    ))
}

/// Applies classified results to checkables
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    options: StateMachineOptions,
}

impl StateMachine {
    pub fn new(options: StateMachineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> StateMachineOptions {
        self.options
    }

    /// Apply a result; returns an event when the state type changed or a hard
    /// state was entered
    pub fn apply_result(
        &self,
        checkable: &mut Checkable,
        result: &ClassifiedResult,
        now: Timestamp,
    ) -> Option<StateChangeEvent> {
        checkable.last_check = Some(now);
        checkable.has_been_checked = true;
        checkable.plugin_output = result.output.clone();

        let new_state = result.state;
        if new_state == checkable.current_state && checkable.is_hard() {
            return None;
        }

        let previous_state = checkable.current_state;
        let previous_type = checkable.state_type;
        checkable.last_state = previous_state;

        let attempt;
        let entered_hard;
        if new_state.is_ok() {
            attempt = checkable.current_attempt;
            self.enter_hard(checkable, new_state, now);
            entered_hard = true;
        } else if checkable.is_hard() && !previous_state.is_ok() {
            // Problem to a different problem: already confirmed.
            attempt = checkable.max_attempts;
            self.enter_hard(checkable, new_state, now);
            entered_hard = true;
        } else {
            attempt = if checkable.is_hard() {
                1
            } else {
                checkable.current_attempt + 1
            };
            let forced = result.passive && self.options.passive_results_always_hard;
            if attempt >= checkable.max_attempts || forced {
                self.enter_hard(checkable, new_state, now);
                entered_hard = true;
            } else {
                checkable.current_attempt = attempt;
                checkable.state_type = StateType::Soft;
                checkable.current_state = new_state;
                entered_hard = false;
            }
        }

        if checkable.current_state != previous_state {
            checkable.last_state_change = now;
        }

        if !entered_hard && checkable.state_type == previous_type {
            tracing::debug!(
                checkable = %checkable.id,
                state = %new_state,
                attempt = checkable.current_attempt,
                "Soft state update"
            );
            return None;
        }

        Some(StateChangeEvent {
            id: checkable.id.clone(),
            timestamp: now,
            previous_state,
            previous_state_type: previous_type,
            state: checkable.current_state,
            state_type: checkable.state_type,
            attempt,
            max_attempts: checkable.max_attempts,
            hard_change: entered_hard,
            passive: result.passive,
            output: result.output.clone(),
        })
    }

    fn enter_hard(&self, checkable: &mut Checkable, state: CheckableState, now: Timestamp) {
        if !state.is_ok() && checkable.last_hard_state.is_ok() {
            // New problem episode.
            checkable.current_notification_number = 0;
            checkable.notified_states = NotifyOn::NONE;
            checkable.last_notified_state = None;
        }

        if let Some(ack) = &checkable.acknowledgement {
            if state.is_ok() || !ack.sticky {
                checkable.acknowledgement = None;
            }
        }

        checkable.current_state = state;
        checkable.state_type = StateType::Hard;
        checkable.current_attempt = 1;
        checkable.last_hard_state = state;
        checkable.last_hard_state_change = now;
    }
}
