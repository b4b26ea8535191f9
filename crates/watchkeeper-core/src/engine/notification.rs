//! Notification decision engine
//!
//! `evaluate` is pure: it runs the filter chain for one trigger, resolves
//! escalations and contacts, and returns a plan. Only `commit` mutates the
//! checkable, and a plan can be committed once.

use serde::Serialize;
use thiserror::Error;

use crate::contracts::{NotificationDispatch, NotificationKind};
use crate::model::{
    Checkable, CheckableId, CheckableState, FlapTransition, NotifyOn, Timestamp,
};
use crate::registry::Registry;

/// Commit failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotificationError {
    /// The plan was evaluated for another checkable
    #[error("Plan for {plan} committed against {target}")]
    WrongCheckable { plan: String, target: String },

    /// The plan was already committed, or another plan was committed first
    #[error("Stale notification plan for {id}: expected notification id {expected}, found {actual}")]
    StalePlan {
        id: String,
        expected: u64,
        actual: u64,
    },
}

/// What asks for a notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTrigger {
    Problem,
    Recovery,
    Acknowledgement { author: String, comment: String },
    Flapping(FlapTransition),
    Custom {
        author: String,
        comment: String,
        /// Bypass every filter
        forced: bool,
        /// Advance the notification number
        increment: bool,
    },
}

impl NotificationTrigger {
    pub fn kind(&self) -> NotificationKind {
        match self {
            NotificationTrigger::Problem => NotificationKind::Problem,
            NotificationTrigger::Recovery => NotificationKind::Recovery,
            NotificationTrigger::Acknowledgement { .. } => NotificationKind::Acknowledgement,
            NotificationTrigger::Flapping(transition) => (*transition).into(),
            NotificationTrigger::Custom { .. } => NotificationKind::Custom,
        }
    }

    fn is_forced(&self) -> bool {
        matches!(self, NotificationTrigger::Custom { forced: true, .. })
    }

    fn author_comment(&self) -> (Option<String>, Option<String>) {
        match self {
            NotificationTrigger::Acknowledgement { author, comment }
            | NotificationTrigger::Custom {
                author, comment, ..
            } => (Some(author.clone()), Some(comment.clone())),
            _ => (None, None),
        }
    }
}

/// Why an evaluation produced no plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    ProcessDisabled,
    Disabled,
    InDowntime,
    Acknowledged,
    SoftState,
    OutsidePeriod,
    NotifyOnFiltered,
    /// Trigger does not match the current state
    StateMismatch,
    RecoveryDelay,
    /// Recovery of an episode that never notified a problem
    NothingToRecover,
    NotificationInterval,
}

impl SuppressReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressReason::ProcessDisabled => "process_disabled",
            SuppressReason::Disabled => "disabled",
            SuppressReason::InDowntime => "in_downtime",
            SuppressReason::Acknowledged => "acknowledged",
            SuppressReason::SoftState => "soft_state",
            SuppressReason::OutsidePeriod => "outside_period",
            SuppressReason::NotifyOnFiltered => "notify_on_filtered",
            SuppressReason::StateMismatch => "state_mismatch",
            SuppressReason::RecoveryDelay => "recovery_delay",
            SuppressReason::NothingToRecover => "nothing_to_recover",
            SuppressReason::NotificationInterval => "notification_interval",
        }
    }
}

/// A notification ready to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPlan {
    pub id: CheckableId,
    pub kind: NotificationKind,
    /// Notification number after commit
    pub number: u32,
    /// Id the commit consumes; doubles as the idempotency token
    pub notification_id: u64,
    pub state: CheckableState,
    pub contacts: Vec<String>,
    pub dispatches: Vec<NotificationDispatch>,
}

/// Outcome of an evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Notify(NotificationPlan),
    Suppressed(SuppressReason),
}

impl Decision {
    pub fn plan(&self) -> Option<&NotificationPlan> {
        match self {
            Decision::Notify(plan) => Some(plan),
            Decision::Suppressed(_) => None,
        }
    }
}

/// Decides who to notify and when
#[derive(Debug, Clone)]
pub struct NotificationEngine {
    enabled: bool,
}

impl Default for NotificationEngine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NotificationEngine {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Process-level switch
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Run the filter chain and resolve recipients; never mutates
    pub fn evaluate(
        &self,
        checkable: &Checkable,
        registry: &Registry,
        trigger: &NotificationTrigger,
        now: Timestamp,
    ) -> Decision {
        let kind = trigger.kind();
        if !trigger.is_forced() {
            if let Err(reason) = self.check_filters(checkable, registry, trigger, now) {
                tracing::debug!(
                    checkable = %checkable.id,
                    kind = %kind,
                    reason = reason.as_str(),
                    "Notification suppressed"
                );
                return Decision::Suppressed(reason);
            }
        }

        let current = checkable.current_notification_number;
        let (number, escalation_number) = match trigger {
            NotificationTrigger::Recovery => (current + 1, current),
            NotificationTrigger::Custom {
                increment: false, ..
            } => (current, current),
            _ => (current + 1, current + 1),
        };

        let contacts = self.resolve_contacts(checkable, registry, kind, escalation_number, now);
        let (author, comment) = trigger.author_comment();
        let notification_id = checkable.next_notification_id;
        let dispatches = contacts
            .iter()
            .map(|contact| NotificationDispatch {
                id: checkable.id.clone(),
                kind,
                contact: contact.clone(),
                timestamp: now,
                notification_number: number,
                notification_id,
                state: checkable.current_state,
                output: checkable.plugin_output.clone(),
                author: author.clone(),
                comment: comment.clone(),
            })
            .collect();

        Decision::Notify(NotificationPlan {
            id: checkable.id.clone(),
            kind,
            number,
            notification_id,
            state: checkable.current_state,
            contacts,
            dispatches,
        })
    }

    /// Apply a plan; returns its dispatches
    pub fn commit(
        &self,
        checkable: &mut Checkable,
        plan: &NotificationPlan,
        now: Timestamp,
    ) -> Result<Vec<NotificationDispatch>, NotificationError> {
        if checkable.id != plan.id {
            return Err(NotificationError::WrongCheckable {
                plan: plan.id.to_string(),
                target: checkable.id.to_string(),
            });
        }
        if checkable.next_notification_id != plan.notification_id {
            return Err(NotificationError::StalePlan {
                id: plan.id.to_string(),
                expected: plan.notification_id,
                actual: checkable.next_notification_id,
            });
        }

        checkable.next_notification_id += 1;
        checkable.current_notification_number = plan.number;
        checkable.last_notification = Some(now);
        match plan.kind {
            NotificationKind::Problem => {
                checkable.notified_states.insert(plan.state.notify_bit());
                checkable.last_notified_state = Some(plan.state);
            }
            NotificationKind::Recovery => {
                checkable.notified_states = NotifyOn::NONE;
                checkable.last_notified_state = Some(plan.state);
            }
            _ => {}
        }

        tracing::info!(
            checkable = %plan.id,
            kind = %plan.kind,
            number = plan.number,
            contacts = plan.contacts.len(),
            "Notification committed"
        );
        Ok(plan.dispatches.clone())
    }

    fn check_filters(
        &self,
        checkable: &Checkable,
        registry: &Registry,
        trigger: &NotificationTrigger,
        now: Timestamp,
    ) -> Result<(), SuppressReason> {
        let kind = trigger.kind();
        let state = checkable.current_state;

        if !self.enabled {
            return Err(SuppressReason::ProcessDisabled);
        }
        if !checkable.notifications_enabled {
            return Err(SuppressReason::Disabled);
        }

        let state_matches = match kind {
            NotificationKind::Problem | NotificationKind::Acknowledgement => !state.is_ok(),
            NotificationKind::Recovery => state.is_ok(),
            _ => true,
        };
        if !state_matches {
            return Err(SuppressReason::StateMismatch);
        }

        if checkable.in_downtime {
            return Err(SuppressReason::InDowntime);
        }
        if checkable.is_acknowledged() && (kind == NotificationKind::Problem || kind.is_flapping()) {
            return Err(SuppressReason::Acknowledged);
        }

        let needs_hard = matches!(
            kind,
            NotificationKind::Problem | NotificationKind::Recovery | NotificationKind::Acknowledgement
        );
        if needs_hard && !checkable.is_hard() {
            return Err(SuppressReason::SoftState);
        }

        if let Some(period) = &checkable.notification_period {
            let inside = registry
                .timeperiod(period)
                .map(|period| period.contains(now))
                .unwrap_or(true);
            if !inside {
                return Err(SuppressReason::OutsidePeriod);
            }
        }

        let bit = notify_bit(kind, state);
        if !bit.is_empty() && !checkable.notify_on.contains(bit) {
            return Err(SuppressReason::NotifyOnFiltered);
        }

        match kind {
            NotificationKind::Recovery => {
                if checkable.notified_states.is_empty() {
                    return Err(SuppressReason::NothingToRecover);
                }
                if now - checkable.last_hard_state_change < checkable.recovery_notification_delay {
                    return Err(SuppressReason::RecoveryDelay);
                }
            }
            NotificationKind::Problem => {
                let repeat = checkable.last_notified_state == Some(state);
                if repeat {
                    let too_soon = match checkable.last_notification {
                        Some(last) => now - last < checkable.notification_interval,
                        None => false,
                    };
                    if checkable.notification_interval <= 0 || too_soon {
                        return Err(SuppressReason::NotificationInterval);
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Base contacts followed by matching escalation contacts, deduplicated
    fn resolve_contacts(
        &self,
        checkable: &Checkable,
        registry: &Registry,
        kind: NotificationKind,
        number: u32,
        now: Timestamp,
    ) -> Vec<String> {
        let in_period = |period: &Option<String>| {
            period
                .as_ref()
                .and_then(|name| registry.timeperiod(name))
                .map(|period| period.contains(now))
                .unwrap_or(true)
        };

        let mut candidates: Vec<&String> = checkable.contacts.iter().collect();
        for escalation in &checkable.escalations {
            if escalation.covers(number) && in_period(&escalation.escalation_period) {
                candidates.extend(escalation.contacts.iter());
            }
        }

        let bit = notify_bit(kind, checkable.current_state);
        let mut resolved: Vec<String> = Vec::new();
        for name in candidates {
            if resolved.iter().any(|existing| existing == name) {
                continue;
            }
            let Some(contact) = registry.contact(name) else {
                tracing::debug!(checkable = %checkable.id, contact = %name, "Skipping unknown contact");
                continue;
            };
            if !contact.accepts(checkable.kind(), bit) || !in_period(&contact.notification_period) {
                continue;
            }
            resolved.push(name.clone());
        }

        if resolved.is_empty() {
            tracing::debug!(checkable = %checkable.id, kind = %kind, number, "No contacts resolved");
        }
        resolved
    }
}

/// Notify-on bit a notification of `kind` is filtered on (empty = none)
fn notify_bit(kind: NotificationKind, state: CheckableState) -> NotifyOn {
    match kind {
        NotificationKind::Problem => state.notify_bit(),
        NotificationKind::Recovery => NotifyOn::RECOVERY,
        NotificationKind::FlappingStart | NotificationKind::FlappingStop => NotifyOn::FLAPPING,
        NotificationKind::Acknowledgement | NotificationKind::Custom => NotifyOn::NONE,
    }
}
