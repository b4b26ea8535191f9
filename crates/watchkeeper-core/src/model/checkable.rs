//! The checkable capability shared by hosts and services

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{
    Acknowledgement, CheckableState, Downtime, Escalation, FlapHistory, HostState, NotifyOn,
    ServiceState, StateType, Timestamp,
};

/// Identifies a service by host name and description
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub host: String,
    pub description: String,
}

impl ServiceKey {
    pub fn new(host: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{};{}", self.host, self.description)
    }
}

/// Host or service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckableKind {
    Host,
    Service,
}

impl CheckableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckableKind::Host => "host",
            CheckableKind::Service => "service",
        }
    }
}

/// Registry identifier of a checkable
///
/// Hosts sort before services, which gives the scheduler a stable tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckableId {
    Host(String),
    Service(ServiceKey),
}

impl CheckableId {
    pub fn host(name: impl Into<String>) -> Self {
        CheckableId::Host(name.into())
    }

    pub fn service(host: impl Into<String>, description: impl Into<String>) -> Self {
        CheckableId::Service(ServiceKey::new(host, description))
    }

    pub fn kind(&self) -> CheckableKind {
        match self {
            CheckableId::Host(_) => CheckableKind::Host,
            CheckableId::Service(_) => CheckableKind::Service,
        }
    }

    /// Name of the host itself or of the service's host
    pub fn host_name(&self) -> &str {
        match self {
            CheckableId::Host(name) => name,
            CheckableId::Service(key) => &key.host,
        }
    }
}

impl fmt::Display for CheckableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckableId::Host(name) => f.write_str(name),
            CheckableId::Service(key) => key.fmt(f),
        }
    }
}

/// Tag invalidating asynchronous results issued before a reschedule or reload
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monitoring state and settings shared by hosts and services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkable {
    pub id: CheckableId,
    pub display_name: String,

    // Check settings
    pub check_command: Option<String>,
    /// Check timeout in seconds (`None` = engine default)
    pub check_timeout: Option<u64>,
    pub max_attempts: u32,
    /// Seconds between checks while in a hard state
    pub check_interval: i64,
    /// Seconds between checks while in a soft state
    pub retry_interval: i64,
    pub checks_enabled: bool,
    pub accept_passive_checks: bool,

    // Current status
    pub current_state: CheckableState,
    pub last_state: CheckableState,
    pub last_hard_state: CheckableState,
    pub state_type: StateType,
    pub current_attempt: u32,
    pub has_been_checked: bool,
    pub plugin_output: String,
    pub last_check: Option<Timestamp>,
    pub next_check: Option<Timestamp>,
    pub last_state_change: Timestamp,
    pub last_hard_state_change: Timestamp,

    // Flapping
    pub flap_detection_enabled: bool,
    pub is_flapping: bool,
    pub flap_history: FlapHistory,

    // Notification settings
    pub notifications_enabled: bool,
    pub notify_on: NotifyOn,
    /// Seconds between repeated problem notifications (0 = notify once)
    pub notification_interval: i64,
    /// Minimum age of a hard recovery before it is notified
    pub recovery_notification_delay: i64,
    pub notification_period: Option<String>,
    pub contacts: Vec<String>,
    pub escalations: Vec<Escalation>,

    // Notification runtime
    pub last_notification: Option<Timestamp>,
    pub current_notification_number: u32,
    pub next_notification_id: u64,
    /// Problem states notified during the current episode
    pub notified_states: NotifyOn,
    pub last_notified_state: Option<CheckableState>,

    pub acknowledgement: Option<Acknowledgement>,
    pub downtimes: Vec<Downtime>,
    pub in_downtime: bool,

    /// Non-owning references (parent hosts for a host, the host for a service)
    pub dependencies: Vec<CheckableId>,
    pub generation: Generation,
}

impl Checkable {
    /// New checkable in hard UP/OK with default settings
    pub fn new(id: CheckableId) -> Self {
        let initial = match id.kind() {
            CheckableKind::Host => CheckableState::Host(HostState::Up),
            CheckableKind::Service => CheckableState::Service(ServiceState::Ok),
        };
        Self {
            display_name: id.to_string(),
            id,
            check_command: None,
            check_timeout: None,
            max_attempts: 3,
            check_interval: 300,
            retry_interval: 60,
            checks_enabled: true,
            accept_passive_checks: true,
            current_state: initial,
            last_state: initial,
            last_hard_state: initial,
            state_type: StateType::Hard,
            current_attempt: 1,
            has_been_checked: false,
            plugin_output: String::new(),
            last_check: None,
            next_check: None,
            last_state_change: 0,
            last_hard_state_change: 0,
            flap_detection_enabled: true,
            is_flapping: false,
            flap_history: FlapHistory::default(),
            notifications_enabled: true,
            notify_on: NotifyOn::ALL,
            notification_interval: 1800,
            recovery_notification_delay: 0,
            notification_period: None,
            contacts: Vec::new(),
            escalations: Vec::new(),
            last_notification: None,
            current_notification_number: 0,
            next_notification_id: 1,
            notified_states: NotifyOn::NONE,
            last_notified_state: None,
            acknowledgement: None,
            downtimes: Vec::new(),
            in_downtime: false,
            dependencies: Vec::new(),
            generation: Generation::default(),
        }
    }

    pub fn kind(&self) -> CheckableKind {
        self.id.kind()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_intervals(mut self, check_interval: i64, retry_interval: i64) -> Self {
        self.check_interval = check_interval;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_notification_interval(mut self, seconds: i64) -> Self {
        self.notification_interval = seconds;
        self
    }

    pub fn with_recovery_delay(mut self, seconds: i64) -> Self {
        self.recovery_notification_delay = seconds;
        self
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contacts.push(contact.into());
        self
    }

    pub fn with_escalation(mut self, escalation: Escalation) -> Self {
        self.escalations.push(escalation);
        self
    }

    pub fn with_check_command(mut self, command: impl Into<String>) -> Self {
        self.check_command = Some(command.into());
        self
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledgement.is_some()
    }

    pub fn is_hard(&self) -> bool {
        self.state_type == StateType::Hard
    }

    /// Check interval for the current state type
    pub fn interval(&self) -> i64 {
        match self.state_type {
            StateType::Hard => self.check_interval,
            StateType::Soft => self.retry_interval,
        }
    }

    /// Classify a plugin return code for this kind of checkable
    pub fn classify(&self, return_code: i32) -> CheckableState {
        match self.kind() {
            CheckableKind::Host => CheckableState::Host(HostState::from_return_code(return_code)),
            CheckableKind::Service => {
                CheckableState::Service(ServiceState::from_return_code(return_code))
            }
        }
    }

    /// Recompute the downtime flag; returns the new value when it changed
    pub fn refresh_downtime(&mut self, now: Timestamp) -> Option<bool> {
        self.downtimes.retain(|downtime| !downtime.is_expired(now));
        let active = self.downtimes.iter().any(|downtime| downtime.is_active(now));
        if active != self.in_downtime {
            self.in_downtime = active;
            Some(active)
        } else {
            None
        }
    }

    /// Carry runtime status over from the previous incarnation of this entity
    pub fn inherit_runtime(&mut self, previous: &Checkable) {
        self.current_state = previous.current_state;
        self.last_state = previous.last_state;
        self.last_hard_state = previous.last_hard_state;
        self.state_type = previous.state_type;
        self.current_attempt = previous.current_attempt.min(self.max_attempts).max(1);
        self.has_been_checked = previous.has_been_checked;
        self.plugin_output = previous.plugin_output.clone();
        self.last_check = previous.last_check;
        self.next_check = previous.next_check;
        self.last_state_change = previous.last_state_change;
        self.last_hard_state_change = previous.last_hard_state_change;
        self.is_flapping = previous.is_flapping;
        self.flap_history = previous.flap_history.clone();
        self.last_notification = previous.last_notification;
        self.current_notification_number = previous.current_notification_number;
        self.next_notification_id = previous.next_notification_id;
        self.notified_states = previous.notified_states;
        self.last_notified_state = previous.last_notified_state;
        self.acknowledgement = previous.acknowledgement.clone();
        self.downtimes = previous.downtimes.clone();
        self.in_downtime = previous.in_downtime;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_ordering_and_display() {
        let host = CheckableId::host("web01");
        let service = CheckableId::service("web01", "http");
        assert!(host < service);
        assert_eq!(host.to_string(), "web01");
        assert_eq!(service.to_string(), "web01;http");
        assert_eq!(service.host_name(), "web01");
        assert_eq!(service.kind(), CheckableKind::Service);
    }

    #[test]
    fn test_new_checkable_defaults() {
        let checkable = Checkable::new(CheckableId::host("db01"));
        assert_eq!(checkable.current_state, CheckableState::Host(HostState::Up));
        assert!(checkable.is_hard());
        assert_eq!(checkable.current_attempt, 1);
        assert_eq!(checkable.interval(), checkable.check_interval);
    }

    #[test]
    fn test_interval_follows_state_type() {
        let mut checkable =
            Checkable::new(CheckableId::service("db01", "pg")).with_intervals(300, 30);
        checkable.state_type = StateType::Soft;
        assert_eq!(checkable.interval(), 30);
    }

    #[test]
    fn test_refresh_downtime() {
        let mut checkable = Checkable::new(CheckableId::host("db01"));
        checkable.downtimes.push(Downtime {
            id: 1,
            start: 100,
            end: 200,
            author: "ops".to_string(),
            comment: "maintenance".to_string(),
        });
        assert_eq!(checkable.refresh_downtime(50), None);
        assert_eq!(checkable.refresh_downtime(100), Some(true));
        assert_eq!(checkable.refresh_downtime(150), None);
        assert_eq!(checkable.refresh_downtime(200), Some(false));
        assert!(checkable.downtimes.is_empty());
    }
}
