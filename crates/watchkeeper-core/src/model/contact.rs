//! Contacts and notification escalations

use serde::{Deserialize, Serialize};

use super::{CheckableKind, NotifyOn};

/// Notification recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub alias: String,
    pub email: Option<String>,
    pub host_notifications_enabled: bool,
    pub service_notifications_enabled: bool,
    pub host_notify_on: NotifyOn,
    pub service_notify_on: NotifyOn,
    /// Period during which this contact may be notified (`None` = always)
    pub notification_period: Option<String>,
    /// Command template run to deliver a notification
    pub notification_command: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            email: None,
            host_notifications_enabled: true,
            service_notifications_enabled: true,
            host_notify_on: NotifyOn::ALL,
            service_notify_on: NotifyOn::ALL,
            notification_period: None,
            notification_command: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Whether this contact accepts a notification with the given state bit
    ///
    /// An empty bit (acknowledgement, custom) only requires notifications
    /// to be enabled for the checkable kind.
    pub fn accepts(&self, kind: CheckableKind, bit: NotifyOn) -> bool {
        let (enabled, mask) = match kind {
            CheckableKind::Host => (self.host_notifications_enabled, self.host_notify_on),
            CheckableKind::Service => (self.service_notifications_enabled, self.service_notify_on),
        };
        enabled && (bit.is_empty() || mask.contains(bit))
    }
}

/// Notification-number and time-period scoped contact override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    /// First notification number covered (0 = unbounded)
    pub first_notification: u32,
    /// Last notification number covered (0 = unbounded)
    pub last_notification: u32,
    pub contacts: Vec<String>,
    pub escalation_period: Option<String>,
}

impl Escalation {
    pub fn new(first_notification: u32, last_notification: u32) -> Self {
        Self {
            first_notification,
            last_notification,
            contacts: Vec::new(),
            escalation_period: None,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contacts.push(contact.into());
        self
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.escalation_period = Some(period.into());
        self
    }

    /// Whether the notification number falls inside `[first, last]`
    pub fn covers(&self, number: u32) -> bool {
        let above_first = self.first_notification == 0 || number >= self.first_notification;
        let below_last = self.last_notification == 0 || number <= self.last_notification;
        above_first && below_last
    }
}
