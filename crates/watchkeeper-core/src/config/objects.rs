//! Object definitions
//!
//! Hosts (with nested services), groups, contacts and time periods as they
//! appear in the object file, and their conversion into a validated
//! [`Registry`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::{load_file, ConfigError, ConfigFormat};
use crate::model::{
    weekday_index, Checkable, Contact, Escalation, Host, HostGroup, NotifyOn, Service,
    ServiceGroup, ServiceKey, TimePeriod, TimeRange,
};
use crate::registry::Registry;

/// Whole object file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectConfig {
    pub timeperiods: Vec<TimePeriodDef>,
    pub contacts: Vec<ContactDef>,
    pub hosts: Vec<HostDef>,
    pub hostgroups: Vec<GroupDef>,
    pub servicegroups: Vec<GroupDef>,
}

/// Time period with `"HH:MM-HH:MM"` ranges keyed by weekday name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimePeriodDef {
    pub name: String,
    pub alias: Option<String>,
    pub ranges: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactDef {
    pub name: String,
    pub alias: Option<String>,
    pub email: Option<String>,
    pub host_notifications_enabled: Option<bool>,
    pub service_notifications_enabled: Option<bool>,
    pub host_notify_on: Option<Vec<String>>,
    pub service_notify_on: Option<Vec<String>>,
    pub notification_period: Option<String>,
    pub notification_command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationDef {
    pub first_notification: u32,
    pub last_notification: u32,
    pub contacts: Vec<String>,
    pub escalation_period: Option<String>,
}

/// Settings shared by hosts and services; unset fields keep engine defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckableDef {
    pub display_name: Option<String>,
    pub check_command: Option<String>,
    pub check_timeout: Option<u64>,
    pub max_check_attempts: Option<u32>,
    pub check_interval: Option<i64>,
    pub retry_interval: Option<i64>,
    pub active_checks_enabled: Option<bool>,
    pub passive_checks_enabled: Option<bool>,
    pub notifications_enabled: Option<bool>,
    pub flap_detection_enabled: Option<bool>,
    pub notify_on: Option<Vec<String>>,
    pub notification_interval: Option<i64>,
    pub recovery_notification_delay: Option<i64>,
    pub notification_period: Option<String>,
    pub contacts: Vec<String>,
    pub escalations: Vec<EscalationDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostDef {
    pub name: String,
    pub alias: Option<String>,
    pub address: String,
    pub parents: Vec<String>,
    #[serde(flatten)]
    pub checkable: CheckableDef,
    pub services: Vec<ServiceDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDef {
    pub description: String,
    #[serde(flatten)]
    pub checkable: CheckableDef,
}

/// Host group (`host` members) or service group (`host;description` members)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDef {
    pub name: String,
    pub alias: Option<String>,
    pub members: Vec<String>,
}

impl ObjectConfig {
    /// Load from a JSON, TOML or YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_file(path)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self, ConfigError> {
        format.parse(content)
    }

    /// Build and validate the registry
    pub fn into_registry(self) -> Result<Registry, ConfigError> {
        let mut registry = Registry::new();

        for def in self.timeperiods {
            registry.add_timeperiod(def.into_timeperiod()?)?;
        }
        for def in self.contacts {
            registry.add_contact(def.into_contact()?)?;
        }

        let mut services = Vec::new();
        for def in self.hosts {
            let mut host = Host::new(&def.name, &def.address);
            if let Some(alias) = def.alias {
                host.alias = alias;
            }
            for parent in def.parents {
                host = host.with_parent(parent);
            }
            host.checkable = def.checkable.apply(host.checkable)?;
            for service in def.services {
                services.push((def.name.clone(), service));
            }
            registry.add_host(host)?;
        }
        for (host_name, def) in services {
            let mut service = Service::new(host_name, &def.description);
            service.checkable = def.checkable.apply(service.checkable)?;
            registry.add_service(service)?;
        }

        for def in self.hostgroups {
            let mut group = HostGroup::new(&def.name);
            if let Some(alias) = def.alias {
                group.alias = alias;
            }
            for member in def.members {
                group.add_member(member);
            }
            registry.add_hostgroup(group)?;
        }
        for def in self.servicegroups {
            let mut group = ServiceGroup::new(&def.name);
            if let Some(alias) = def.alias {
                group.alias = alias;
            }
            for member in &def.members {
                let (host, description) = member.split_once(';').ok_or_else(|| {
                    ConfigError::invalid(
                        format!("servicegroup {}", def.name),
                        format!("member '{}' is not 'host;description'", member),
                    )
                })?;
                group.add_member(ServiceKey::new(host, description));
            }
            registry.add_servicegroup(group)?;
        }

        registry.validate()?;
        tracing::info!(
            hosts = registry.host_count(),
            services = registry.service_count(),
            "Object configuration loaded"
        );
        Ok(registry)
    }
}

impl TimePeriodDef {
    fn into_timeperiod(self) -> Result<TimePeriod, ConfigError> {
        let field = format!("timeperiod {}", self.name);
        let mut period = TimePeriod::new(&self.name);
        if let Some(alias) = self.alias {
            period.alias = alias;
        }
        for (day, ranges) in self.ranges {
            let index = weekday_index(&day)
                .ok_or_else(|| ConfigError::invalid(&field, format!("unknown weekday '{}'", day)))?;
            for range in ranges {
                let range = TimeRange::parse(&range).map_err(|e| ConfigError::invalid(&field, e))?;
                period = period.with_range(index, range);
            }
        }
        Ok(period)
    }
}

impl ContactDef {
    fn into_contact(self) -> Result<Contact, ConfigError> {
        let field = format!("contact {}", self.name);
        let mut contact = Contact::new(&self.name);
        if let Some(alias) = self.alias {
            contact.alias = alias;
        }
        contact.email = self.email;
        if let Some(enabled) = self.host_notifications_enabled {
            contact.host_notifications_enabled = enabled;
        }
        if let Some(enabled) = self.service_notifications_enabled {
            contact.service_notifications_enabled = enabled;
        }
        if let Some(options) = self.host_notify_on {
            contact.host_notify_on =
                NotifyOn::parse_options(&options).map_err(|e| ConfigError::invalid(&field, e))?;
        }
        if let Some(options) = self.service_notify_on {
            contact.service_notify_on =
                NotifyOn::parse_options(&options).map_err(|e| ConfigError::invalid(&field, e))?;
        }
        contact.notification_period = self.notification_period;
        contact.notification_command = self.notification_command;
        Ok(contact)
    }
}

impl CheckableDef {
    /// Overlay the defined settings on a default checkable
    pub fn apply(self, mut checkable: Checkable) -> Result<Checkable, ConfigError> {
        let field = checkable.id.to_string();
        if let Some(name) = self.display_name {
            checkable.display_name = name;
        }
        checkable.check_command = self.check_command;
        checkable.check_timeout = self.check_timeout;
        if let Some(attempts) = self.max_check_attempts {
            if attempts == 0 {
                return Err(ConfigError::invalid(&field, "max_check_attempts must be positive"));
            }
            checkable.max_attempts = attempts;
        }
        if let Some(interval) = self.check_interval {
            checkable.check_interval = interval;
        }
        if let Some(interval) = self.retry_interval {
            checkable.retry_interval = interval;
        }
        if checkable.check_interval < 0 || checkable.retry_interval < 0 {
            return Err(ConfigError::invalid(&field, "intervals must not be negative"));
        }
        if let Some(enabled) = self.active_checks_enabled {
            checkable.checks_enabled = enabled;
        }
        if let Some(enabled) = self.passive_checks_enabled {
            checkable.accept_passive_checks = enabled;
        }
        if let Some(enabled) = self.notifications_enabled {
            checkable.notifications_enabled = enabled;
        }
        if let Some(enabled) = self.flap_detection_enabled {
            checkable.flap_detection_enabled = enabled;
        }
        if let Some(options) = self.notify_on {
            checkable.notify_on =
                NotifyOn::parse_options(&options).map_err(|e| ConfigError::invalid(&field, e))?;
        }
        if let Some(interval) = self.notification_interval {
            checkable.notification_interval = interval;
        }
        if let Some(delay) = self.recovery_notification_delay {
            checkable.recovery_notification_delay = delay;
        }
        checkable.notification_period = self.notification_period;
        checkable.contacts = self.contacts;
        checkable.escalations = self
            .escalations
            .into_iter()
            .map(|def| Escalation {
                first_notification: def.first_notification,
                last_notification: def.last_notification,
                contacts: def.contacts,
                escalation_period: def.escalation_period,
            })
            .collect();
        Ok(checkable)
    }
}
