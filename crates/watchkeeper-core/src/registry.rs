//! Checkable registry
//!
//! Sole owner of hosts, services, groups, contacts and time periods. Every
//! other component refers to entities by identifier and resolves them here,
//! so a removed entity simply stops resolving.

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::model::{
    Checkable, CheckableId, Contact, Generation, Host, HostGroup, Service, ServiceGroup,
    ServiceKey, TimePeriod,
};

/// Registry construction errors (fatal at configuration time)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entity with the same identifier already exists
    #[error("Duplicate entity: {kind} '{name}'")]
    DuplicateEntity { kind: &'static str, name: String },

    /// A reference does not resolve to a registered entity
    #[error("Dangling reference: {owner} references unknown {kind} '{target}'")]
    DanglingReference {
        owner: String,
        kind: &'static str,
        target: String,
    },
}

impl RegistryError {
    fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        RegistryError::DuplicateEntity {
            kind,
            name: name.into(),
        }
    }

    fn dangling(owner: impl Into<String>, kind: &'static str, target: impl Into<String>) -> Self {
        RegistryError::DanglingReference {
            owner: owner.into(),
            kind,
            target: target.into(),
        }
    }
}

/// Owner of all monitored entities
#[derive(Debug, Clone, Default)]
pub struct Registry {
    hosts: BTreeMap<String, Host>,
    services: BTreeMap<ServiceKey, Service>,
    hostgroups: HashMap<String, HostGroup>,
    hostgroup_order: Vec<String>,
    servicegroups: HashMap<String, ServiceGroup>,
    servicegroup_order: Vec<String>,
    contacts: HashMap<String, Contact>,
    timeperiods: HashMap<String, TimePeriod>,
    generation_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host
    pub fn add_host(&mut self, mut host: Host) -> Result<(), RegistryError> {
        if self.hosts.contains_key(&host.name) {
            return Err(RegistryError::duplicate("host", &host.name));
        }
        // Children are attached through add_service only.
        host.services.clear();
        host.checkable.generation = self.next_generation();
        self.hosts.insert(host.name.clone(), host);
        Ok(())
    }

    /// Register a service and attach it to its host
    pub fn add_service(&mut self, mut service: Service) -> Result<(), RegistryError> {
        let key = service.key();
        if self.services.contains_key(&key) {
            return Err(RegistryError::duplicate("service", key.to_string()));
        }
        service.checkable.generation = self.next_generation();
        let host = self
            .hosts
            .get_mut(&service.host_name)
            .ok_or_else(|| RegistryError::dangling(key.to_string(), "host", &service.host_name))?;
        host.services.push(service.description.clone());
        self.services.insert(key, service);
        Ok(())
    }

    pub fn add_hostgroup(&mut self, group: HostGroup) -> Result<(), RegistryError> {
        if self.hostgroups.contains_key(&group.name) {
            return Err(RegistryError::duplicate("hostgroup", &group.name));
        }
        self.hostgroup_order.push(group.name.clone());
        self.hostgroups.insert(group.name.clone(), group);
        Ok(())
    }

    pub fn add_servicegroup(&mut self, group: ServiceGroup) -> Result<(), RegistryError> {
        if self.servicegroups.contains_key(&group.name) {
            return Err(RegistryError::duplicate("servicegroup", &group.name));
        }
        self.servicegroup_order.push(group.name.clone());
        self.servicegroups.insert(group.name.clone(), group);
        Ok(())
    }

    pub fn add_contact(&mut self, contact: Contact) -> Result<(), RegistryError> {
        if self.contacts.contains_key(&contact.name) {
            return Err(RegistryError::duplicate("contact", &contact.name));
        }
        self.contacts.insert(contact.name.clone(), contact);
        Ok(())
    }

    pub fn add_timeperiod(&mut self, period: TimePeriod) -> Result<(), RegistryError> {
        if self.timeperiods.contains_key(&period.name) {
            return Err(RegistryError::duplicate("timeperiod", &period.name));
        }
        self.timeperiods.insert(period.name.clone(), period);
        Ok(())
    }

    /// Remove a host together with its services
    pub fn remove_host(&mut self, name: &str) -> Option<Host> {
        let host = self.hosts.remove(name)?;
        for description in &host.services {
            self.services
                .remove(&ServiceKey::new(name, description.as_str()));
        }
        Some(host)
    }

    /// Remove a single service and detach it from its host
    pub fn remove_service(&mut self, key: &ServiceKey) -> Option<Service> {
        let service = self.services.remove(key)?;
        if let Some(host) = self.hosts.get_mut(&key.host) {
            host.services.retain(|description| description != &key.description);
        }
        Some(service)
    }

    pub fn host(&self, name: &str) -> Option<&Host> {
        self.hosts.get(name)
    }

    pub fn host_mut(&mut self, name: &str) -> Option<&mut Host> {
        self.hosts.get_mut(name)
    }

    pub fn service(&self, host: &str, description: &str) -> Option<&Service> {
        self.services.get(&ServiceKey::new(host, description))
    }

    pub fn service_mut(&mut self, host: &str, description: &str) -> Option<&mut Service> {
        self.services.get_mut(&ServiceKey::new(host, description))
    }

    /// Resolve any checkable by identifier
    pub fn checkable(&self, id: &CheckableId) -> Option<&Checkable> {
        match id {
            CheckableId::Host(name) => self.hosts.get(name).map(|host| &host.checkable),
            CheckableId::Service(key) => self.services.get(key).map(|service| &service.checkable),
        }
    }

    pub fn checkable_mut(&mut self, id: &CheckableId) -> Option<&mut Checkable> {
        match id {
            CheckableId::Host(name) => self.hosts.get_mut(name).map(|host| &mut host.checkable),
            CheckableId::Service(key) => self
                .services
                .get_mut(key)
                .map(|service| &mut service.checkable),
        }
    }

    pub fn contains(&self, id: &CheckableId) -> bool {
        self.checkable(id).is_some()
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Services of one host, in attachment order
    pub fn services_of_host<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a Service> + 'a {
        self.hosts
            .get(host)
            .into_iter()
            .flat_map(move |h| h.services.iter())
            .filter_map(move |description| self.service(host, description))
    }

    /// All checkable identifiers, hosts first, each kind sorted
    pub fn checkable_ids(&self) -> Vec<CheckableId> {
        self.hosts
            .keys()
            .map(|name| CheckableId::Host(name.clone()))
            .chain(self.services.keys().cloned().map(CheckableId::Service))
            .collect()
    }

    pub fn hostgroup(&self, name: &str) -> Option<&HostGroup> {
        self.hostgroups.get(name)
    }

    pub fn servicegroup(&self, name: &str) -> Option<&ServiceGroup> {
        self.servicegroups.get(name)
    }

    /// Host groups in registration order
    pub fn hostgroups(&self) -> impl Iterator<Item = &HostGroup> {
        self.hostgroup_order
            .iter()
            .filter_map(|name| self.hostgroups.get(name))
    }

    /// Service groups in registration order
    pub fn servicegroups(&self) -> impl Iterator<Item = &ServiceGroup> {
        self.servicegroup_order
            .iter()
            .filter_map(|name| self.servicegroups.get(name))
    }

    /// Names of the groups a host belongs to
    pub fn groups_of_host(&self, host: &str) -> Vec<&str> {
        self.hostgroups()
            .filter(|group| group.members.iter().any(|member| member == host))
            .map(|group| group.name.as_str())
            .collect()
    }

    pub fn contact(&self, name: &str) -> Option<&Contact> {
        self.contacts.get(name)
    }

    pub fn timeperiod(&self, name: &str) -> Option<&TimePeriod> {
        self.timeperiods.get(name)
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Assign a fresh generation to a checkable, invalidating outstanding results
    pub fn bump_generation(&mut self, id: &CheckableId) -> Option<Generation> {
        let generation = self.next_generation();
        let checkable = self.checkable_mut(id)?;
        checkable.generation = generation;
        Some(generation)
    }

    /// Continue generation numbering after `previous`, so stale results of a
    /// replaced registry can never match this one
    pub fn continue_generations_from(&mut self, previous: &Registry) {
        let offset = previous.generation_seq;
        for host in self.hosts.values_mut() {
            host.checkable.generation = Generation(host.checkable.generation.0 + offset);
        }
        for service in self.services.values_mut() {
            service.checkable.generation = Generation(service.checkable.generation.0 + offset);
        }
        self.generation_seq += offset;
    }

    fn next_generation(&mut self) -> Generation {
        self.generation_seq += 1;
        Generation(self.generation_seq)
    }

    /// Check that every reference resolves
    pub fn validate(&self) -> Result<(), RegistryError> {
        for host in self.hosts.values() {
            for parent in &host.parents {
                if !self.hosts.contains_key(parent) {
                    return Err(RegistryError::dangling(&host.name, "host", parent));
                }
            }
            self.validate_checkable(&host.checkable)?;
        }
        for service in self.services.values() {
            if !self.hosts.contains_key(&service.host_name) {
                return Err(RegistryError::dangling(
                    service.key().to_string(),
                    "host",
                    &service.host_name,
                ));
            }
            self.validate_checkable(&service.checkable)?;
        }
        for group in self.hostgroups.values() {
            for member in &group.members {
                if !self.hosts.contains_key(member) {
                    return Err(RegistryError::dangling(&group.name, "host", member));
                }
            }
        }
        for group in self.servicegroups.values() {
            for member in &group.members {
                if !self.services.contains_key(member) {
                    return Err(RegistryError::dangling(
                        &group.name,
                        "service",
                        member.to_string(),
                    ));
                }
            }
        }
        for contact in self.contacts.values() {
            if let Some(period) = &contact.notification_period {
                if !self.timeperiods.contains_key(period) {
                    return Err(RegistryError::dangling(&contact.name, "timeperiod", period));
                }
            }
        }
        Ok(())
    }

    fn validate_checkable(&self, checkable: &Checkable) -> Result<(), RegistryError> {
        let owner = checkable.id.to_string();
        if let Some(period) = &checkable.notification_period {
            if !self.timeperiods.contains_key(period) {
                return Err(RegistryError::dangling(&owner, "timeperiod", period));
            }
        }
        for contact in &checkable.contacts {
            if !self.contacts.contains_key(contact) {
                return Err(RegistryError::dangling(&owner, "contact", contact));
            }
        }
        for escalation in &checkable.escalations {
            for contact in &escalation.contacts {
                if !self.contacts.contains_key(contact) {
                    return Err(RegistryError::dangling(&owner, "contact", contact));
                }
            }
            if let Some(period) = &escalation.escalation_period {
                if !self.timeperiods.contains_key(period) {
                    return Err(RegistryError::dangling(&owner, "timeperiod", period));
                }
            }
        }
        Ok(())
    }
}
