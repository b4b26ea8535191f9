//! Hosts, services and groups

use serde::{Deserialize, Serialize};

use super::{Checkable, CheckableId, ServiceKey};

/// Monitored host; owns its services by description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub name: String,
    pub alias: String,
    pub address: String,
    pub parents: Vec<String>,
    /// Descriptions of the services attached to this host, in insertion order
    pub services: Vec<String>,
    pub checkable: Checkable,
}

impl Host {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            address: address.into(),
            parents: Vec::new(),
            services: Vec::new(),
            checkable: Checkable::new(CheckableId::Host(name.clone())),
            name,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        let parent = parent.into();
        self.checkable
            .dependencies
            .push(CheckableId::Host(parent.clone()));
        self.parents.push(parent);
        self
    }

    pub fn with_checkable(mut self, configure: impl FnOnce(Checkable) -> Checkable) -> Self {
        self.checkable = configure(self.checkable);
        self
    }
}

/// Monitored service running on a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub host_name: String,
    pub description: String,
    pub checkable: Checkable,
}

impl Service {
    pub fn new(host_name: impl Into<String>, description: impl Into<String>) -> Self {
        let host_name = host_name.into();
        let description = description.into();
        let mut checkable = Checkable::new(CheckableId::service(&host_name, &description));
        checkable.display_name = description.clone();
        checkable
            .dependencies
            .push(CheckableId::Host(host_name.clone()));
        Self {
            host_name,
            description,
            checkable,
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::new(&self.host_name, &self.description)
    }

    pub fn with_checkable(mut self, configure: impl FnOnce(Checkable) -> Checkable) -> Self {
        self.checkable = configure(self.checkable);
        self
    }
}

/// Named, ordered set of host names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGroup {
    pub name: String,
    pub alias: String,
    pub members: Vec<String>,
}

impl HostGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            members: Vec::new(),
        }
    }

    /// Append a member; duplicates are ignored
    pub fn add_member(&mut self, host: impl Into<String>) {
        let host = host.into();
        if !self.members.contains(&host) {
            self.members.push(host);
        }
    }

    pub fn with_member(mut self, host: impl Into<String>) -> Self {
        self.add_member(host);
        self
    }
}

/// Named, ordered set of services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceGroup {
    pub name: String,
    pub alias: String,
    pub members: Vec<ServiceKey>,
}

impl ServiceGroup {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            alias: name.clone(),
            name,
            members: Vec::new(),
        }
    }

    pub fn add_member(&mut self, key: ServiceKey) {
        if !self.members.contains(&key) {
            self.members.push(key);
        }
    }

    pub fn with_member(mut self, host: impl Into<String>, description: impl Into<String>) -> Self {
        self.add_member(ServiceKey::new(host, description));
        self
    }
}
