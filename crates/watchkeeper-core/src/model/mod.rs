//! Monitoring data model
//!
//! Hosts and services share the [`Checkable`] capability. Every cross-entity
//! reference (group members, parents, contacts, periods) is a name resolved
//! through the [`Registry`](crate::registry::Registry).

mod checkable;
mod contact;
mod downtime;
mod entities;
mod flapping;
mod state;
mod timeperiod;

pub use checkable::*;
pub use contact::*;
pub use downtime::*;
pub use entities::*;
pub use flapping::*;
pub use state::*;
pub use timeperiod::*;

/// Unix timestamp in seconds
pub type Timestamp = i64;
