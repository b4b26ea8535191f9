//! Watchkeeper Contracts
//!
//! Data exchanged between the engine and its collaborators: check
//! requests/results with execution delegates, and committed events with
//! broadcast listeners.

mod checks;
mod events;

pub use checks::*;
pub use events::*;
