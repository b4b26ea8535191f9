//! Watchkeeper Core
//!
//! A monitoring engine that schedules health checks for hosts and services,
//! classifies results into a soft/hard status and drives notifications to
//! contacts through escalation chains.
//!
//! ## Architecture
//!
//! 1. **Registry** (`registry`): sole owner of hosts, services, groups,
//!    contacts and time periods. Everything else refers to entities by id.
//!
//! 2. **Engine** (`engine/`): the state machine, the scheduler with admission
//!    control, the notification decision engine and the single-writer
//!    context and runner tying them together.
//!
//! 3. **Commands** (`commands/`): the external command processor
//!    (`[timestamp] VERB;arg;...`).
//!
//! 4. **Contracts** (`contracts/`): check requests/results exchanged with
//!    execution delegates and the events handed to broadcast listeners.
//!
//! 5. **Delegates** (`delegate/`): run checks as child processes or through
//!    a connector speaking the NUL-framed wire protocol.
//!
//! 6. **Telemetry** (`telemetry/`): Prometheus metrics.
//!
//! ## Example
//!
//! ```rust,no_run
//! use watchkeeper_core::config::{EngineConfig, ObjectConfig};
//! use watchkeeper_core::engine::EngineContext;
//!
//! # fn main() -> watchkeeper_core::Result<()> {
//! let objects = ObjectConfig::from_file("objects.yaml")?;
//! let registry = objects.into_registry()?;
//! let mut context = EngineContext::new(EngineConfig::default(), registry)?;
//!
//! let outcome = context.tick(1_700_000_000);
//! context.handle_command("[1700000000] DISABLE_HOST_CHECK;web01", 1_700_000_000)?;
//! # let _ = outcome.requests;
//! # Ok(())
//! # }
//! ```

#[path = "../contracts/mod.rs"]
pub mod contracts;

pub mod broadcast;
pub mod clock;
pub mod commands;
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod model;
pub mod registry;
pub mod render;
pub mod telemetry;

pub use error::{EngineError, Result};
pub use registry::{Registry, RegistryError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
