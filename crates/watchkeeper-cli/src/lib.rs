//! Watchkeeper daemon
//!
//! Wires the core engine to its outer surfaces: the external command file,
//! the HTTP API and log output.

pub mod command_file;
pub mod handler;
pub mod logging;
