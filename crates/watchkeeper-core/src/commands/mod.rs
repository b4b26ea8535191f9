//! External command processor
//!
//! A dispatch table maps each verb to its arity and handler. Handlers mutate
//! the registry directly and return follow-up effects (passive results,
//! notifications) that the engine routes through its normal paths.

mod handlers;
mod parser;

pub use parser::{parse_line, ExternalCommand};

use std::collections::HashMap;
use thiserror::Error;

use crate::contracts::CheckResult;
use crate::engine::{NotificationEngine, NotificationTrigger, ProcessState, Scheduler};
use crate::model::{CheckableId, Timestamp};
use crate::registry::Registry;

/// Recoverable command errors; logged, processing continues
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown verb: {0}")]
    UnknownVerb(String),

    #[error("Unknown {kind}: {name}")]
    UnknownTarget { kind: &'static str, name: String },

    #[error("{verb} expects {expected} arguments, got {actual}")]
    BadArgCount {
        verb: String,
        expected: usize,
        actual: usize,
    },

    #[error("{verb}: invalid value '{value}' for {field}")]
    BadArgValue {
        verb: String,
        field: &'static str,
        value: String,
    },

    #[error("Malformed command: {0}")]
    Malformed(String),
}

impl CommandError {
    pub fn unknown_target(kind: &'static str, name: impl Into<String>) -> Self {
        CommandError::UnknownTarget {
            kind,
            name: name.into(),
        }
    }

    pub fn bad_value(verb: &str, field: &'static str, value: impl Into<String>) -> Self {
        CommandError::BadArgValue {
            verb: verb.to_string(),
            field,
            value: value.into(),
        }
    }
}

/// Follow-up work produced by a handler
#[derive(Debug, Clone, PartialEq)]
pub enum CommandEffect {
    /// Feed a passive result through the result path
    SubmitResult(CheckResult),
    /// Evaluate and commit a notification
    Notify {
        id: CheckableId,
        trigger: NotificationTrigger,
    },
    /// Downtime flag of a checkable changed
    Downtime { id: CheckableId, active: bool },
}

/// Mutable engine state visible to handlers
pub struct CommandContext<'a> {
    pub registry: &'a mut Registry,
    pub scheduler: &'a mut Scheduler,
    pub notifier: &'a mut NotificationEngine,
    pub process: &'a mut ProcessState,
    pub now: Timestamp,
}

/// Handler signature: parsed arguments in, effects out
pub type Handler = Box<
    dyn Fn(&mut CommandContext<'_>, &str, &[&str]) -> Result<Vec<CommandEffect>, CommandError>
        + Send
        + Sync,
>;

struct CommandSpec {
    arity: usize,
    trailing_text: bool,
    handler: Handler,
}

/// Verb dispatch table
pub struct CommandProcessor {
    table: HashMap<&'static str, CommandSpec>,
}

impl Default for CommandProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandProcessor {
    /// Processor with every built-in verb registered
    pub fn new() -> Self {
        let mut processor = Self::empty();
        handlers::register_all(&mut processor);
        processor
    }

    /// Processor without any verb
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Register a verb; the last of `arity` fields absorbs extra `;` when
    /// `trailing_text` is set
    pub fn register<F>(&mut self, verb: &'static str, arity: usize, trailing_text: bool, handler: F)
    where
        F: Fn(&mut CommandContext<'_>, &str, &[&str]) -> Result<Vec<CommandEffect>, CommandError>
            + Send
            + Sync
            + 'static,
    {
        self.table.insert(
            verb,
            CommandSpec {
                arity,
                trailing_text,
                handler: Box::new(handler),
            },
        );
    }

    pub fn supports(&self, verb: &str) -> bool {
        self.table.contains_key(verb)
    }

    /// Registered verbs, sorted
    pub fn verbs(&self) -> Vec<&'static str> {
        let mut verbs: Vec<&'static str> = self.table.keys().copied().collect();
        verbs.sort_unstable();
        verbs
    }

    /// Parse and execute one line
    pub fn process_line(
        &self,
        ctx: &mut CommandContext<'_>,
        line: &str,
    ) -> Result<(ExternalCommand, Vec<CommandEffect>), CommandError> {
        let command = parse_line(line)?;
        let effects = self.execute(ctx, &command)?;
        Ok((command, effects))
    }

    /// Execute a parsed command
    pub fn execute(
        &self,
        ctx: &mut CommandContext<'_>,
        command: &ExternalCommand,
    ) -> Result<Vec<CommandEffect>, CommandError> {
        let spec = self
            .table
            .get(command.verb.as_str())
            .ok_or_else(|| CommandError::UnknownVerb(command.verb.clone()))?;
        let args = command.split_args(spec.arity, spec.trailing_text)?;
        let effects = (spec.handler)(ctx, &command.verb, &args)?;
        tracing::info!(
            verb = %command.verb,
            submitted_at = command.timestamp,
            effects = effects.len(),
            "External command processed"
        );
        Ok(effects)
    }
}

impl std::fmt::Debug for CommandProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("verbs", &self.table.len())
            .finish()
    }
}
