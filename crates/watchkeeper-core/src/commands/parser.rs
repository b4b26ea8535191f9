//! External command line parsing
//!
//! Lines look like `[1317196300] ENABLE_HOSTGROUP_PASSIVE_SVC_CHECKS;group`.
//! Arguments are left unsplit here; the dispatch table knows each verb's
//! arity.

use serde::{Deserialize, Serialize};

use super::CommandError;
use crate::model::Timestamp;

/// One parsed command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCommand {
    /// Submission time from the bracketed prefix
    pub timestamp: Timestamp,
    pub verb: String,
    /// Everything after the first `;`
    pub args: String,
}

impl ExternalCommand {
    pub fn new(timestamp: Timestamp, verb: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            timestamp,
            verb: verb.into(),
            args: args.into(),
        }
    }

    /// Split arguments for a verb taking `arity` fields
    ///
    /// With `trailing_text` the last field absorbs any further `;` so free
    /// text comments survive intact.
    pub fn split_args(&self, arity: usize, trailing_text: bool) -> Result<Vec<&str>, CommandError> {
        let fields: Vec<&str> = if self.args.is_empty() {
            Vec::new()
        } else if trailing_text && arity > 0 {
            self.args.splitn(arity, ';').collect()
        } else {
            self.args.split(';').collect()
        };

        if fields.len() != arity {
            return Err(CommandError::BadArgCount {
                verb: self.verb.clone(),
                expected: arity,
                actual: fields.len(),
            });
        }
        Ok(fields)
    }
}

/// Parse `[timestamp] VERB;arg;...`
pub fn parse_line(line: &str) -> Result<ExternalCommand, CommandError> {
    let line = line.trim();
    let rest = line
        .strip_prefix('[')
        .ok_or_else(|| CommandError::Malformed(format!("missing timestamp: {}", line)))?;
    let (timestamp, rest) = rest
        .split_once(']')
        .ok_or_else(|| CommandError::Malformed(format!("unterminated timestamp: {}", line)))?;
    let timestamp: Timestamp = timestamp
        .trim()
        .parse()
        .map_err(|_| CommandError::Malformed(format!("invalid timestamp '{}'", timestamp)))?;

    let rest = rest.trim_start();
    let (verb, args) = rest.split_once(';').unwrap_or((rest, ""));
    let verb = verb.trim();
    let valid_verb = !verb.is_empty()
        && verb
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid_verb {
        return Err(CommandError::Malformed(format!("invalid verb '{}'", verb)));
    }

    Ok(ExternalCommand::new(timestamp, verb, args))
}
