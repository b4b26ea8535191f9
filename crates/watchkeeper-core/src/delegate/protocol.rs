//! Connector wire protocol
//!
//! A frame is a list of NUL-separated fields terminated by four NUL bytes.
//! The first field is the message type id; the remaining fields are fixed
//! per type and validated with strict arity.
//!
//! | id | message          | fields                                              |
//! |----|------------------|-----------------------------------------------------|
//! | 0  | version query    |                                                     |
//! | 1  | version response | major, minor                                        |
//! | 2  | execute query    | command_id, timeout, start_time_ms, command         |
//! | 3  | execute response | command_id, is_executed, exit_code, stderr, stdout  |
//! | 4  | quit query       |                                                     |
//! | 5  | quit response    |                                                     |
//! | 6  | error            | code, message                                       |

use std::str::FromStr;
use thiserror::Error;

/// Bytes closing every frame
pub const FRAME_TERMINATOR: &[u8] = b"\0\0\0\0";

/// Largest frame accepted from a connector
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol major version spoken by the engine
pub const PROTOCOL_MAJOR: u32 = 1;
pub const PROTOCOL_MINOR: u32 = 0;

/// Malformed frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Message type {kind} expects {expected} fields, got {actual}")]
    BadArity {
        kind: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("Frame is not valid UTF-8")]
    InvalidUtf8,

    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
}

/// Messages exchanged with a connector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateMessage {
    VersionQuery,
    VersionResponse {
        major: u32,
        minor: u32,
    },
    ExecuteQuery {
        command_id: u64,
        timeout: u64,
        start_time_ms: i64,
        command: String,
    },
    ExecuteResponse {
        command_id: u64,
        is_executed: bool,
        exit_code: i32,
        stderr: String,
        stdout: String,
    },
    QuitQuery,
    QuitResponse,
    Error {
        code: i32,
        message: String,
    },
}

impl DelegateMessage {
    pub fn type_id(&self) -> u32 {
        match self {
            DelegateMessage::VersionQuery => 0,
            DelegateMessage::VersionResponse { .. } => 1,
            DelegateMessage::ExecuteQuery { .. } => 2,
            DelegateMessage::ExecuteResponse { .. } => 3,
            DelegateMessage::QuitQuery => 4,
            DelegateMessage::QuitResponse => 5,
            DelegateMessage::Error { .. } => 6,
        }
    }

    /// Field count of a type, type id included
    fn arity(type_id: u32) -> Option<usize> {
        match type_id {
            0 | 4 | 5 => Some(1),
            1 | 6 => Some(3),
            2 => Some(5),
            3 => Some(6),
            _ => None,
        }
    }

    /// Encode into a terminated frame
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = vec![self.type_id().to_string()];
        match self {
            DelegateMessage::VersionQuery
            | DelegateMessage::QuitQuery
            | DelegateMessage::QuitResponse => {}
            DelegateMessage::VersionResponse { major, minor } => {
                fields.push(major.to_string());
                fields.push(minor.to_string());
            }
            DelegateMessage::ExecuteQuery {
                command_id,
                timeout,
                start_time_ms,
                command,
            } => {
                fields.push(command_id.to_string());
                fields.push(timeout.to_string());
                fields.push(start_time_ms.to_string());
                fields.push(sanitize(command));
            }
            DelegateMessage::ExecuteResponse {
                command_id,
                is_executed,
                exit_code,
                stderr,
                stdout,
            } => {
                fields.push(command_id.to_string());
                fields.push(if *is_executed { "1" } else { "0" }.to_string());
                fields.push(exit_code.to_string());
                fields.push(sanitize(stderr));
                fields.push(sanitize(stdout));
            }
            DelegateMessage::Error { code, message } => {
                fields.push(code.to_string());
                fields.push(sanitize(message));
            }
        }

        let mut frame = fields.join("\0").into_bytes();
        frame.extend_from_slice(FRAME_TERMINATOR);
        frame
    }

    /// Decode a frame body (terminator already stripped)
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidUtf8)?;
        let fields: Vec<&str> = text.split('\0').collect();

        let type_id: u32 = fields[0]
            .parse()
            .map_err(|_| ProtocolError::UnknownType(fields[0].to_string()))?;
        let expected =
            Self::arity(type_id).ok_or_else(|| ProtocolError::UnknownType(fields[0].to_string()))?;
        if fields.len() != expected {
            return Err(ProtocolError::BadArity {
                kind: type_id,
                expected,
                actual: fields.len(),
            });
        }

        let message = match type_id {
            0 => DelegateMessage::VersionQuery,
            1 => DelegateMessage::VersionResponse {
                major: field(&fields, 1, "major")?,
                minor: field(&fields, 2, "minor")?,
            },
            2 => DelegateMessage::ExecuteQuery {
                command_id: field(&fields, 1, "command_id")?,
                timeout: field(&fields, 2, "timeout")?,
                start_time_ms: field(&fields, 3, "start_time")?,
                command: fields[4].to_string(),
            },
            3 => DelegateMessage::ExecuteResponse {
                command_id: field(&fields, 1, "command_id")?,
                is_executed: field::<u8>(&fields, 2, "is_executed")? != 0,
                exit_code: field(&fields, 3, "exit_code")?,
                stderr: fields[4].to_string(),
                stdout: fields[5].to_string(),
            },
            4 => DelegateMessage::QuitQuery,
            5 => DelegateMessage::QuitResponse,
            _ => DelegateMessage::Error {
                code: field(&fields, 1, "code")?,
                message: fields[2].to_string(),
            },
        };
        Ok(message)
    }
}

fn field<T: FromStr>(fields: &[&str], index: usize, name: &'static str) -> Result<T, ProtocolError> {
    fields[index]
        .parse()
        .map_err(|_| ProtocolError::InvalidField {
            field: name,
            value: fields[index].to_string(),
        })
}

fn sanitize(value: &str) -> String {
    value.replace('\0', "")
}

/// Splits a byte stream into frames
///
/// A frame ends with the first run of at least four NUL bytes; the last
/// four of the run are the terminator, so trailing empty fields survive.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_FRAME_SIZE && self.terminator_end().is_none() {
            self.buffer.clear();
            return Err(ProtocolError::FrameTooLarge(MAX_FRAME_SIZE));
        }
        Ok(())
    }

    /// Next complete frame body, if any
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let leading = self.buffer.iter().take_while(|b| **b == 0).count();
        if leading > 0 {
            self.buffer.drain(..leading);
        }

        let end = self.terminator_end()?;
        let frame = self.buffer[..end - FRAME_TERMINATOR.len()].to_vec();
        self.buffer.drain(..end);
        Some(frame)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn terminator_end(&self) -> Option<usize> {
        let start = self
            .buffer
            .windows(FRAME_TERMINATOR.len())
            .position(|window| window == FRAME_TERMINATOR)?;
        let run = self.buffer[start..].iter().take_while(|b| **b == 0).count();
        Some(start + run)
    }
}
