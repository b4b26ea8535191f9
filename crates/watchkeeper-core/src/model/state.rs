//! Check states, state types and notify-on masks

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Host status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Up,
    Down,
    Unreachable,
}

impl HostState {
    /// Map a plugin return code (0 up, 1 down, 2 unreachable, anything else down)
    pub fn from_return_code(code: i32) -> Self {
        match code {
            0 => HostState::Up,
            2 => HostState::Unreachable,
            _ => HostState::Down,
        }
    }
}

/// Service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl ServiceState {
    /// Map a plugin return code (0 ok, 1 warning, 2 critical, anything else unknown)
    pub fn from_return_code(code: i32) -> Self {
        match code {
            0 => ServiceState::Ok,
            1 => ServiceState::Warning,
            2 => ServiceState::Critical,
            _ => ServiceState::Unknown,
        }
    }
}

/// Current state of a checkable, typed by the kind of entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckableState {
    Host(HostState),
    Service(ServiceState),
}

impl CheckableState {
    /// UP for hosts, OK for services
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            CheckableState::Host(HostState::Up) | CheckableState::Service(ServiceState::Ok)
        )
    }

    /// The notify-on bit this state maps to (recovery for UP/OK)
    pub fn notify_bit(&self) -> NotifyOn {
        match self {
            CheckableState::Host(HostState::Up) | CheckableState::Service(ServiceState::Ok) => {
                NotifyOn::RECOVERY
            }
            CheckableState::Host(HostState::Down) => NotifyOn::DOWN,
            CheckableState::Host(HostState::Unreachable) => NotifyOn::UNREACHABLE,
            CheckableState::Service(ServiceState::Warning) => NotifyOn::WARNING,
            CheckableState::Service(ServiceState::Critical) => NotifyOn::CRITICAL,
            CheckableState::Service(ServiceState::Unknown) => NotifyOn::UNKNOWN,
        }
    }

    /// Upper-case name used in macros and logs
    pub fn name(&self) -> &'static str {
        match self {
            CheckableState::Host(HostState::Up) => "UP",
            CheckableState::Host(HostState::Down) => "DOWN",
            CheckableState::Host(HostState::Unreachable) => "UNREACHABLE",
            CheckableState::Service(ServiceState::Ok) => "OK",
            CheckableState::Service(ServiceState::Warning) => "WARNING",
            CheckableState::Service(ServiceState::Critical) => "CRITICAL",
            CheckableState::Service(ServiceState::Unknown) => "UNKNOWN",
        }
    }
}

impl fmt::Display for CheckableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Soft (provisional) or hard (confirmed) classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateType {
    Soft,
    Hard,
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateType::Soft => write!(f, "SOFT"),
            StateType::Hard => write!(f, "HARD"),
        }
    }
}

/// Bitmask of the state classes that may produce notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifyOn(u32);

impl NotifyOn {
    pub const NONE: NotifyOn = NotifyOn(0);
    pub const DOWN: NotifyOn = NotifyOn(1 << 0);
    pub const UNREACHABLE: NotifyOn = NotifyOn(1 << 1);
    pub const WARNING: NotifyOn = NotifyOn(1 << 2);
    pub const CRITICAL: NotifyOn = NotifyOn(1 << 3);
    pub const UNKNOWN: NotifyOn = NotifyOn(1 << 4);
    pub const RECOVERY: NotifyOn = NotifyOn(1 << 5);
    pub const FLAPPING: NotifyOn = NotifyOn(1 << 6);
    pub const DOWNTIME: NotifyOn = NotifyOn(1 << 7);
    pub const ALL: NotifyOn = NotifyOn(u32::MAX);

    /// Problem bits for any kind of checkable
    pub const PROBLEMS: NotifyOn =
        NotifyOn((1 << 0) | (1 << 1) | (1 << 2) | (1 << 3) | (1 << 4));

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn from_bits(bits: u32) -> Self {
        NotifyOn(bits)
    }

    pub fn contains(&self, other: NotifyOn) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn intersects(&self, other: NotifyOn) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: NotifyOn) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: NotifyOn) {
        self.0 &= !other.0;
    }

    /// Parse configuration options such as `["d", "u", "r"]` or `["critical", "recovery"]`
    pub fn parse_options<S: AsRef<str>>(options: &[S]) -> Result<Self, String> {
        let mut mask = NotifyOn::NONE;
        for option in options {
            let bit = match option.as_ref().trim().to_ascii_lowercase().as_str() {
                "d" | "down" => NotifyOn::DOWN,
                "u" | "unreachable" => NotifyOn::UNREACHABLE,
                "w" | "warning" => NotifyOn::WARNING,
                "c" | "critical" => NotifyOn::CRITICAL,
                "unknown" => NotifyOn::UNKNOWN,
                "r" | "recovery" => NotifyOn::RECOVERY,
                "f" | "flapping" => NotifyOn::FLAPPING,
                "s" | "downtime" => NotifyOn::DOWNTIME,
                "a" | "all" => NotifyOn::ALL,
                "n" | "none" => return Ok(NotifyOn::NONE),
                other => return Err(format!("unknown notification option '{}'", other)),
            };
            mask.insert(bit);
        }
        Ok(mask)
    }
}

impl BitOr for NotifyOn {
    type Output = NotifyOn;

    fn bitor(self, rhs: NotifyOn) -> NotifyOn {
        NotifyOn(self.0 | rhs.0)
    }
}

impl BitOrAssign for NotifyOn {
    fn bitor_assign(&mut self, rhs: NotifyOn) {
        self.0 |= rhs.0;
    }
}
