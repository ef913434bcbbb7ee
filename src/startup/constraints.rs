//! Mode-specific flag constraints.
//!
//! Every allowed or forbidden flag combination lives in [`RULES`]. Rules are
//! checked in declaration order and the first violation is the only one
//! reported, so an operator always gets one diagnostic per failed start.

use std::fmt;

use super::flags::{self, FlagSet};
use super::mode::Mode;

/// What a rule demands of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Capability flag that must never be enabled in this mode.
    Forbidden,
    /// Flag owned by the other mode; must not be set.
    RequiredAbsent,
    /// Flag that must be set in this mode.
    RequiredPresent,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::Forbidden => "forbidden",
            Policy::RequiredAbsent => "required-absent",
            Policy::RequiredPresent => "required-present",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstraintRule {
    pub mode: Mode,
    pub flag: &'static str,
    pub policy: Policy,
}

const fn rule(mode: Mode, flag: &'static str, policy: Policy) -> ConstraintRule {
    ConstraintRule { mode, flag, policy }
}

/// Declarative constraint table.
pub const RULES: &[ConstraintRule] = &[
    rule(Mode::Agent, flags::ENABLE_ADMIN_API, Policy::Forbidden),
    rule(Mode::Agent, flags::ENABLE_REMOTE_WRITE_RECEIVER, Policy::Forbidden),
    rule(Mode::Agent, flags::ACCEPTED_PROTOBUF_MESSAGES, Policy::Forbidden),
    rule(Mode::Agent, flags::TSDB_PATH, Policy::RequiredAbsent),
    rule(Mode::Agent, flags::TSDB_RETENTION_TIME, Policy::RequiredAbsent),
    rule(Mode::Agent, flags::TSDB_WAL_SEGMENT_SIZE, Policy::RequiredAbsent),
    rule(Mode::Agent, flags::TSDB_MAX_BLOCK_CHUNK_SEGMENT_SIZE, Policy::RequiredAbsent),
    rule(Mode::Server, flags::TSDB_PATH, Policy::RequiredPresent),
    rule(Mode::Server, flags::AGENT_PATH, Policy::RequiredAbsent),
    rule(Mode::Server, flags::AGENT_WAL_SEGMENT_SIZE, Policy::RequiredAbsent),
    rule(Mode::Server, flags::AGENT_RETENTION_MAX_TIME, Policy::RequiredAbsent),
];

/// A breached constraint rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub mode: Mode,
    pub flag: &'static str,
    pub policy: Policy,
    /// Value the operator passed, if the flag was present.
    pub value: Option<String>,
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.policy, &self.value) {
            (Policy::Forbidden, Some(value)) => write!(
                f,
                "flag --{}={:?} enables a server-only capability and is forbidden in {} mode",
                self.flag, value, self.mode
            ),
            (Policy::RequiredAbsent, Some(value)) => write!(
                f,
                "flag --{}={:?} cannot be used in {} mode",
                self.flag, value, self.mode
            ),
            _ => write!(f, "flag --{} is required in {} mode", self.flag, self.mode),
        }
    }
}

impl std::error::Error for ConstraintViolation {}

fn check(rule: &ConstraintRule, flags: &FlagSet) -> Result<(), ConstraintViolation> {
    let present = flags.contains(rule.flag);
    let violated = match rule.policy {
        Policy::Forbidden | Policy::RequiredAbsent => present,
        Policy::RequiredPresent => !present,
    };

    if violated {
        return Err(ConstraintViolation {
            mode: rule.mode,
            flag: rule.flag,
            policy: rule.policy,
            value: flags.get(rule.flag).map(str::to_string),
        });
    }
    Ok(())
}

/// Check every rule of `rules` that applies to `mode`.
pub fn enforce_with(
    rules: &[ConstraintRule],
    mode: Mode,
    flags: &FlagSet,
) -> Result<(), ConstraintViolation> {
    rules
        .iter()
        .filter(|rule| rule.mode == mode)
        .try_for_each(|rule| check(rule, flags))
}
