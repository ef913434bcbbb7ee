//! Operating mode resolution.

use serde::Serialize;
use std::fmt;

use super::flags::FlagSet;

/// Flag that selects agent mode.
pub const AGENT_FLAG: &str = "agent";

/// Operating mode of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Full ingestion, query and admin surface.
    Server,
    /// Forwarding only, no local query or admin surface.
    Agent,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Server => "server",
            Mode::Agent => "agent",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the mode from the flags.
///
/// `--agent` present with any value other than `false` selects agent mode;
/// everything else is server mode.
pub fn resolve(flags: &FlagSet) -> Mode {
    match flags.get(AGENT_FLAG) {
        Some(value) if !value.trim().eq_ignore_ascii_case("false") => Mode::Agent,
        _ => Mode::Server,
    }
}
