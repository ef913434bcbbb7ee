//! Startup sequencer: the fixed validation pipeline.
//!
//! ```text
//! Init -> ModeResolved -> ConstraintsChecked -> BoundsChecked -> ProtoChecked -> Accepted
//!           \________________\______________________\______________\-> Rejected
//! ```
//!
//! Every step is pure. The first failing step decides the verdict and no
//! later step runs, so each failed start produces exactly one diagnostic.
//! Loading the config file happens in [`StartupSequencer::admit`], after
//! the flag pipeline has accepted a mode.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use super::bounds::{self, BoundSpec, BoundsViolation};
use super::constraints::{self, ConstraintRule, ConstraintViolation};
use super::flags::{self, FlagSet};
use super::mode::{self, Mode};
use super::proto::{self, ProtoMessageRegistry, ProtoMessageType, ProtoViolation};
use crate::config::{self, ConfigFile, ConfigParseError, DEFAULT_CONFIG_FILE};

/// Category of a rejected start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConstraintViolation,
    BoundsViolation,
    ProtoViolation,
    ConfigParseError,
}

/// Why a start was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartupError {
    #[error("{0}")]
    Constraint(#[from] ConstraintViolation),
    #[error("{0}")]
    Bounds(#[from] BoundsViolation),
    #[error("{0}")]
    Proto(#[from] ProtoViolation),
    #[error("{0}")]
    Config(#[from] ConfigParseError),
}

impl StartupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StartupError::Constraint(_) => ErrorKind::ConstraintViolation,
            StartupError::Bounds(_) => ErrorKind::BoundsViolation,
            StartupError::Proto(_) => ErrorKind::ProtoViolation,
            StartupError::Config(_) => ErrorKind::ConfigParseError,
        }
    }

    /// Flag the diagnostic is about.
    pub fn flag(&self) -> &'static str {
        match self {
            StartupError::Constraint(violation) => violation.flag,
            StartupError::Bounds(violation) => violation.flag(),
            StartupError::Proto(violation) => violation.flag,
            StartupError::Config(_) => flags::CONFIG_FILE,
        }
    }

    /// Last stage that completed before the failure.
    pub fn stage(&self) -> StartupStage {
        match self {
            StartupError::Constraint(_) => StartupStage::ModeResolved,
            StartupError::Bounds(_) => StartupStage::ConstraintsChecked,
            StartupError::Proto(_) => StartupStage::BoundsChecked,
            StartupError::Config(_) => StartupStage::ProtoChecked,
        }
    }
}

/// Result type for startup checks.
pub type EnsureResult<T> = std::result::Result<T, StartupError>;

/// Progress through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StartupStage {
    Init,
    ModeResolved,
    ConstraintsChecked,
    BoundsChecked,
    ProtoChecked,
}

impl fmt::Display for StartupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupStage::Init => "init",
            StartupStage::ModeResolved => "mode resolved",
            StartupStage::ConstraintsChecked => "constraints checked",
            StartupStage::BoundsChecked => "bounds checked",
            StartupStage::ProtoChecked => "proto checked",
        })
    }
}

/// Outcome of one startup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(Mode),
    Rejected(StartupError),
}

impl ValidationVerdict {
    /// Process exit status a rejected verdict maps to.
    pub fn exit_code(&self) -> u8 {
        match self {
            ValidationVerdict::Accepted(_) => 0,
            ValidationVerdict::Rejected(_) => 1,
        }
    }
}

impl<T> From<EnsureResult<T>> for ValidationVerdict
where
    T: Into<Mode>,
{
    fn from(result: EnsureResult<T>) -> Self {
        match result {
            Ok(accepted) => ValidationVerdict::Accepted(accepted.into()),
            Err(err) => ValidationVerdict::Rejected(err),
        }
    }
}

/// Everything validated at startup, handed to the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupState {
    pub mode: Mode,
    pub flags: FlagSet,
    pub config_path: PathBuf,
    pub config: ConfigFile,
    /// Message types the remote-write receiver accepts.
    pub accepted_messages: BTreeSet<ProtoMessageType>,
}

impl From<StartupState> for Mode {
    fn from(state: StartupState) -> Self {
        state.mode
    }
}

/// Runs the validation pipeline over a rule table, a bounds table and a
/// message registry.
#[derive(Debug, Clone, Copy)]
pub struct StartupSequencer {
    rules: &'static [ConstraintRule],
    bounds: &'static [BoundSpec],
    registry: ProtoMessageRegistry,
}

impl Default for StartupSequencer {
    fn default() -> Self {
        Self::new(constraints::RULES, bounds::BOUNDS, proto::REGISTRY)
    }
}

impl StartupSequencer {
    pub fn new(
        rules: &'static [ConstraintRule],
        bounds: &'static [BoundSpec],
        registry: ProtoMessageRegistry,
    ) -> Self {
        Self {
            rules,
            bounds,
            registry,
        }
    }

    fn check(&self, flags: &FlagSet) -> EnsureResult<Mode> {
        debug!("Startup stage {}: {} flags given", StartupStage::Init, flags.len());

        let mode = mode::resolve(flags);
        debug!("Startup stage {}: {} mode", StartupStage::ModeResolved, mode);

        constraints::enforce_with(self.rules, mode, flags)?;
        debug!("Startup stage {}", StartupStage::ConstraintsChecked);

        bounds::validate_with(self.bounds, mode, flags)?;
        debug!("Startup stage {}", StartupStage::BoundsChecked);

        let accepted = self.registry.validate_flags(mode, flags)?;
        debug!(
            "Startup stage {}: {} message types accepted",
            StartupStage::ProtoChecked,
            accepted.len()
        );

        Ok(mode)
    }

    /// Validate the flags and decide the mode. Performs no I/O.
    pub fn run(&self, flags: &FlagSet) -> ValidationVerdict {
        self.check(flags).into()
    }

    /// Load the config file for a mode [`run`](Self::run) accepted and
    /// collect everything the runtime needs.
    pub fn admit(&self, mode: Mode, flags: FlagSet) -> EnsureResult<StartupState> {
        let accepted_messages = self.registry.validate_flags(mode, &flags)?;

        let config_path =
            PathBuf::from(flags.get(flags::CONFIG_FILE).unwrap_or(DEFAULT_CONFIG_FILE));
        let config = config::load(&config_path, mode)?;

        info!(
            "Startup validation passed: {} mode, config {}",
            mode,
            config_path.display()
        );

        Ok(StartupState {
            mode,
            flags,
            config_path,
            config,
            accepted_messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::startup::constraints::Policy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const AGENT_CONFIG: &str = r#"
scrape_configs:
  - job_name: metricsd
    static_configs:
      - targets: ["localhost:9090"]
remote_write:
  - url: http://remote.example:9201/write
"#;

    fn agent_config_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(AGENT_CONFIG.as_bytes()).unwrap();
        file
    }

    fn path_of(file: &NamedTempFile) -> String {
        file.path().display().to_string()
    }

    fn start(sequencer: &StartupSequencer, flags: FlagSet) -> EnsureResult<StartupState> {
        match sequencer.run(&flags) {
            ValidationVerdict::Accepted(mode) => sequencer.admit(mode, flags),
            ValidationVerdict::Rejected(err) => Err(err),
        }
    }

    fn rejected_kind(verdict: &ValidationVerdict) -> Option<ErrorKind> {
        match verdict {
            ValidationVerdict::Rejected(err) => Some(err.kind()),
            ValidationVerdict::Accepted(_) => None,
        }
    }

    #[test]
    fn test_agent_accepted() {
        let file = agent_config_file();
        let flags = FlagSet::from_iter([
            ("agent".to_string(), "true".to_string()),
            (flags::CONFIG_FILE.to_string(), path_of(&file)),
        ]);
        let sequencer = StartupSequencer::default();

        assert_eq!(sequencer.run(&flags), ValidationVerdict::Accepted(Mode::Agent));

        let state = start(&sequencer, flags).unwrap();
        assert_eq!(state.mode, Mode::Agent);
        assert_eq!(state.config.scrape_configs.len(), 1);
        assert_eq!(state.accepted_messages.len(), 2);
    }

    #[test]
    fn test_agent_with_admin_api_rejected() {
        let file = agent_config_file();
        let flags = FlagSet::from_iter([
            ("agent".to_string(), "true".to_string()),
            (flags::CONFIG_FILE.to_string(), path_of(&file)),
            (flags::ENABLE_ADMIN_API.to_string(), "true".to_string()),
        ]);
        let verdict = StartupSequencer::default().run(&flags);
        assert_eq!(rejected_kind(&verdict), Some(ErrorKind::ConstraintViolation));
        assert_eq!(verdict.exit_code(), 1);

        match verdict {
            ValidationVerdict::Rejected(StartupError::Constraint(violation)) => {
                assert_eq!(violation.flag, flags::ENABLE_ADMIN_API);
                assert_eq!(violation.policy, Policy::Forbidden);
            }
            other => panic!("Expected constraint violation, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_config_file_rejected_in_any_mode() {
        let sequencer = StartupSequencer::default();
        for extra in [("agent", "true"), (flags::TSDB_PATH, "data/")] {
            let flags = FlagSet::from_iter([(flags::CONFIG_FILE, "fake-input-file"), extra]);
            let verdict: ValidationVerdict = start(&sequencer, flags).into();
            assert_eq!(rejected_kind(&verdict), Some(ErrorKind::ConfigParseError));
            assert_eq!(verdict.exit_code(), 1);
        }
    }

    #[test]
    fn test_server_mode_with_agent_invocation_rejected() {
        let file = agent_config_file();
        let flags = FlagSet::from_iter([(flags::CONFIG_FILE.to_string(), path_of(&file))]);
        let verdict = StartupSequencer::default().run(&flags);
        assert_eq!(rejected_kind(&verdict), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_server_mode_accepted_with_tsdb_path() {
        let file = agent_config_file();
        let flags = FlagSet::from_iter([
            (flags::CONFIG_FILE.to_string(), path_of(&file)),
            (flags::TSDB_PATH.to_string(), "data/".to_string()),
            (flags::ENABLE_ADMIN_API.to_string(), "true".to_string()),
        ]);
        let state = start(&StartupSequencer::default(), flags).unwrap();
        assert_eq!(state.mode, Mode::Server);
    }

    #[test]
    fn test_bounds_checked_after_constraints() {
        let flags = FlagSet::from_iter([
            (flags::TSDB_PATH, "data/"),
            (flags::TSDB_WAL_SEGMENT_SIZE, "0"),
        ]);
        match StartupSequencer::default().run(&flags) {
            ValidationVerdict::Rejected(StartupError::Bounds(violation)) => {
                assert!(matches!(violation, BoundsViolation::OutOfRange { .. }));
            }
            other => panic!("Expected bounds violation, got {:?}", other),
        }

        // Constraint failures short-circuit before the bad size is looked at.
        let flags = FlagSet::from_iter([(flags::TSDB_WAL_SEGMENT_SIZE, "0")]);
        let verdict = StartupSequencer::default().run(&flags);
        assert_eq!(rejected_kind(&verdict), Some(ErrorKind::ConstraintViolation));
    }

    #[test]
    fn test_proto_messages_validated() {
        let sequencer = StartupSequencer::default();
        let flags = FlagSet::from_iter([
            (flags::TSDB_PATH, "data/"),
            (
                flags::ACCEPTED_PROTOBUF_MESSAGES,
                "prometheus.WriteRequest,io.prometheus.write.v2.Request",
            ),
        ]);
        assert_eq!(sequencer.run(&flags), ValidationVerdict::Accepted(Mode::Server));

        let flags = FlagSet::from_iter([
            (flags::TSDB_PATH, "data/"),
            (flags::ACCEPTED_PROTOBUF_MESSAGES, "unknown1,unknown2"),
        ]);
        match sequencer.run(&flags) {
            ValidationVerdict::Rejected(err @ StartupError::Proto(_)) => {
                assert_eq!(err.stage(), StartupStage::BoundsChecked);
                assert!(err.to_string().contains("\"unknown1\""));
                assert!(!err.to_string().contains("unknown2"));
            }
            other => panic!("Expected proto violation, got {:?}", other),
        }
    }

    #[test]
    fn test_diagnostic_line_per_error_kind() {
        let sequencer = StartupSequencer::default();
        let cases = [
            (
                FlagSet::from_iter([("agent", "true"), (flags::ENABLE_ADMIN_API, "true")]),
                flags::ENABLE_ADMIN_API,
                "flag --web.enable-admin-api=\"true\" enables a server-only capability \
                 and is forbidden in agent mode",
            ),
            (
                FlagSet::from_iter([("agent", "true"), (flags::AGENT_WAL_SEGMENT_SIZE, "1GB")]),
                flags::AGENT_WAL_SEGMENT_SIZE,
                "value \"1GB\" for flag --storage.agent.wal-segment-size is out of range \
                 in agent mode: must be between 10MiB and 256MiB",
            ),
            (
                FlagSet::from_iter([
                    (flags::TSDB_PATH, "data/"),
                    (flags::ACCEPTED_PROTOBUF_MESSAGES, "unknown1"),
                ]),
                flags::ACCEPTED_PROTOBUF_MESSAGES,
                "flag --web.remote-write-receiver.accepted-protobuf-messages names unknown \
                 remote-write protobuf message \"unknown1\" in server mode, supported: \
                 prometheus.WriteRequest, io.prometheus.write.v2.Request",
            ),
        ];
        for (flags, flag, expected) in cases {
            match sequencer.run(&flags) {
                ValidationVerdict::Rejected(err) => {
                    assert_eq!(err.flag(), flag);
                    assert_eq!(err.to_string(), expected);
                }
                other => panic!("Expected rejection for {}, got {:?}", flag, other),
            }
        }

        let flags = FlagSet::from_iter([("agent", "true"), (flags::CONFIG_FILE, "fake-input-file")]);
        let err = start(&sequencer, flags).unwrap_err();
        assert_eq!(err.flag(), flags::CONFIG_FILE);
        assert!(err
            .to_string()
            .starts_with("couldn't load configuration (--config.file=\"fake-input-file\") in agent mode: "));
    }

    #[test]
    fn test_run_is_idempotent() {
        let sequencer = StartupSequencer::default();
        let cases = [
            FlagSet::from_iter([("agent", "true")]),
            FlagSet::from_iter([("agent", "true"), (flags::ENABLE_ADMIN_API, "true")]),
            FlagSet::from_iter([(flags::TSDB_PATH, "data/"), (flags::TSDB_RETENTION_TIME, "x")]),
        ];
        for flags in cases {
            assert_eq!(sequencer.run(&flags), sequencer.run(&flags));
        }
    }

    #[test]
    fn test_custom_tables() {
        static RULES: [ConstraintRule; 0] = [];
        static BOUNDS: [BoundSpec; 0] = [];
        static ONLY_V1: [ProtoMessageType; 1] = [ProtoMessageType::WriteV1];
        let sequencer =
            StartupSequencer::new(&RULES, &BOUNDS, ProtoMessageRegistry::new(&ONLY_V1));

        let flags = FlagSet::from_iter([(flags::TSDB_WAL_SEGMENT_SIZE, "0")]);
        assert_eq!(sequencer.run(&flags), ValidationVerdict::Accepted(Mode::Server));

        let flags = FlagSet::from_iter([(
            flags::ACCEPTED_PROTOBUF_MESSAGES,
            "io.prometheus.write.v2.Request",
        )]);
        let verdict = sequencer.run(&flags);
        assert_eq!(rejected_kind(&verdict), Some(ErrorKind::ProtoViolation));
    }
}
