//! Startup validation and mode gating.
//!
//! Before anything binds a socket or touches storage, the command line is
//! checked in a fixed order:
//! - mode resolution (`--agent` or not)
//! - mode-specific flag constraints
//! - numeric bounds on storage sizing and retention flags
//! - remote-write protobuf message negotiation
//!
//! The first failure rejects the start with a single diagnostic and exit
//! status 1. Nothing here reads global state; the pipeline is a pure function
//! of the [`FlagSet`](flags::FlagSet).

pub mod bounds;
pub mod constraints;
mod ensure;
pub mod flags;
pub mod mode;
pub mod proto;

pub use ensure::{StartupSequencer, StartupState, ValidationVerdict};
pub use mode::Mode;
