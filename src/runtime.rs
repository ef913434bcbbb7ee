//! Process-lifetime runtime settings.
//!
//! A [`Runtime`] is assembled once from a validated [`StartupState`]. This is
//! where defaults for flags the operator did not pass are filled in; the
//! validation pipeline itself never applies defaults.
//!
//! ```ignore
//! let state = match sequencer.run(&flags) {
//!     ValidationVerdict::Accepted(mode) => sequencer.admit(mode, flags)?,
//!     ValidationVerdict::Rejected(err) => return Err(err.into()),
//! };
//! let runtime = Arc::new(Runtime::assemble(state)?);
//! runtime.prepare_storage()?;
//! web::serve(runtime).await?;
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::startup::bounds::{self, Unit, DAY, MIB};
use crate::startup::flags::{self, FlagSet};
use crate::startup::proto::ProtoMessageType;
use crate::startup::{Mode, StartupState};
use crate::web::external_url::compute_external_url;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9090";
pub const DEFAULT_AGENT_PATH: &str = "data-agent/";
pub const DEFAULT_WAL_SEGMENT_SIZE: i64 = 128 * MIB;
pub const DEFAULT_MAX_BLOCK_CHUNK_SEGMENT_SIZE: i64 = 512 * MIB;
pub const DEFAULT_TSDB_RETENTION: i64 = 15 * DAY;

/// Resolved storage settings for the active mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSettings {
    pub path: PathBuf,
    pub wal_segment_size: i64,
    /// Server mode only.
    pub max_block_chunk_segment_size: Option<i64>,
    /// Retention in milliseconds; `None` keeps data until forwarded.
    pub retention: Option<i64>,
}

/// Runtime configuration containing all process-lifetime state.
#[derive(Debug)]
pub struct Runtime {
    pub mode: Mode,
    pub flags: FlagSet,
    pub config_path: PathBuf,
    pub config: ConfigFile,
    pub listen_address: String,
    pub external_url: String,
    pub storage: StorageSettings,
    pub admin_api_enabled: bool,
    pub remote_write_receiver_enabled: bool,
    pub accepted_messages: BTreeSet<ProtoMessageType>,
    pub started_at: DateTime<Utc>,
}

fn quantity(flags: &FlagSet, name: &str, unit: Unit) -> Result<Option<i64>> {
    flags
        .get(name)
        .map(|raw| bounds::parse_quantity(unit, raw).map_err(|e| anyhow!("--{}: {}", name, e)))
        .transpose()
}

fn switch(flags: &FlagSet, name: &str) -> bool {
    flags
        .get(name)
        .is_some_and(|value| !value.eq_ignore_ascii_case("false"))
}

/// A bare `:port` listens on every interface.
pub fn normalize_listen_address(raw: &str) -> String {
    if raw.starts_with(':') {
        format!("0.0.0.0{}", raw)
    } else {
        raw.to_string()
    }
}

impl Runtime {
    /// Apply defaults and derive settings from validated startup state.
    pub fn assemble(state: StartupState) -> Result<Self> {
        let StartupState {
            mode,
            flags,
            config_path,
            config,
            accepted_messages,
        } = state;

        let listen_address = normalize_listen_address(
            flags.get(flags::LISTEN_ADDRESS).unwrap_or(DEFAULT_LISTEN_ADDRESS),
        );
        let external_url = compute_external_url(flags.get(flags::EXTERNAL_URL), &listen_address)
            .context("Failed to determine external URL")?;

        let storage = match mode {
            Mode::Server => StorageSettings {
                path: PathBuf::from(
                    flags
                        .get(flags::TSDB_PATH)
                        .context("--storage.tsdb.path is required in server mode")?,
                ),
                wal_segment_size: quantity(&flags, flags::TSDB_WAL_SEGMENT_SIZE, Unit::Bytes)?
                    .unwrap_or(DEFAULT_WAL_SEGMENT_SIZE),
                max_block_chunk_segment_size: Some(
                    quantity(&flags, flags::TSDB_MAX_BLOCK_CHUNK_SEGMENT_SIZE, Unit::Bytes)?
                        .unwrap_or(DEFAULT_MAX_BLOCK_CHUNK_SEGMENT_SIZE),
                ),
                retention: Some(
                    quantity(&flags, flags::TSDB_RETENTION_TIME, Unit::Duration)?
                        .filter(|ms| *ms > 0)
                        .unwrap_or(DEFAULT_TSDB_RETENTION),
                ),
            },
            Mode::Agent => StorageSettings {
                path: PathBuf::from(flags.get(flags::AGENT_PATH).unwrap_or(DEFAULT_AGENT_PATH)),
                wal_segment_size: quantity(&flags, flags::AGENT_WAL_SEGMENT_SIZE, Unit::Bytes)?
                    .unwrap_or(DEFAULT_WAL_SEGMENT_SIZE),
                max_block_chunk_segment_size: None,
                retention: quantity(&flags, flags::AGENT_RETENTION_MAX_TIME, Unit::Duration)?
                    .filter(|ms| *ms > 0),
            },
        };

        let admin_api_enabled = switch(&flags, flags::ENABLE_ADMIN_API);
        let remote_write_receiver_enabled = switch(&flags, flags::ENABLE_REMOTE_WRITE_RECEIVER);

        debug!(
            "Assembled {} runtime: storage {}, WAL segments {}",
            mode,
            storage.path.display(),
            bounds::format_quantity(Unit::Bytes, storage.wal_segment_size)
        );

        Ok(Self {
            mode,
            flags,
            config_path,
            config,
            listen_address,
            external_url,
            storage,
            admin_api_enabled,
            remote_write_receiver_enabled,
            accepted_messages,
            started_at: Utc::now(),
        })
    }

    /// Create the storage directory for the active mode.
    pub fn prepare_storage(&self) -> Result<()> {
        std::fs::create_dir_all(&self.storage.path).with_context(|| {
            format!(
                "Failed to create storage directory: {:?}",
                self.storage.path
            )
        })?;
        info!("Using {} storage at {}", self.mode, self.storage.path.display());
        Ok(())
    }
}
