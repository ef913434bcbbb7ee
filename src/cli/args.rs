use clap::{Parser, ValueEnum};

use crate::startup::flags::{self, FlagSet};
use crate::startup::mode::AGENT_FLAG;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Logfmt,
    Json,
}

// Value flags carry no clap defaults: only what the operator passed ends up
// in the FlagSet. Defaults are applied by the runtime after validation.

/// metricsd - metrics collection server and forwarding agent
#[derive(Debug, Parser)]
#[command(name = "metricsd")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address to listen on for the web interface and telemetry [default: 0.0.0.0:9090]
    #[arg(long = "web.listen-address")]
    pub listen_address: Option<String>,

    /// URL under which the server is externally reachable
    #[arg(long = "web.external-url")]
    pub external_url: Option<String>,

    /// Configuration file path [default: metricsd.yml]
    #[arg(long = "config.file")]
    pub config_file: Option<String>,

    /// Run in agent mode: scrape and forward via remote write, no local query or admin API
    #[arg(long)]
    pub agent: bool,

    /// Enable API endpoints for admin control actions (server mode only)
    #[arg(long = "web.enable-admin-api")]
    pub enable_admin_api: bool,

    /// Accept remote write requests (server mode only)
    #[arg(long = "web.enable-remote-write-receiver")]
    pub enable_remote_write_receiver: bool,

    /// Protobuf message types the remote write receiver accepts (comma separated or repeated)
    #[arg(
        long = "web.remote-write-receiver.accepted-protobuf-messages",
        value_delimiter = ','
    )]
    pub accepted_protobuf_messages: Vec<String>,

    /// Base path for metrics storage (server mode only)
    #[arg(long = "storage.tsdb.path")]
    pub tsdb_path: Option<String>,

    /// How long to retain samples in storage, e.g. 15d (server mode only)
    #[arg(long = "storage.tsdb.retention.time")]
    pub tsdb_retention_time: Option<String>,

    /// Size at which to split the WAL segment files, e.g. 100MB (server mode only)
    #[arg(long = "storage.tsdb.wal-segment-size")]
    pub tsdb_wal_segment_size: Option<String>,

    /// Maximum size for a single chunk segment in a block, e.g. 512MB (server mode only)
    #[arg(long = "storage.tsdb.max-block-chunk-segment-size")]
    pub tsdb_max_block_chunk_segment_size: Option<String>,

    /// Base path for agent WAL storage (agent mode only) [default: data-agent/]
    #[arg(long = "storage.agent.path")]
    pub agent_path: Option<String>,

    /// Size at which to split the agent WAL segment files, e.g. 100MB (agent mode only)
    #[arg(long = "storage.agent.wal-segment-size")]
    pub agent_wal_segment_size: Option<String>,

    /// Maximum age samples may be kept in the WAL before being dropped (agent mode only)
    #[arg(long = "storage.agent.retention.max-time")]
    pub agent_retention_max_time: Option<String>,

    /// Only log messages with the given severity or above
    #[arg(long = "log.level", env = "METRICSD_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Output format of log messages
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Logfmt)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Flags relevant to startup validation, exactly as given.
    pub fn flag_set(&self) -> FlagSet {
        let values = [
            (flags::LISTEN_ADDRESS, &self.listen_address),
            (flags::EXTERNAL_URL, &self.external_url),
            (flags::CONFIG_FILE, &self.config_file),
            (flags::TSDB_PATH, &self.tsdb_path),
            (flags::TSDB_RETENTION_TIME, &self.tsdb_retention_time),
            (flags::TSDB_WAL_SEGMENT_SIZE, &self.tsdb_wal_segment_size),
            (
                flags::TSDB_MAX_BLOCK_CHUNK_SEGMENT_SIZE,
                &self.tsdb_max_block_chunk_segment_size,
            ),
            (flags::AGENT_PATH, &self.agent_path),
            (flags::AGENT_WAL_SEGMENT_SIZE, &self.agent_wal_segment_size),
            (flags::AGENT_RETENTION_MAX_TIME, &self.agent_retention_max_time),
        ];
        let switches = [
            (AGENT_FLAG, self.agent),
            (flags::ENABLE_ADMIN_API, self.enable_admin_api),
            (
                flags::ENABLE_REMOTE_WRITE_RECEIVER,
                self.enable_remote_write_receiver,
            ),
        ];

        let mut pairs: Vec<(&'static str, String)> = values
            .into_iter()
            .filter_map(|(name, value)| value.clone().map(|v| (name, v)))
            .collect();
        pairs.extend(
            switches
                .into_iter()
                .filter(|(_, on)| *on)
                .map(|(name, _)| (name, "true".to_string())),
        );
        if !self.accepted_protobuf_messages.is_empty() {
            pairs.push((
                flags::ACCEPTED_PROTOBUF_MESSAGES,
                self.accepted_protobuf_messages.join(","),
            ));
        }

        pairs.into_iter().collect()
    }
}
