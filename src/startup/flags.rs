//! Immutable view of the flags given on the command line.
//!
//! A `FlagSet` only contains flags the operator actually passed. Defaults are
//! applied later by the runtime, so presence checks here are meaningful.

use serde::Serialize;
use std::collections::BTreeMap;

pub const LISTEN_ADDRESS: &str = "web.listen-address";
pub const EXTERNAL_URL: &str = "web.external-url";
pub const CONFIG_FILE: &str = "config.file";
pub const ENABLE_ADMIN_API: &str = "web.enable-admin-api";
pub const ENABLE_REMOTE_WRITE_RECEIVER: &str = "web.enable-remote-write-receiver";
pub const ACCEPTED_PROTOBUF_MESSAGES: &str =
    "web.remote-write-receiver.accepted-protobuf-messages";
pub const TSDB_PATH: &str = "storage.tsdb.path";
pub const TSDB_RETENTION_TIME: &str = "storage.tsdb.retention.time";
pub const TSDB_WAL_SEGMENT_SIZE: &str = "storage.tsdb.wal-segment-size";
pub const TSDB_MAX_BLOCK_CHUNK_SEGMENT_SIZE: &str = "storage.tsdb.max-block-chunk-segment-size";
pub const AGENT_PATH: &str = "storage.agent.path";
pub const AGENT_WAL_SEGMENT_SIZE: &str = "storage.agent.wal-segment-size";
pub const AGENT_RETENTION_MAX_TIME: &str = "storage.agent.retention.max-time";

/// Flag name -> raw string value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FlagSet {
    values: BTreeMap<String, String>,
}

impl FlagSet {
    /// Whether the flag was given at all.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Raw value of a flag, if given.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Number of flags given.
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl<K, V> FromIterator<(K, V)> for FlagSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
