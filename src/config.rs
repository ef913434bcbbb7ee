//! YAML configuration file.
//!
//! The file is loaded only after flag validation accepted a mode, because
//! which sections are legal depends on it: agent mode has no rule evaluation,
//! alerting or remote read.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::startup::bounds::{format_quantity, parse_duration, Unit, MINUTE, SECOND};
use crate::startup::mode::Mode;
use crate::startup::proto::REGISTRY;

/// Config file used when `--config.file` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "metricsd.yml";

pub const DEFAULT_SCRAPE_INTERVAL_MS: i64 = MINUTE;
pub const DEFAULT_SCRAPE_TIMEOUT_MS: i64 = 10 * SECOND;
pub const DEFAULT_EVALUATION_INTERVAL_MS: i64 = MINUTE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigParseError {
    #[error("couldn't load configuration (--config.file={path:?}) in {mode} mode: {reason}")]
    Read {
        mode: Mode,
        path: String,
        reason: String,
    },
    #[error("couldn't parse configuration (--config.file={path:?}) in {mode} mode: {reason}")]
    Syntax {
        mode: Mode,
        path: String,
        reason: String,
    },
    #[error("invalid configuration (--config.file={path:?}) in {mode} mode: {reason}")]
    Invalid {
        mode: Mode,
        path: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub scrape_configs: Vec<ScrapeConfig>,
    #[serde(default)]
    pub remote_write: Vec<RemoteWriteConfig>,
    #[serde(default)]
    pub rule_files: Vec<String>,
    #[serde(default)]
    pub alerting: Option<AlertingConfig>,
    #[serde(default)]
    pub remote_read: Vec<RemoteReadConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(default)]
    pub scrape_interval: Option<String>,
    #[serde(default)]
    pub scrape_timeout: Option<String>,
    #[serde(default)]
    pub evaluation_interval: Option<String>,
    #[serde(default)]
    pub external_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScrapeConfig {
    pub job_name: String,
    #[serde(default)]
    pub metrics_path: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub scrape_interval: Option<String>,
    #[serde(default)]
    pub scrape_timeout: Option<String>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticConfig {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteWriteConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Wire message used when sending; must be a registered type.
    #[serde(default)]
    pub protobuf_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertingConfig {
    #[serde(default)]
    pub alertmanagers: Vec<AlertmanagerConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AlertmanagerConfig {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteReadConfig {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn label_name_regex() -> &'static Regex {
    static LABEL_NAME_RE: OnceLock<Regex> = OnceLock::new();
    LABEL_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("label pattern is valid"))
}

fn check_labels(labels: &BTreeMap<String, String>, context: &str) -> Result<(), String> {
    match labels.keys().find(|name| !label_name_regex().is_match(name)) {
        Some(name) => Err(format!("{}: {:?} is not a valid label name", context, name)),
        None => Ok(()),
    }
}

fn check_scheme(scheme: Option<&str>, context: &str) -> Result<(), String> {
    match scheme {
        None | Some("http") | Some("https") => Ok(()),
        Some(other) => Err(format!("{}: unsupported scheme {:?}", context, other)),
    }
}

fn interval(raw: Option<&str>, fallback: i64, context: &str) -> Result<i64, String> {
    let Some(raw) = raw else {
        return Ok(fallback);
    };
    match parse_duration(raw) {
        Ok(value) if value > 0 => Ok(value),
        Ok(_) => Err(format!("{}: duration must be positive, got {:?}", context, raw)),
        Err(e) => Err(format!("{}: {}", context, e)),
    }
}

impl ConfigFile {
    /// Parse and validate a config document for `mode`.
    pub fn parse(raw: &str, mode: Mode, path: &str) -> Result<Self, ConfigParseError> {
        let config: ConfigFile = if raw.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(raw).map_err(|e| ConfigParseError::Syntax {
                mode,
                path: path.to_string(),
                reason: e.to_string(),
            })?
        };

        config
            .validate(mode)
            .map_err(|reason| ConfigParseError::Invalid {
                mode,
                path: path.to_string(),
                reason,
            })?;
        Ok(config)
    }

    fn validate(&self, mode: Mode) -> Result<(), String> {
        if mode == Mode::Agent {
            if !self.rule_files.is_empty() {
                return Err("field rule_files is not allowed in agent mode".to_string());
            }
            if self
                .alerting
                .as_ref()
                .is_some_and(|alerting| !alerting.alertmanagers.is_empty())
            {
                return Err("field alerting is not allowed in agent mode".to_string());
            }
            if !self.remote_read.is_empty() {
                return Err("field remote_read is not allowed in agent mode".to_string());
            }
        }

        let global_interval = interval(
            self.global.scrape_interval.as_deref(),
            DEFAULT_SCRAPE_INTERVAL_MS,
            "global.scrape_interval",
        )?;
        let global_timeout = interval(
            self.global.scrape_timeout.as_deref(),
            DEFAULT_SCRAPE_TIMEOUT_MS.min(global_interval),
            "global.scrape_timeout",
        )?;
        if global_timeout > global_interval {
            return Err(format!(
                "global scrape timeout {} greater than scrape interval {}",
                format_quantity(Unit::Duration, global_timeout),
                format_quantity(Unit::Duration, global_interval)
            ));
        }
        interval(
            self.global.evaluation_interval.as_deref(),
            DEFAULT_EVALUATION_INTERVAL_MS,
            "global.evaluation_interval",
        )?;
        check_labels(&self.global.external_labels, "global.external_labels")?;

        let mut jobs = HashSet::new();
        for job in &self.scrape_configs {
            if job.job_name.trim().is_empty() {
                return Err("scrape config with empty job_name".to_string());
            }
            if !jobs.insert(job.job_name.as_str()) {
                return Err(format!("found multiple scrape configs with job name {:?}", job.job_name));
            }
            let context = format!("scrape config {:?}", job.job_name);
            check_scheme(job.scheme.as_deref(), &context)?;

            let job_interval = interval(job.scrape_interval.as_deref(), global_interval, &context)?;
            let job_timeout = interval(
                job.scrape_timeout.as_deref(),
                global_timeout.min(job_interval),
                &context,
            )?;
            if job_timeout > job_interval {
                return Err(format!(
                    "{}: scrape timeout {} greater than scrape interval {}",
                    context,
                    format_quantity(Unit::Duration, job_timeout),
                    format_quantity(Unit::Duration, job_interval)
                ));
            }
            for static_config in &job.static_configs {
                check_labels(&static_config.labels, &context)?;
            }
        }

        for (index, remote) in self.remote_write.iter().enumerate() {
            let context = format!("remote_write[{}]", index);
            let url = Url::parse(&remote.url)
                .map_err(|e| format!("{}: invalid url {:?}: {}", context, remote.url, e))?;
            check_scheme(Some(url.scheme()), &context)?;
            if let Some(message) = remote.protobuf_message.as_deref() {
                REGISTRY
                    .validate(&[message])
                    .map_err(|e| format!("{}: {}", context, e))?;
            }
        }

        for (index, remote) in self.remote_read.iter().enumerate() {
            let context = format!("remote_read[{}]", index);
            let url = Url::parse(&remote.url)
                .map_err(|e| format!("{}: invalid url {:?}: {}", context, remote.url, e))?;
            check_scheme(Some(url.scheme()), &context)?;
        }

        Ok(())
    }
}

/// Read and validate the config file at `path` for `mode`.
pub fn load(path: &Path, mode: Mode) -> Result<ConfigFile, ConfigParseError> {
    let path_str = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigParseError::Read {
        mode,
        path: path_str.clone(),
        reason: e.to_string(),
    })?;

    let config = ConfigFile::parse(&raw, mode, &path_str)?;
    debug!(
        "Loaded {} with {} scrape configs and {} remote write targets",
        path_str,
        config.scrape_configs.len(),
        config.remote_write.len()
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const AGENT_CONFIG: &str = r#"
global:
  scrape_interval: 15s
  external_labels:
    region: eu-west-1
scrape_configs:
  - job_name: metricsd
    static_configs:
      - targets: ["localhost:9090"]
remote_write:
  - url: http://remote.example:9201/write
    protobuf_message: io.prometheus.write.v2.Request
"#;

    const SERVER_CONFIG: &str = r#"
global:
  scrape_interval: 15s
  evaluation_interval: 15s
rule_files:
  - rules/*.yml
alerting:
  alertmanagers:
    - static_configs:
        - targets: ["alertmanager:9093"]
scrape_configs:
  - job_name: metricsd
    static_configs:
      - targets: ["localhost:9090"]
"#;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_agent_config() {
        let file = write_config(AGENT_CONFIG);
        let config = load(file.path(), Mode::Agent).unwrap();
        assert_eq!(config.scrape_configs.len(), 1);
        assert_eq!(config.remote_write[0].protobuf_message.as_deref(), Some("io.prometheus.write.v2.Request"));
        assert_eq!(config.global.external_labels["region"], "eu-west-1");
    }

    #[test]
    fn test_server_config_rejected_in_agent_mode() {
        let err = ConfigFile::parse(SERVER_CONFIG, Mode::Agent, "server.yml").unwrap_err();
        match err {
            ConfigParseError::Invalid { reason, .. } => {
                assert_eq!(reason, "field rule_files is not allowed in agent mode")
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
        assert!(ConfigFile::parse(SERVER_CONFIG, Mode::Server, "server.yml").is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("fake-input-file"), Mode::Agent).unwrap_err();
        assert!(matches!(err, ConfigParseError::Read { .. }));
        assert!(err.to_string().contains("fake-input-file"));
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = ConfigFile::parse("  \n", Mode::Server, "empty.yml").unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = ConfigFile::parse("scrape_config: []\n", Mode::Server, "typo.yml").unwrap_err();
        assert!(matches!(err, ConfigParseError::Syntax { .. }));
    }

    #[test]
    fn test_duplicate_job_names() {
        let raw = r#"
scrape_configs:
  - job_name: node
  - job_name: node
"#;
        let err = ConfigFile::parse(raw, Mode::Server, "dup.yml").unwrap_err();
        assert!(err.to_string().contains("multiple scrape configs"));
    }

    #[test]
    fn test_timeout_exceeds_interval() {
        let raw = r#"
scrape_configs:
  - job_name: node
    scrape_interval: 5s
    scrape_timeout: 10s
"#;
        let err = ConfigFile::parse(raw, Mode::Agent, "slow.yml").unwrap_err();
        assert!(err.to_string().contains("scrape timeout 10s greater than scrape interval 5s"));
    }

    #[test]
    fn test_short_interval_caps_default_timeout() {
        let raw = r#"
global:
  scrape_interval: 5s
"#;
        assert!(ConfigFile::parse(raw, Mode::Agent, "fast.yml").is_ok());
    }

    #[test]
    fn test_invalid_label_name() {
        let raw = r#"
global:
  external_labels:
    "1region": eu
"#;
        let err = ConfigFile::parse(raw, Mode::Server, "labels.yml").unwrap_err();
        assert!(err.to_string().contains("not a valid label name"));
    }

    #[test]
    fn test_remote_write_unknown_message() {
        let raw = r#"
remote_write:
  - url: http://remote.example/write
    protobuf_message: prometheus.WriteRequestV3
"#;
        let err = ConfigFile::parse(raw, Mode::Agent, "rw.yml").unwrap_err();
        assert!(err.to_string().contains("prometheus.WriteRequestV3"));
    }

    #[test]
    fn test_remote_read_bad_scheme() {
        let raw = r#"
remote_read:
  - url: file:///var/lib/metricsd/read
"#;
        let err = ConfigFile::parse(raw, Mode::Server, "rr.yml").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration (--config.file=\"rr.yml\") in server mode: \
             remote_read[0]: unsupported scheme \"file\""
        );
    }

    #[test]
    fn test_remote_write_bad_url() {
        let raw = r#"
remote_write:
  - url: ftp://remote.example/write
"#;
        let err = ConfigFile::parse(raw, Mode::Agent, "rw.yml").unwrap_err();
        assert!(err.to_string().contains("unsupported scheme \"ftp\""));
    }
}
