//! Self-monitoring gauges in the text exposition format.
//!
//! Only process-level gauges live here. Their presence on `/metrics` is what
//! health checks use to confirm the process reached its serving state.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::runtime::Runtime;
use crate::startup::Mode;

/// Gauge whose presence confirms the process is serving.
pub const TIME_METRIC: &str = "metricsd_time_seconds";

struct Family {
    name: &'static str,
    help: &'static str,
    samples: Vec<(Vec<(&'static str, String)>, f64)>,
}

/// Ordered collection of gauge families.
#[derive(Default)]
pub struct Exposition {
    families: Vec<Family>,
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('"', "\\\"")
        .replace('\n', r"\n")
}

fn seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

impl Exposition {
    /// Add one gauge sample. Samples sharing a name share HELP and TYPE lines.
    pub fn gauge(
        &mut self,
        name: &'static str,
        help: &'static str,
        labels: Vec<(&'static str, String)>,
        value: f64,
    ) -> &mut Self {
        match self.families.iter_mut().find(|family| family.name == name) {
            Some(family) => family.samples.push((labels, value)),
            None => self.families.push(Family {
                name,
                help,
                samples: vec![(labels, value)],
            }),
        }
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for family in &self.families {
            let _ = writeln!(out, "# HELP {} {}", family.name, family.help);
            let _ = writeln!(out, "# TYPE {} gauge", family.name);
            for (labels, value) in &family.samples {
                out.push_str(family.name);
                if !labels.is_empty() {
                    let rendered: Vec<String> = labels
                        .iter()
                        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                        .collect();
                    let _ = write!(out, "{{{}}}", rendered.join(","));
                }
                let _ = writeln!(out, " {}", value);
            }
        }
        out
    }
}

/// Build the process gauges for `runtime` as of `now`.
pub fn collect(runtime: &Runtime, now: DateTime<Utc>) -> Exposition {
    let mut exposition = Exposition::default();
    exposition
        .gauge(
            TIME_METRIC,
            "Current system time in seconds since the epoch.",
            vec![],
            seconds(now),
        )
        .gauge(
            "metricsd_start_time_seconds",
            "Time the process started in seconds since the epoch.",
            vec![],
            seconds(runtime.started_at),
        )
        .gauge(
            "metricsd_ready",
            "Whether startup validation passed and the server is serving.",
            vec![],
            1.0,
        )
        .gauge(
            "metricsd_build_info",
            "Build information.",
            vec![("version", env!("CARGO_PKG_VERSION").to_string())],
            1.0,
        )
        .gauge(
            "metricsd_mode",
            "Operating mode of the process.",
            vec![("mode", runtime.mode.to_string())],
            1.0,
        )
        .gauge(
            "metricsd_config_last_reload_successful",
            "Whether the last configuration load succeeded.",
            vec![],
            1.0,
        )
        .gauge(
            "metricsd_config_last_reload_success_timestamp_seconds",
            "Timestamp of the last successful configuration load.",
            vec![],
            seconds(runtime.started_at),
        )
        .gauge(
            "metricsd_storage_wal_segment_size_bytes",
            "Configured WAL segment size.",
            vec![],
            runtime.storage.wal_segment_size as f64,
        );

    if runtime.mode == Mode::Server {
        for message in &runtime.accepted_messages {
            exposition.gauge(
                "metricsd_remote_write_accepted_message",
                "Remote-write protobuf messages the receiver accepts.",
                vec![("type", message.to_string())],
                1.0,
            );
        }
    }

    exposition
}

/// Render the `/metrics` body.
pub fn render(runtime: &Runtime, now: DateTime<Utc>) -> String {
    collect(runtime, now).render()
}
