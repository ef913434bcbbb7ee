//! HTTP surface served once startup validation has accepted a mode.

pub mod external_url;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::runtime::Runtime;
use crate::telemetry;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn router(runtime: Arc<Runtime>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/-/healthy", get(healthy))
        .route("/-/ready", get(ready))
        .route("/api/v1/status/flags", get(status_flags))
        .route("/api/v1/status/runtimeinfo", get(runtime_info))
        .with_state(runtime)
}

async fn metrics(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)],
        telemetry::render(&runtime, Utc::now()),
    )
}

async fn healthy() -> &'static str {
    "Metricsd Server is Healthy.\n"
}

async fn ready() -> &'static str {
    "Metricsd Server is Ready.\n"
}

async fn status_flags(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(json!({ "status": "success", "data": runtime.flags }))
}

async fn runtime_info(State(runtime): State<Arc<Runtime>>) -> impl IntoResponse {
    Json(json!({
        "status": "success",
        "data": {
            "mode": runtime.mode,
            "startTime": runtime.started_at.to_rfc3339(),
            "configFile": runtime.config_path.display().to_string(),
            "externalUrl": runtime.external_url,
            "storage": runtime.storage,
            "adminApiEnabled": runtime.admin_api_enabled,
            "remoteWriteReceiverEnabled": runtime.remote_write_receiver_enabled,
            "acceptedProtobufMessages": runtime
                .accepted_messages
                .iter()
                .map(|message| message.as_str())
                .collect::<Vec<_>>(),
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Received shutdown signal, exiting gracefully...");
}

/// Bind the listen address and serve until SIGINT or SIGTERM.
pub async fn serve(runtime: Arc<Runtime>) -> Result<()> {
    let listener = TcpListener::bind(&runtime.listen_address)
        .await
        .with_context(|| format!("Failed to listen on {}", runtime.listen_address))?;
    info!(
        "Serving {} mode on {} (external URL {})",
        runtime.mode,
        listener.local_addr()?,
        runtime.external_url
    );

    axum::serve(listener, router(runtime))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    Ok(())
}
