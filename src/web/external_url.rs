//! External URL the server is reachable under.

use thiserror::Error;
use url::{Position, Url};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalUrlError {
    #[error("listen address {0:?} has no port")]
    MissingPort(String),
    #[error("URL must not begin or end with quotes: {0}")]
    Quoted(String),
    #[error("invalid external URL {url:?}: {reason}")]
    Invalid { url: String, reason: String },
    #[error("external URL {0:?} must use http or https")]
    Scheme(String),
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

fn listen_port(listen_address: &str) -> Option<&str> {
    listen_address
        .rsplit_once(':')
        .map(|(_, port)| port)
        .filter(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

fn is_quoted(raw: &str) -> bool {
    const QUOTES: [char; 3] = ['\'', '"', '`'];
    raw.starts_with(QUOTES) || raw.ends_with(QUOTES)
}

/// Compute the external URL from `--web.external-url` and the listen address.
///
/// Without an explicit URL, `http://<hostname>:<listen port>` is used. The
/// result never ends in `/`.
pub fn compute_external_url(
    external: Option<&str>,
    listen_address: &str,
) -> Result<String, ExternalUrlError> {
    let raw = match external.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let port = listen_port(listen_address)
                .ok_or_else(|| ExternalUrlError::MissingPort(listen_address.to_string()))?;
            format!("http://{}:{}", hostname(), port)
        }
    };

    if is_quoted(&raw) {
        return Err(ExternalUrlError::Quoted(raw));
    }

    let url = Url::parse(&raw).map_err(|e| ExternalUrlError::Invalid {
        url: raw.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ExternalUrlError::Scheme(raw));
    }

    let prefix = url.path().trim_end_matches('/');
    Ok(format!("{}{}", &url[..Position::BeforePath], prefix))
}
