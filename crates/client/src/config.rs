//! Client configuration from environment variables.

use std::time::Duration;

use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::ws::ReconnectConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const WS_PATH: &str = "/ws";

/// Everything needed to build a [`crate::ConnectionManager`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// The single real-time endpoint, e.g. `wss://social.example.com/ws`.
    pub ws_url: String,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Environment variables:
    /// - `HUDDLE_WS_URL`: explicit `ws://`/`wss://` endpoint (takes precedence)
    /// - `HUDDLE_BASE_URL`: deployment host the endpoint is derived from
    ///   (default: "http://localhost:8080")
    /// - `HUDDLE_WS_MAX_RECONNECT_ATTEMPTS`: automatic retry budget (default: 5)
    /// - `HUDDLE_WS_RECONNECT_DELAY_MS`: fixed delay between retries (default: 3000)
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let ws_url = match lookup("HUDDLE_WS_URL") {
            Some(explicit) => validate_ws_url(&explicit)?,
            None => {
                let base = lookup("HUDDLE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
                ws_url_for_base(&base)?
            }
        };

        let mut reconnect = ReconnectConfig::default();
        if let Some(raw) = lookup("HUDDLE_WS_MAX_RECONNECT_ATTEMPTS") {
            reconnect.max_attempts = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!(
                    "HUDDLE_WS_MAX_RECONNECT_ATTEMPTS must be a non-negative integer, got {:?}",
                    raw
                ))
            })?;
        }
        if let Some(raw) = lookup("HUDDLE_WS_RECONNECT_DELAY_MS") {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!(
                    "HUDDLE_WS_RECONNECT_DELAY_MS must be milliseconds, got {:?}",
                    raw
                ))
            })?;
            reconnect.delay = Duration::from_millis(ms);
        }

        Ok(Self { ws_url, reconnect })
    }
}

/// Derive the real-time endpoint for a deployment base URL.
///
/// `http` maps to `ws`, `https` to `wss`; a bare host is treated as `http`.
/// The path becomes `<base path>/ws` and any query or fragment is dropped.
pub fn ws_url_for_base(base: &str) -> ClientResult<String> {
    let base = base.trim();
    let with_scheme = if base.contains("://") {
        base.to_string()
    } else {
        format!("http://{}", base)
    };

    let mut url = Url::parse(&with_scheme)?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ClientError::Config(format!(
                "unsupported base URL scheme {:?}",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::Config(format!("cannot use scheme {:?}", scheme)))?;

    let path = format!("{}{}", url.path().trim_end_matches('/'), WS_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url.to_string())
}

fn validate_ws_url(raw: &str) -> ClientResult<String> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "ws" | "wss" => Ok(url.to_string()),
        other => Err(ClientError::Config(format!(
            "HUDDLE_WS_URL must use ws:// or wss://, got {:?}",
            other
        ))),
    }
}
