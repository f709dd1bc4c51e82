use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    handlers::{create_secret, health, take_secret},
    store::RedbStore,
    AppState,
};

pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1_048_576;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Room for the JSON envelope around the message (alias, type, neogram text, receipts).
const ENVELOPE_ALLOWANCE: usize = 64 * 1024;

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Unread secrets older than this are dropped. `None` keeps them forever.
    pub retention: Option<Duration>,
    pub sweep_interval: Duration,
    pub cors_origins: Option<String>,
    pub max_message_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HUSH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("HUSH_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("HUSH_DATA_DIR").ok().map(PathBuf::from),
            retention: env_duration("HUSH_RETENTION"),
            sweep_interval: env_duration("HUSH_SWEEP_INTERVAL")
                .and_then(|d| nonzero_sweep_interval(d, "HUSH_SWEEP_INTERVAL"))
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
            cors_origins: std::env::var("HUSH_CORS_ORIGINS").ok(),
            max_message_bytes: std::env::var("HUSH_MAX_MESSAGE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES),
        }
    }
}

fn env_duration(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|raw| parse_config_duration(var, &raw))
}

/// Parse a humantime duration, warning and yielding `None` when it is malformed.
fn parse_config_duration(var: &str, raw: &str) -> Option<Duration> {
    match humantime::parse_duration(raw.trim()) {
        Ok(d) => Some(d),
        Err(e) => {
            warn!(var, value = raw, error = %e, "ignoring unparseable duration");
            None
        }
    }
}

fn nonzero_sweep_interval(interval: Duration, var: &str) -> Option<Duration> {
    if interval.is_zero() {
        warn!(
            var,
            default = %humantime::format_duration(DEFAULT_SWEEP_INTERVAL),
            "sweep interval must be positive, using default"
        );
        None
    } else {
        Some(interval)
    }
}

/// Resolve the data directory, creating it if needed.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// The HTTP surface of the persistence service.
///
/// Request bodies may carry `max_message_bytes` of ciphertext plus the JSON
/// envelope; larger bodies are refused before they are buffered.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    let body_limit = state.max_message_bytes.saturating_add(ENVELOPE_ALLOWANCE);
    Router::new()
        .route("/health", get(health))
        .route("/secrets", post(create_secret))
        .route("/secrets/{alias}", delete(take_secret))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let store = RedbStore::open(&data_dir.join("hush.db"))
        .context("open store")?
        .with_retention(cfg.retention);

    if let Some(retention) = cfg.retention {
        info!(retention = %humantime::format_duration(retention), "unread secrets expire");
        store.clone().spawn_sweep(cfg.sweep_interval);
    }

    let state = AppState {
        store: Arc::new(store),
        max_message_bytes: cfg.max_message_bytes,
    };
    let app = router(state, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "hush server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::DELETE,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<http::HeaderValue> = o
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_durations_parse_or_are_ignored() {
        assert_eq!(
            parse_config_duration("HUSH_RETENTION", "7d"),
            Some(Duration::from_secs(7 * 86400))
        );
        assert_eq!(
            parse_config_duration("HUSH_SWEEP_INTERVAL", " 30s "),
            Some(Duration::from_secs(30))
        );
        assert_eq!(parse_config_duration("HUSH_RETENTION", "a week"), None);
        assert_eq!(parse_config_duration("HUSH_RETENTION", ""), None);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        assert_eq!(nonzero_sweep_interval(Duration::ZERO, "HUSH_SWEEP_INTERVAL"), None);
        assert_eq!(
            nonzero_sweep_interval(Duration::from_secs(60), "HUSH_SWEEP_INTERVAL"),
            Some(Duration::from_secs(60))
        );
    }
}
