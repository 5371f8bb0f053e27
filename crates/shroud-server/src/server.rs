use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    engine::{EngineSettings, ShareEngine},
    handlers::{create_share, get_share, health, recent_shares},
    store::{RecordStore, Store},
    AppState,
};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Base URL for share links. Defaults to `http://localhost:<port>`.
    pub public_url: Option<String>,
    pub cors_origins: Option<String>,
    /// How often expired and consumed shares are purged. Zero disables the sweep.
    pub sweep_interval: Duration,
    pub max_ttl: Duration,
    pub max_content_bytes: usize,
    /// Keep everything in memory; shares die with the process.
    pub in_memory: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("SHROUD_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("SHROUD_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("SHROUD_DATA_DIR").ok().map(PathBuf::from),
            public_url: std::env::var("SHROUD_PUBLIC_URL").ok(),
            cors_origins: std::env::var("SHROUD_CORS_ORIGINS").ok(),
            sweep_interval: Duration::from_secs(
                std::env::var("SHROUD_SWEEP_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            ),
            max_ttl: Duration::from_secs(
                std::env::var("SHROUD_MAX_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(24 * 3600),
            ),
            max_content_bytes: std::env::var("SHROUD_MAX_CONTENT_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1_048_576),
            in_memory: std::env::var("SHROUD_IN_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

impl ServerConfig {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            public_url: self
                .public_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}", self.port)),
            max_ttl: self.max_ttl,
            max_content_bytes: self.max_content_bytes,
        }
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

fn open_store(cfg: &ServerConfig) -> Result<Store> {
    if cfg.in_memory {
        info!("using in-memory store; shares will not survive a restart");
        return Store::in_memory();
    }
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");
    Store::open(&data_dir.join("shroud.db")).context("open store")
}

/// The full HTTP surface, without listener or background tasks.
pub fn router(state: AppState, cors_origins: Option<&str>) -> Router {
    let body_limit = request_body_limit(state.engine.settings().max_content_bytes);
    Router::new()
        .route("/health", get(health))
        .route("/shares", post(create_share))
        .route("/shares/recent", get(recent_shares))
        .route("/shares/{id}", get(get_share))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(build_cors(cors_origins))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let store: Arc<dyn RecordStore> = Arc::new(open_store(&cfg)?);
    let engine = ShareEngine::new(store, cfg.engine_settings());

    engine.clone().spawn_sweep(cfg.sweep_interval);

    let app = router(AppState { engine }, cfg.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "shroud server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

/// Largest accepted request body for a given content limit. JSON escaping can
/// grow a byte to six (`\u0000`), plus room for the envelope.
fn request_body_limit(max_content_bytes: usize) -> usize {
    max_content_bytes.saturating_mul(6).saturating_add(16 * 1024)
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
