use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use huddle_server::api::{self, AppState};
use huddle_server::config::ServerConfig;
use huddle_server::engine::Engine;
use huddle_server::media_store::MediaStore;
use huddle_shared::session::SessionIssuer;
use huddle_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,huddle_server=debug,huddle_store=info")),
        )
        .init();

    info!("Starting Huddle server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        media = %config.media_storage_path.display(),
        admin_enabled = config.admin_token.is_some(),
        policy = ?config.policy,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Subsystems
    // -----------------------------------------------------------------------
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    let media = Arc::new(
        MediaStore::new(
            config.media_storage_path.clone(),
            config.max_image_size,
            config.public_base_url.clone(),
        )
        .await?,
    );

    let ttl = chrono::Duration::days(config.session_ttl_days);
    let sessions = match config.session_signing_key {
        Some(ref secret) => SessionIssuer::from_secret_bytes(secret, ttl),
        None => {
            warn!("SESSION_SIGNING_KEY not set; sessions will not survive a restart");
            SessionIssuer::generate(ttl)
        }
    };

    let engine = Engine::new(database, media, sessions, config.policy);
    let http_addr = config.http_addr;
    let state = AppState {
        engine,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. HTTP API (runs until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
