//! HTTP surface.
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | GET | `/git/{repository}/{*path}` | configured allow-list |
//! | POST | `/oauth2/authorize` | basic |
//! | POST | `/api/register` | none |
//! | POST | `/api/tokenize` | none |
//! | POST | `/api/encrypt` | none |
//! | GET | `/api/statistics` | none |
//! | GET | `/health`, `/metrics` | none |
//!
//! Errors are returned as `application/problem+json` bodies.

pub mod handlers;
pub mod problem;

use crate::config::{Configuration, ServerSettings};
use crate::error::{ConfigServerError, Result};
use crate::key::Keystore;
use crate::metrics::Metrics;
use crate::repository::RepositoryManager;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<RepositoryManager>,
    pub keystore: Arc<Keystore>,
    pub settings: Arc<ServerSettings>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        manager: Arc<RepositoryManager>,
        keystore: Arc<Keystore>,
        settings: ServerSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            manager,
            keystore,
            settings: Arc::new(settings),
            metrics,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/git/{repository}/{*path}", get(handlers::git_file))
        .route("/oauth2/authorize", post(handlers::oauth2_authorize))
        .route("/api/register", post(handlers::register))
        .route("/api/tokenize", post(handlers::tokenize_file))
        .route("/api/encrypt", post(handlers::encrypt))
        .route("/api/statistics", get(handlers::statistics))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Load keys, start the watchers and serve until the process stops
pub async fn serve(configuration: Configuration) -> Result<()> {
    let server = &configuration.server;

    let keystore = if server.generate_rsa {
        Keystore::load_with_rsa(&server.key_path, server.create_missing_keys)?
    } else {
        Keystore::load(&server.key_path, server.create_missing_keys)?
    };
    info!(key_path = %server.key_path.display(), "keystore loaded");

    let metrics = Metrics::new()?;
    let manager = Arc::new(RepositoryManager::new(&configuration).with_metrics(metrics.clone()));
    manager.start();

    let addr: SocketAddr = server.listen_on.parse().map_err(|err| {
        ConfigServerError::Config(format!("invalid listen address '{}': {err}", server.listen_on))
    })?;

    let state = AppState::new(manager, Arc::new(keystore), server.clone(), metrics);
    let app = router(state);

    info!(%addr, "configserver listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
