//! HTTP JSON interface.
//!
//! Staff log in with `POST /api/login`, students and parents with
//! `POST /api/student-login`. Both return a bearer token for the
//! `Authorization` header of every other call.

/// Error to response mapping
pub mod error;
/// Bearer-token principal extractor
pub mod extract;
/// Request handlers
pub mod handlers;
/// Session store
pub mod session;

use crate::{config::settings::AppConfig, errors::Result};
use axum::{
    Router,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use session::SessionStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared state of every request.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Database pool
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Logged-in sessions
    pub sessions: SessionStore,
}

impl AppState {
    /// Bundles the state with an empty session store.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: Arc<AppConfig>) -> Self {
        Self {
            db,
            sessions: SessionStore::new(config.session_ttl()),
            config,
        }
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/login", post(handlers::login))
        .route("/student-login", post(handlers::student_login))
        .route("/logout", post(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/home", get(handlers::home))
        .route("/award", post(handlers::award))
        .route("/deduct", post(handlers::deduct))
        .route("/transactions", get(handlers::transactions))
        .route("/transactions/:id", put(handlers::edit_transaction))
        .route(
            "/students",
            get(handlers::list_students).post(handlers::create_student),
        )
        .route(
            "/students/:id",
            get(handlers::student_detail).put(handlers::update_student),
        )
        .route("/award-candidates", get(handlers::award_candidates));

    Router::new()
        .nest("/api", api)
        .route("/health", get(|| async { "ok" }))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Binds `config.bind_address` and serves until the process is stopped.
pub async fn serve(state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&state.config.bind_address).await?;
    info!("Listening on {}", state.config.bind_address);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
