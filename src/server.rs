use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::content::ContentService;
use crate::handlers;
use crate::listing::ListingCache;
use crate::session::SessionGate;

/// Largest accepted request body: a full-size image plus form overhead.
pub const BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub content: Arc<ContentService>,
    pub cache: Arc<ListingCache>,
    pub gate: Arc<SessionGate>,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(content: ContentService, gate: SessionGate, secure_cookies: bool) -> Self {
        Self {
            content: Arc::new(content),
            cache: Arc::new(ListingCache::new()),
            gate: Arc::new(gate),
            secure_cookies,
        }
    }
}

/// All routes. `uploads` is the local bucket directory served under `/uploads`.
pub fn router(state: AppState, uploads: Option<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/content", get(handlers::list_content))
        .route("/api/content/{id}", get(handlers::get_content))
        .route(
            "/api/admin/content",
            get(handlers::admin_list).post(handlers::create_content),
        )
        .route("/api/admin/content/upload", post(handlers::create_content_upload))
        .route(
            "/api/admin/content/{id}",
            patch(handlers::update_content).delete(handlers::delete_content),
        )
        .route(
            "/api/admin/content/{id}/upload",
            patch(handlers::update_content_upload),
        )
        .route("/api/admin/signin", post(handlers::sign_in))
        .route("/api/admin/check-auth", get(handlers::check_auth))
        .route("/api/admin/signout", post(handlers::sign_out));

    if let Some(dir) = uploads {
        app = app.nest_service("/uploads", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
