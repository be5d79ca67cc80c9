//! # HTTP API for Template Resolution and Rendering
//!
//! Exposes resolve / validate / preview / export to a designer UI.
//!
//! ## Usage
//!
//! ```bash
//! plantilla serve --listen 0.0.0.0:8080
//! ```
//!
//! | Route | Body | Response |
//! |-------|------|----------|
//! | `GET /api/field-types` | | JSON list of field types |
//! | `POST /api/resolve` | `{template, values}` | JSON resolution + errors |
//! | `POST /api/validate` | `{template, values}` | JSON issues |
//! | `POST /api/preview/:page` | `{template, values, scale?, background?}` | PNG |
//! | `POST /api/export` | `{template, values}` | PDF |
//! | `POST /api/documents/resolve` | `{template, documents}` | JSON resolutions |

mod handlers;
mod state;

pub use state::ServerConfig;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::PlantillaError;
use state::AppState;

/// Build the API router.
pub fn router(config: ServerConfig) -> Router {
    let body_limit = config.body_limit;
    let app_state = Arc::new(AppState::new(config));

    Router::new()
        .route("/api/field-types", get(handlers::fields::list))
        .route("/api/resolve", post(handlers::render::resolve))
        .route("/api/validate", post(handlers::render::validate))
        .route("/api/preview/:page", post(handlers::render::preview))
        .route("/api/export", post(handlers::render::export))
        .route("/api/documents/resolve", post(handlers::documents::resolve))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the HTTP server.
///
/// ## Example
///
/// ```no_run
/// use plantilla::server::{serve, ServerConfig};
///
/// # async fn example() -> Result<(), plantilla::PlantillaError> {
/// let config = ServerConfig {
///     listen_addr: "0.0.0.0:8080".to_string(),
///     ..Default::default()
/// };
///
/// serve(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig) -> Result<(), PlantillaError> {
    let listen_addr = config.listen_addr.clone();
    let app = router(config);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| PlantillaError::Server(format!("Failed to bind to {}: {}", listen_addr, e)))?;

    info!("plantilla API listening on http://{}/", listen_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| PlantillaError::Server(format!("Server error: {}", e)))?;

    Ok(())
}
