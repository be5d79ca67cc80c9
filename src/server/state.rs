//! Server state and configuration.

use crate::preview::DEFAULT_PREVIEW_SCALE;

/// Default request body limit; backgrounds and signatures arrive inline.
pub const DEFAULT_BODY_LIMIT: usize = 20 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    /// Preview resolution in pixels per point when a request does not set one
    pub preview_scale: f32,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            preview_scale: DEFAULT_PREVIEW_SCALE,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }
}
