//! HTTP handlers for the server.

pub mod documents;
pub mod fields;
pub mod render;

use axum::http::StatusCode;
use std::fmt::Display;

/// Handler error: status plus a plain-text message.
pub type ApiError = (StatusCode, String);

pub fn bad_request(e: impl Display) -> ApiError {
    (StatusCode::BAD_REQUEST, e.to_string())
}

pub fn internal(e: impl Display) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
