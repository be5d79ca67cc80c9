//! # Error Types
//!
//! This module defines error types used throughout the plantilla library.

use thiserror::Error;

use crate::export::ExportError;
use crate::formula::FormulaError;
use crate::preview::PreviewError;

/// Main error type for plantilla operations
#[derive(Debug, Error)]
pub enum PlantillaError {
    /// Malformed template or value map
    #[error("Template error: {0}")]
    Template(String),

    /// Formula could not be parsed
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Canvas preview rendering failed
    #[error("Render error: {0}")]
    Render(#[from] PreviewError),

    /// PDF export failed
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server-level errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
