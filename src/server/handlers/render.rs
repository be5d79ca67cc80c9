//! Resolve, validate, preview and export handlers.
//!
//! Every route takes the template and its values in one JSON body.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::super::state::AppState;
use super::{ApiError, bad_request, internal};
use crate::export::export_pdf;
use crate::layout::{self, Plan};
use crate::preview::{PreviewError, RenderOptions, decode_data_url, render_page};
use crate::resolve::{Resolution, Resolver};
use crate::template::{Template, ValidationIssue, ValueMap};

/// Body shared by every render route.
#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub template: Template,
    #[serde(default)]
    pub values: ValueMap,
    /// Preview pixels per point; the server default applies when absent.
    #[serde(default)]
    pub scale: Option<f32>,
    /// Rendered source page as a data URL, drawn under the preview.
    #[serde(default)]
    pub background: Option<String>,
}

impl RenderRequest {
    fn plan(&self) -> Plan {
        let resolution = Resolver::new(&self.template, &self.values).resolve();
        layout::compile(&self.template, &resolution)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub key: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub values: Resolution,
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

/// Handle POST /api/resolve - resolve every formula.
pub async fn resolve(Json(req): Json<RenderRequest>) -> Result<Json<ResolveResponse>, ApiError> {
    let response = tokio::task::spawn_blocking(move || {
        let values = Resolver::new(&req.template, &req.values).resolve();
        let errors = values
            .errors()
            .into_iter()
            .map(|(key, e)| ErrorEntry {
                key: key.to_string(),
                code: e.code(),
            })
            .collect();
        ResolveResponse { values, errors }
    })
    .await
    .map_err(internal)?;

    Ok(Json(response))
}

/// Handle POST /api/validate - report template/value problems.
pub async fn validate(Json(req): Json<RenderRequest>) -> Result<Json<ValidateResponse>, ApiError> {
    let issues = tokio::task::spawn_blocking(move || req.template.validate(&req.values))
        .await
        .map_err(internal)?;

    Ok(Json(ValidateResponse {
        valid: issues.is_empty(),
        issues,
    }))
}

/// Handle POST /api/preview/:page - render one page as PNG.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Path(page): Path<u32>,
    Json(req): Json<RenderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let scale = req.scale.unwrap_or(state.config.preview_scale);
    let background = req
        .background
        .as_deref()
        .map(decode_data_url)
        .transpose()
        .map_err(bad_request)?;

    let png_bytes = tokio::task::spawn_blocking(move || {
        let plan = req.plan();
        let options = RenderOptions {
            scale,
            background,
        };
        render_page(&plan, page, &options)
    })
    .await
    .map_err(internal)?
    .map_err(|e| match e {
        PreviewError::NoSuchPage(_) => (StatusCode::NOT_FOUND, e.to_string()),
        PreviewError::InvalidScale(_)
        | PreviewError::CanvasTooLarge(..)
        | PreviewError::ImageDecode(_) => bad_request(e),
        PreviewError::ImageEncode(_) => internal(format!("Preview render failed: {}", e)),
    })?;

    debug!(page, bytes = png_bytes.len(), "preview rendered");
    Ok(([(header::CONTENT_TYPE, "image/png")], png_bytes))
}

/// Handle POST /api/export - render every page into a PDF.
pub async fn export(Json(req): Json<RenderRequest>) -> Result<impl IntoResponse, ApiError> {
    let filename = attachment_name(&req.template.name);

    let pdf_bytes = tokio::task::spawn_blocking(move || {
        let plan = req.plan();
        export_pdf(&plan, &req.template.name)
    })
    .await
    .map_err(internal)?
    .map_err(|e| internal(format!("Export failed: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        pdf_bytes,
    ))
}

/// Safe download name derived from the template name.
fn attachment_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('_');
    if stem.is_empty() {
        "document.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_name() {
        assert_eq!(attachment_name("Invoice 2024/03"), "Invoice_2024_03.pdf");
        assert_eq!(attachment_name("  "), "document.pdf");
        assert_eq!(attachment_name("\"quoted\""), "quoted.pdf");
    }
}
