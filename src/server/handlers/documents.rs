//! Batch resolution of document records.

use axum::Json;
use serde::{Deserialize, Serialize};

use super::{ApiError, internal};
use crate::resolve::Resolution;
use crate::template::{Document, DocumentStatus, Template, record::resolve_documents};

#[derive(Debug, Deserialize)]
pub struct DocumentsRequest {
    pub template: Template,
    pub documents: Vec<Document>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResolution {
    pub id: String,
    pub status: DocumentStatus,
    pub fully_signed: bool,
    pub values: Resolution,
}

/// Handle POST /api/documents/resolve - resolve many documents against one template.
pub async fn resolve(Json(req): Json<DocumentsRequest>) -> Result<Json<Vec<DocumentResolution>>, ApiError> {
    let resolved = tokio::task::spawn_blocking(move || {
        let resolutions = resolve_documents(&req.template, &req.documents);
        req.documents
            .iter()
            .zip(resolutions)
            .map(|(doc, values)| DocumentResolution {
                id: doc.id.clone(),
                status: doc.status,
                fully_signed: doc.fully_signed(),
                values,
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(internal)?;

    Ok(Json(resolved))
}
