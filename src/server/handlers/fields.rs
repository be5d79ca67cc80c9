//! Field type catalogue for the designer palette.

use axum::Json;
use serde::Serialize;

use crate::template::FieldType;

#[derive(Debug, Serialize)]
pub struct FieldTypeInfo {
    pub name: &'static str,
    pub label: &'static str,
    pub graphic: bool,
    pub multiline: bool,
}

/// Handle GET /api/field-types.
pub async fn list() -> Json<Vec<FieldTypeInfo>> {
    Json(
        FieldType::ALL
            .iter()
            .map(|t| FieldTypeInfo {
                name: t.name(),
                label: t.label(),
                graphic: t.is_graphic(),
                multiline: t.is_multiline(),
            })
            .collect(),
    )
}
