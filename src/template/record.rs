//! Document records: a template instance filled with data.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Template, ValueMap};
use crate::resolve::{Resolution, Resolver};

/// Workflow status of a document. Stored as an integer 0..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DocumentStatus {
    #[default]
    Draft = 0,
    Pending = 1,
    Signed = 2,
    Rejected = 3,
}

impl TryFrom<u8> for DocumentStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DocumentStatus::Draft),
            1 => Ok(DocumentStatus::Pending),
            2 => Ok(DocumentStatus::Signed),
            3 => Ok(DocumentStatus::Rejected),
            other => Err(format!("document status must be 0..=3, got {}", other)),
        }
    }
}

impl From<DocumentStatus> for u8 {
    fn from(status: DocumentStatus) -> Self {
        status as u8
    }
}

/// A signature record attached to a document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignature {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
    /// Signature image as a `data:image/...;base64,` URL.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Assignature {
    pub fn is_signed(&self) -> bool {
        self.signed_at.is_some()
    }
}

/// An instance of data filled into a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: DocumentStatus,
    #[serde(default)]
    pub document_data: Map<String, Value>,
    /// Template reference (id or name).
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub assignatures: Vec<Assignature>,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl Document {
    /// Create an empty draft with a fresh id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            status: DocumentStatus::Draft,
            document_data: Map::new(),
            template: None,
            assignatures: Vec::new(),
            remarks: None,
        }
    }

    /// The document's data as a value map.
    pub fn values(&self) -> ValueMap {
        ValueMap::from(self.document_data.clone())
    }

    /// Resolve this document's data against a template.
    pub fn resolve(&self, template: &Template) -> Resolution {
        Resolver::new(template, &self.values()).resolve()
    }

    /// True once every assignature has signed (and there is at least one).
    pub fn fully_signed(&self) -> bool {
        !self.assignatures.is_empty() && self.assignatures.iter().all(Assignature::is_signed)
    }
}

/// Resolve many documents against one template in parallel.
///
/// Output order matches input order.
pub fn resolve_documents(template: &Template, documents: &[Document]) -> Vec<Resolution> {
    documents
        .par_iter()
        .map(|doc| doc.resolve(template))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Field, FieldType};

    #[test]
    fn test_status_from_integer() {
        let doc: Document = serde_json::from_str(r#"{"id": "d1", "status": 2}"#).unwrap();
        assert_eq!(doc.status, DocumentStatus::Signed);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["status"], 2);
    }

    #[test]
    fn test_status_out_of_range_rejected() {
        let result: Result<Document, _> = serde_json::from_str(r#"{"id": "d1", "status": 4}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_fully_signed() {
        let mut doc = Document::new("contract");
        assert!(!doc.fully_signed());
        doc.assignatures.push(Assignature {
            name: "Ana".into(),
            ..Default::default()
        });
        assert!(!doc.fully_signed());
        doc.assignatures[0].signed_at = Some(Utc::now());
        assert!(doc.fully_signed());
    }

    #[test]
    fn test_resolve_documents_keeps_order() {
        let template = Template::new("t")
            .field(Field::new("a", FieldType::Number))
            .field(Field::new("b", FieldType::Number).with_formula("a * 2"));
        let docs: Vec<Document> = (1..=5)
            .map(|i| {
                let mut d = Document::new(format!("doc{}", i));
                d.document_data.insert("a".into(), Value::from(i));
                d
            })
            .collect();
        let resolved = resolve_documents(&template, &docs);
        let totals: Vec<f64> = resolved
            .iter()
            .map(|r| r.number("b").unwrap())
            .collect();
        assert_eq!(totals, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
    }
}
