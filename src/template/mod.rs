//! # Template Model
//!
//! A template is a saved collection of fields bound to a source PDF. The same
//! type is constructible in Rust and deserializable from the designer's JSON.
//!
//! ```
//! use plantilla::template::{Field, FieldType, Template};
//!
//! // Rust construction
//! let template = Template::new("Invoice")
//!     .field(Field::new("qty", FieldType::Number).at(40.0, 80.0, 60.0, 18.0))
//!     .field(Field::new("total", FieldType::Number).with_formula("qty * 9.5"));
//!
//! // JSON deserialization
//! let parsed = Template::from_json(r#"{"name": "Invoice", "fields": [{"id": "qty", "type": "number"}]}"#).unwrap();
//! assert_eq!(parsed.fields.len(), 1);
//! assert_eq!(template.page_count(), 1);
//! ```

pub mod record;
pub mod types;
pub mod values;

pub use record::{Assignature, Document, DocumentStatus};
pub use types::*;
pub use values::{ValueMap, cell_key, group_key};

use values::is_blank;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::PlantillaError;
use crate::formula;

/// Highest page number a template may use.
pub const MAX_PAGES: u32 = 1000;

/// Longest page side in points (200 inches).
pub const MAX_PAGE_SIDE: f32 = 14_400.0;

/// Most data rows a table may declare.
pub const MAX_TABLE_ROWS: usize = 10_000;

fn default_scale() -> f32 {
    1.0
}

/// A saved collection of fields bound to a source PDF.
///
/// Deserialization rejects a non-positive scale, page sizes outside
/// `(0, MAX_PAGE_SIDE]`, more than [`MAX_PAGES`] declared pages and tables
/// with more than [`MAX_TABLE_ROWS`] rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTemplate")]
pub struct Template {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Source PDF path or URL. Only carried through; never opened here.
    #[serde(default)]
    pub pdf: Option<String>,
    /// Designer scale at which coordinates were captured.
    /// Page-space points = designer pixels / scale.
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// Page sizes in points. Empty means a single A4 page.
    #[serde(default)]
    pub pages: Vec<PageSize>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            pdf: None,
            scale: default_scale(),
            pages: Vec::new(),
            fields: Vec::new(),
        }
    }
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a template from JSON.
    pub fn from_json(json: &str) -> Result<Self, PlantillaError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check the structural limits every template must meet.
    pub fn check(&self) -> Result<(), PlantillaError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(PlantillaError::Template(format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        if self.pages.len() > MAX_PAGES as usize {
            return Err(PlantillaError::Template(format!(
                "{} pages declared, at most {} allowed",
                self.pages.len(),
                MAX_PAGES
            )));
        }
        for (i, size) in self.pages.iter().enumerate() {
            let side_ok = |v: f32| v.is_finite() && v > 0.0 && v <= MAX_PAGE_SIDE;
            if !(side_ok(size.width) && side_ok(size.height)) {
                return Err(PlantillaError::Template(format!(
                    "page {} is {}x{} points, sides must be in (0, {}]",
                    i + 1,
                    size.width,
                    size.height,
                    MAX_PAGE_SIDE
                )));
            }
        }
        for field in &self.fields {
            if let Some(table) = field.table() {
                if table.rows > MAX_TABLE_ROWS {
                    return Err(PlantillaError::Template(format!(
                        "table '{}' has {} rows, at most {} allowed",
                        field.id, table.rows, MAX_TABLE_ROWS
                    )));
                }
            }
        }
        Ok(())
    }

    /// Builder-style field append.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Builder-style page append.
    pub fn page(mut self, size: PageSize) -> Self {
        self.pages.push(size);
        self
    }

    /// Look up a top-level field by id.
    pub fn get_field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Fields placed on a 1-based page.
    pub fn fields_on_page(&self, page: u32) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(move |f| f.page == page)
    }

    /// Number of pages: declared pages, or the highest page any field uses,
    /// never more than [`MAX_PAGES`].
    pub fn page_count(&self) -> u32 {
        let declared = self.pages.len().min(MAX_PAGES as usize) as u32;
        let used = self
            .fields
            .iter()
            .map(|f| f.page)
            .filter(|&p| p <= MAX_PAGES)
            .max()
            .unwrap_or(1);
        declared.max(used).max(1)
    }

    /// Size of a 1-based page. Pages past the declared list reuse the last size.
    pub fn page_size(&self, page: u32) -> PageSize {
        let idx = page.saturating_sub(1) as usize;
        self.pages
            .get(idx)
            .or_else(|| self.pages.last())
            .copied()
            .unwrap_or_default()
    }

    /// Check the template against a value map.
    ///
    /// Reports duplicate ids, pages outside `1..=MAX_PAGES`, formulas that do not parse, and
    /// required fields without a value (formula fields are exempt since
    /// their value is computed).
    pub fn validate(&self, values: &ValueMap) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                issues.push(ValidationIssue::new(&field.id, IssueKind::DuplicateId));
            }
            if field.page == 0 || field.page > MAX_PAGES {
                issues.push(ValidationIssue::new(&field.id, IssueKind::InvalidPage));
            }
            check_formula(&field.id, field.formula(), &mut issues);

            if let Some(table) = field.table() {
                for column in &table.columns {
                    let key = group_key(&field.id, &column.id);
                    check_formula(&key, column.formula(), &mut issues);
                }
            }

            if let Some(group) = field.group() {
                for sub in group.all_fields() {
                    let key = group_key(&field.id, &sub.id);
                    check_formula(&key, sub.formula(), &mut issues);
                    if sub.required
                        && sub.formula().is_none()
                        && values
                            .group_value(&field.id, &sub.id)
                            .is_none_or(is_blank)
                    {
                        issues.push(ValidationIssue::new(&key, IssueKind::MissingRequired));
                    }
                }
            }

            if field.required && field.formula().is_none() && !self.has_value(field, values) {
                issues.push(ValidationIssue::new(&field.id, IssueKind::MissingRequired));
            }
        }

        issues
    }

    fn has_value(&self, field: &Field, values: &ValueMap) -> bool {
        if values.get(&field.id).is_some_and(|v| !is_blank(v)) {
            return true;
        }
        match field.table() {
            Some(table) => (0..table.rows).any(|row| {
                table.columns.iter().any(|c| {
                    values
                        .cell(&field.id, row, &c.id)
                        .is_some_and(|v| !is_blank(v))
                })
            }),
            None => false,
        }
    }
}

/// Wire form of [`Template`], checked before it becomes one.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTemplate {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    pdf: Option<String>,
    #[serde(default = "default_scale")]
    scale: f32,
    #[serde(default)]
    pages: Vec<PageSize>,
    #[serde(default)]
    fields: Vec<Field>,
}

impl TryFrom<RawTemplate> for Template {
    type Error = PlantillaError;

    fn try_from(raw: RawTemplate) -> Result<Self, Self::Error> {
        let template = Template {
            id: raw.id,
            name: raw.name,
            pdf: raw.pdf,
            scale: raw.scale,
            pages: raw.pages,
            fields: raw.fields,
        };
        template.check()?;
        Ok(template)
    }
}

fn check_formula(key: &str, formula: Option<&str>, issues: &mut Vec<ValidationIssue>) {
    if let Some(src) = formula {
        if let Err(e) = formula::parse(src) {
            issues.push(ValidationIssue::new(
                key,
                IssueKind::InvalidFormula(e.to_string()),
            ));
        }
    }
}

/// What is wrong with a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum IssueKind {
    DuplicateId,
    InvalidPage,
    MissingRequired,
    InvalidFormula(String),
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl ValidationIssue {
    fn new(field: &str, kind: IssueKind) -> Self {
        Self {
            field: field.to_string(),
            kind,
        }
    }
}
