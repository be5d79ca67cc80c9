//! # PDF Export
//!
//! Draws a [`Plan`](crate::layout::Plan) into a PDF with one page per
//! template page.
//!
//! Plans use points with a top-left origin; PDF pages are laid out in
//! millimetres from the bottom-left corner, so every coordinate is flipped
//! (`y_pdf = page_h - y - h`) and converted with [`pt_to_mm`].
//!
//! Text uses the PDF built-in fonts: the field's font family picks Helvetica,
//! Times or Courier, and weight/style pick the variant.

mod pdf;

pub use pdf::{PdfExporter, export_pdf};

use thiserror::Error;

/// Errors that can occur while building a PDF.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Plan has no pages")]
    NoPages,
}

/// Points to millimetres.
pub fn pt_to_mm(pt: f32) -> f32 {
    pt * 25.4 / 72.0
}

/// Built-in font family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Helvetica,
    Times,
    Courier,
}

impl Family {
    /// Map a CSS-ish family name to the closest built-in family.
    pub fn from_name(name: &str) -> Family {
        let name = name.to_ascii_lowercase();
        if name.contains("times") || (name.contains("serif") && !name.contains("sans")) {
            Family::Times
        } else if name.contains("courier") || name.contains("mono") {
            Family::Courier
        } else {
            Family::Helvetica
        }
    }
}
