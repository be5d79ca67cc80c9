//! # Plantilla - PDF Form Template Engine
//!
//! Plantilla fills PDF form templates with data. A template is a list of
//! positioned fields drawn over a PDF page; fields may carry spreadsheet-like
//! formulas that reference other fields, table cells and grouped sub-fields.
//! It provides:
//!
//! - **Formula language**: arithmetic, comparisons and aggregates over fields
//! - **Resolution**: every formula evaluated once, with circular-reference detection
//! - **Layout**: one backend-neutral draw plan for every page
//! - **Rendering**: PNG previews and PDF export from the same plan
//!
//! ## Quick Start
//!
//! ```
//! use plantilla::{
//!     layout,
//!     resolve::Resolver,
//!     template::{Field, FieldType, TableColumn, Template, ValueMap},
//! };
//!
//! let template = Template::new("invoice")
//!     .field(
//!         Field::new("items", FieldType::Table)
//!             .at(40.0, 100.0, 400.0, 90.0)
//!             .with_table(2, vec![
//!                 TableColumn::new("qty"),
//!                 TableColumn::new("price"),
//!                 TableColumn::new("total").with_formula("qty * price"),
//!             ]),
//!     )
//!     .field(
//!         Field::new("grand_total", FieldType::Number)
//!             .at(340.0, 200.0, 100.0, 20.0)
//!             .with_formula("SUM(items.total)"),
//!     );
//!
//! let values = ValueMap::from_json(r#"{"items": [{"qty": 2, "price": 9.5}, {"qty": 1, "price": 4}]}"#)?;
//! let resolution = Resolver::new(&template, &values).resolve();
//! assert_eq!(resolution.display("grand_total"), "23");
//!
//! let plan = layout::compile(&template, &resolution);
//! let pdf = plantilla::export::export_pdf(&plan, &template.name)?;
//! assert!(pdf.starts_with(b"%PDF"));
//! # Ok::<(), plantilla::PlantillaError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`template`] | Field model, value maps, document records |
//! | [`formula`] | Formula lexer, parser and evaluator |
//! | [`resolve`] | Reference lookup, memoization, cycle detection |
//! | [`layout`] | Coordinate conversion and the draw plan |
//! | [`preview`] | PNG canvas renderer |
//! | [`export`] | PDF exporter |
//! | [`server`] | HTTP API |
//! | [`error`] | Error types |

pub mod error;
pub mod export;
pub mod formula;
pub mod layout;
pub mod preview;
pub mod resolve;
pub mod server;
pub mod template;

// Re-exports for convenience
pub use error::PlantillaError;
pub use resolve::{Resolution, Resolver};
pub use template::{Template, ValueMap};
