//! Field record types for the template model.
//!
//! All types derive `Serialize + Deserialize` so the same types work for
//! both Rust API construction and the designer's persisted JSON (camelCase).

use serde::{Deserialize, Serialize};

// ============================================================================
// FIELD TYPE
// ============================================================================

/// The kind of input a field collects and how it renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Select,
    Checkbox,
    Date,
    Table,
    List,
    Textarea,
    Email,
    Image,
    Group,
    Signature,
}

impl FieldType {
    /// Every field type, in designer palette order.
    pub const ALL: [FieldType; 12] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Select,
        FieldType::Checkbox,
        FieldType::Date,
        FieldType::Table,
        FieldType::List,
        FieldType::Textarea,
        FieldType::Email,
        FieldType::Image,
        FieldType::Group,
        FieldType::Signature,
    ];

    /// Human-readable display label (e.g. "Text Area", "Signature").
    pub fn label(self) -> &'static str {
        match self {
            FieldType::Text => "Text",
            FieldType::Number => "Number",
            FieldType::Select => "Select",
            FieldType::Checkbox => "Checkbox",
            FieldType::Date => "Date",
            FieldType::Table => "Table",
            FieldType::List => "List",
            FieldType::Textarea => "Text Area",
            FieldType::Email => "Email",
            FieldType::Image => "Image",
            FieldType::Group => "Group",
            FieldType::Signature => "Signature",
        }
    }

    /// The JSON tag for this type (`"textarea"`, `"signature"`, ...).
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Select => "select",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::Table => "table",
            FieldType::List => "list",
            FieldType::Textarea => "textarea",
            FieldType::Email => "email",
            FieldType::Image => "image",
            FieldType::Group => "group",
            FieldType::Signature => "signature",
        }
    }

    /// Types whose value is raster data (a data URL) rather than text.
    pub fn is_graphic(self) -> bool {
        matches!(self, FieldType::Image | FieldType::Signature)
    }

    /// Types whose text wraps across multiple lines inside the field box.
    pub fn is_multiline(self) -> bool {
        matches!(self, FieldType::Textarea | FieldType::List)
    }
}

// ============================================================================
// GEOMETRY
// ============================================================================

/// Field rectangle in designer pixels, origin at the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Coordinates {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }
}

/// Page dimensions in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 595.28,
        height: 841.89,
    };

    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

// ============================================================================
// STYLE
// ============================================================================

/// Font weight. The designer stores either a keyword or a CSS numeric weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum WeightValue {
            Numeric(u16),
            Keyword(String),
        }

        let bold = match WeightValue::deserialize(deserializer)? {
            WeightValue::Numeric(n) => n >= 600,
            WeightValue::Keyword(s) => match s.trim().to_ascii_lowercase().as_str() {
                "bold" | "bolder" => true,
                other => other.parse::<u16>().map(|n| n >= 600).unwrap_or(false),
            },
        };
        Ok(if bold { FontWeight::Bold } else { FontWeight::Normal })
    }
}

/// Font slant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    #[serde(alias = "oblique")]
    Italic,
}

/// Horizontal text alignment inside a field box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

fn default_font_size() -> f32 {
    12.0
}

fn default_color() -> String {
    "#000000".into()
}

fn default_font_family() -> String {
    "Helvetica".into()
}

fn default_decimals() -> u8 {
    2
}

/// Text style applied when a field's value is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStyle {
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// CSS hex color (`#rgb` or `#rrggbb`).
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub font_style: FontStyle,
    #[serde(default)]
    pub align: Align,
    /// Maximum digits after the decimal point when a number is displayed.
    #[serde(default = "default_decimals")]
    pub decimals: u8,
}

impl Default for FieldStyle {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            color: default_color(),
            font_family: default_font_family(),
            font_weight: FontWeight::default(),
            font_style: FontStyle::default(),
            align: Align::default(),
            decimals: default_decimals(),
        }
    }
}

impl FieldStyle {
    /// Parse `color` into RGB components. Malformed colors fall back to black.
    pub fn rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.color).unwrap_or([0, 0, 0])
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }
}

/// Parse `#rgb` / `#rrggbb` (leading `#` optional).
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return None;
    }
    let channel = |h: &str| u8::from_str_radix(h, 16).ok();
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 16 + v;
            }
            Some(out)
        }
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ]),
        _ => None,
    }
}

// ============================================================================
// TABLES AND GROUPS
// ============================================================================

/// One column of a table field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub id: String,
    #[serde(default)]
    pub label: String,
    /// Relative width weight. Missing or zero weights split the table evenly.
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(rename = "type", default)]
    pub column_type: FieldType,
    /// Per-row formula; bare column ids refer to the same row.
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl TableColumn {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            ..Default::default()
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    /// The formula, if one is set and non-blank.
    pub fn formula(&self) -> Option<&str> {
        non_blank(self.formula.as_deref())
    }
}

/// Table layout: a header row followed by `rows` data rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConfig {
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

impl TableConfig {
    pub fn column(&self, id: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.id == id)
    }
}

/// Sub-fields of a group field.
///
/// `fields` are defined in the designer; `additional_fields` are appended
/// when a document is filled in. Both resolve and render identically.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupConfig {
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub additional_fields: Vec<Field>,
}

impl GroupConfig {
    /// All sub-fields, designer fields first.
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().chain(self.additional_fields.iter())
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.additional_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// FIELD
// ============================================================================

fn default_page() -> u32 {
    1
}

/// A named, positioned, typed input/output unit on a PDF template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Field box; data-only fields have none and are never drawn.
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// 1-based page number.
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub style: FieldStyle,
    #[serde(default)]
    pub table_config: Option<TableConfig>,
    #[serde(default)]
    pub group_config: Option<GroupConfig>,
    /// Choices for select fields.
    #[serde(default)]
    pub options: Vec<String>,
    /// strftime pattern for date fields.
    #[serde(default)]
    pub format: Option<String>,
}

impl Field {
    /// Create a text field with defaults.
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            field_type,
            required: false,
            coordinates: None,
            page: default_page(),
            formula: None,
            style: FieldStyle::default(),
            table_config: None,
            group_config: None,
            options: Vec::new(),
            format: None,
        }
    }

    pub fn at(mut self, x: f32, y: f32, width: f32, height: f32) -> Self {
        self.coordinates = Some(Coordinates::new(x, y, width, height));
        self
    }

    pub fn on_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_table(mut self, rows: usize, columns: Vec<TableColumn>) -> Self {
        self.table_config = Some(TableConfig { rows, columns });
        self
    }

    pub fn with_group(mut self, fields: Vec<Field>) -> Self {
        self.group_config = Some(GroupConfig {
            fields,
            additional_fields: Vec::new(),
        });
        self
    }

    /// The formula, if one is set and non-blank.
    pub fn formula(&self) -> Option<&str> {
        non_blank(self.formula.as_deref())
    }

    /// Table config, only for table fields.
    pub fn table(&self) -> Option<&TableConfig> {
        match self.field_type {
            FieldType::Table => self.table_config.as_ref(),
            _ => None,
        }
    }

    /// Group config, only for group fields.
    pub fn group(&self) -> Option<&GroupConfig> {
        match self.field_type {
            FieldType::Group => self.group_config.as_ref(),
            _ => None,
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
