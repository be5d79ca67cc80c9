//! # Draw Plan
//!
//! Backend-neutral drawing operations. Every op carries its 1-based page and
//! a rectangle in page points with a top-left origin; renderers convert to
//! their own space.

use serde::Serialize;

use super::geometry::Rect;
use crate::template::{Align, FieldStyle, PageSize};

/// Text appearance resolved from a field style.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStyle {
    /// Font size in points.
    pub size: f32,
    pub color: [u8; 3],
    pub bold: bool,
    pub italic: bool,
    pub align: Align,
    pub family: String,
}

impl TextStyle {
    /// Line advance for stacked lines.
    pub fn line_height(&self) -> f32 {
        self.size * 1.2
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = color;
        self
    }
}

impl From<&FieldStyle> for TextStyle {
    fn from(style: &FieldStyle) -> Self {
        Self {
            size: style.font_size.max(1.0),
            color: style.rgb(),
            bold: style.is_bold(),
            italic: style.is_italic(),
            align: style.align,
            family: style.font_family.clone(),
        }
    }
}

/// A single drawing operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Lines of text stacked from the top of `rect`, aligned horizontally.
    Text {
        page: u32,
        rect: Rect,
        lines: Vec<String>,
        style: TextStyle,
    },

    /// Checkbox outline, with a cross when checked.
    Checkbox {
        page: u32,
        rect: Rect,
        checked: bool,
        color: [u8; 3],
    },

    /// Rectangle outline.
    Stroke {
        page: u32,
        rect: Rect,
        color: [u8; 3],
        width: f32,
    },

    /// Straight line between two points.
    Line {
        page: u32,
        from: (f32, f32),
        to: (f32, f32),
        color: [u8; 3],
        width: f32,
    },

    /// Image fitted into `rect`. `data` is a data URL or bare base64.
    Image { page: u32, rect: Rect, data: String },
}

impl Op {
    pub fn page(&self) -> u32 {
        match self {
            Op::Text { page, .. }
            | Op::Checkbox { page, .. }
            | Op::Stroke { page, .. }
            | Op::Line { page, .. }
            | Op::Image { page, .. } => *page,
        }
    }
}

/// A compiled plan: page sizes plus ops in paint order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub pages: Vec<PageSize>,
    pub ops: Vec<Op>,
}

impl Plan {
    pub fn new(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Size of a 1-based page, if it exists.
    pub fn page_size(&self, page: u32) -> Option<PageSize> {
        page.checked_sub(1)
            .and_then(|i| self.pages.get(i as usize))
            .copied()
    }

    /// Ops on one page, in paint order.
    pub fn ops_on_page(&self, page: u32) -> impl Iterator<Item = &Op> {
        self.ops.iter().filter(move |op| op.page() == page)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
