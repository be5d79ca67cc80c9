//! Rectangles, scale conversion, table/group geometry and text wrapping.

use serde::Serialize;

use crate::template::{Align, Coordinates};

/// Inset between a table cell border and its text, in points.
pub const CELL_INSET: f32 = 2.0;

/// Average glyph advance as a fraction of the font size.
pub const AVG_ADVANCE: f32 = 0.5;

/// Axis-aligned rectangle, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Shrink on every side, never below zero size.
    pub fn inset(&self, by: f32) -> Rect {
        let dx = by.min(self.width / 2.0);
        let dy = by.min(self.height / 2.0);
        Rect::new(self.x + dx, self.y + dy, self.width - 2.0 * dx, self.height - 2.0 * dy)
    }

    /// Band of `height` centered vertically in this rect.
    pub fn center_band(&self, height: f32) -> Rect {
        Rect::new(self.x, self.y + (self.height - height) / 2.0, self.width, height)
    }

    /// Largest square centered in this rect.
    pub fn square(&self) -> Rect {
        let side = self.width.min(self.height);
        Rect::new(
            self.x + (self.width - side) / 2.0,
            self.y + (self.height - side) / 2.0,
            side,
            side,
        )
    }

    /// Bottom edge in a bottom-left origin space of the given page height.
    pub fn flipped_y(&self, page_height: f32) -> f32 {
        page_height - self.y - self.height
    }
}

/// A uniform length conversion factor.
///
/// Designer pixels become points with `Scale::designer(template.scale)`;
/// points become canvas pixels with `Scale::canvas(px_per_pt)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    factor: f32,
}

impl Scale {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    /// Designer pixels → points for a template captured at `designer_scale`.
    pub fn designer(designer_scale: f32) -> Self {
        if designer_scale.is_finite() && designer_scale > 0.0 {
            Self::new(1.0 / designer_scale)
        } else {
            Self::new(1.0)
        }
    }

    /// Points → canvas pixels.
    pub fn canvas(px_per_pt: f32) -> Self {
        Self::new(px_per_pt)
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn len(&self, v: f32) -> f32 {
        v * self.factor
    }

    pub fn rect(&self, r: Rect) -> Rect {
        Rect::new(
            r.x * self.factor,
            r.y * self.factor,
            r.width * self.factor,
            r.height * self.factor,
        )
    }

    pub fn coordinates(&self, c: &Coordinates) -> Rect {
        self.rect(Rect::new(c.x, c.y, c.width, c.height))
    }
}

/// Split a table rectangle into `(x, width)` column spans.
///
/// Widths are relative weights; when every weight is zero or missing the
/// columns share the width evenly. Missing weights in a partly weighted list
/// get the mean of the given ones.
pub fn column_spans(rect: Rect, weights: &[Option<f32>]) -> Vec<(f32, f32)> {
    if weights.is_empty() {
        return Vec::new();
    }
    let given: Vec<f32> = weights
        .iter()
        .filter_map(|w| *w)
        .filter(|w| w.is_finite() && *w > 0.0)
        .collect();
    let fallback = if given.is_empty() {
        1.0
    } else {
        given.iter().sum::<f32>() / given.len() as f32
    };
    let resolved: Vec<f32> = weights
        .iter()
        .map(|w| match w {
            Some(w) if w.is_finite() && *w > 0.0 => *w,
            _ => fallback,
        })
        .collect();
    let total: f32 = resolved.iter().sum();

    let mut x = rect.x;
    resolved
        .iter()
        .map(|w| {
            let width = rect.width * w / total;
            let span = (x, width);
            x += width;
            span
        })
        .collect()
}

/// Row bands of a table: the header first, then `rows` data rows, all equal height.
pub fn row_bands(rect: Rect, rows: usize) -> Vec<Rect> {
    equal_bands(rect, rows + 1)
}

/// Split a rectangle into `n` equal-height horizontal bands.
pub fn equal_bands(rect: Rect, n: usize) -> Vec<Rect> {
    if n == 0 {
        return Vec::new();
    }
    let h = rect.height / n as f32;
    (0..n)
        .map(|i| Rect::new(rect.x, rect.y + h * i as f32, rect.width, h))
        .collect()
}

/// Left edge of content `width` wide placed inside `rect` with `align`.
pub fn aligned_x(rect: Rect, width: f32, align: Align) -> f32 {
    match align {
        Align::Left => rect.x,
        Align::Center => rect.x + (rect.width - width) / 2.0,
        Align::Right => rect.right() - width,
    }
}

/// Estimated width of `text` at `size` using the average glyph advance.
pub fn text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * AVG_ADVANCE
}

/// Greedy word wrap to `width` points. Newlines always break; words longer
/// than a line are split.
pub fn wrap_text(text: &str, width: f32, size: f32) -> Vec<String> {
    let max_chars = ((width / (size * AVG_ADVANCE)).floor() as usize).max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;

        for word in paragraph.split_whitespace() {
            let mut chars: Vec<char> = word.chars().collect();
            while chars.len() > max_chars {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                lines.push(chars.drain(..max_chars).collect());
            }
            if chars.is_empty() {
                continue;
            }

            let needed = if line_len == 0 { chars.len() } else { line_len + 1 + chars.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(chars.iter());
            line_len += chars.len();
        }
        lines.push(line);
    }

    lines
}
