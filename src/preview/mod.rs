//! # Plan to PNG Preview Renderer
//!
//! Renders one page of a [`Plan`] onto an RGBA canvas and encodes it as PNG.
//!
//! ## Architecture
//!
//! ```text
//! Plan → PreviewRenderer → PNG bytes
//!             ↓
//!       For each op on the page:
//!       - Text: Spleen glyphs scaled to the font size
//!       - Stroke / Line / Checkbox: 1px+ rules
//!       - Image: decode data URL, fit into the box
//! ```
//!
//! Page points map to canvas pixels through [`RenderOptions::scale`]
//! (1.5 px/pt by default). Bold text is double-struck and italic text is
//! sheared. An optional background raster (the rendered source page) is
//! stretched under everything else.
//!
//! ## Example
//!
//! ```
//! use plantilla::layout::Plan;
//! use plantilla::preview::{RenderOptions, render_page};
//! use plantilla::template::PageSize;
//!
//! let plan = Plan::new(vec![PageSize::A4]);
//! let png = render_page(&plan, 1, &RenderOptions::default()).unwrap();
//! assert_eq!(&png[1..4], b"PNG");
//! ```

mod font;

pub use font::{Bitmap, Face, GlyphCache, glyph};

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use thiserror::Error;
use tracing::warn;

use crate::layout::{Op, Plan, Rect, Scale, TextStyle, aligned_x};
use crate::template::PageSize;

/// Default canvas resolution in pixels per point.
pub const DEFAULT_PREVIEW_SCALE: f32 = 1.5;

/// Largest accepted canvas resolution in pixels per point.
pub const MAX_PREVIEW_SCALE: f32 = 8.0;

/// Largest canvas, in pixels, a page may render to.
pub const MAX_CANVAS_PIXELS: u64 = 40_000_000;

/// Glyphs taller than this many pixels are drawn at this height.
const MAX_GLYPH_PX: f32 = 2048.0;

/// Italic shear: horizontal shift per pixel of height.
const ITALIC_SHEAR: f32 = 0.2;

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Errors that can occur during preview rendering.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Image encoding error: {0}")]
    ImageEncode(String),

    #[error("Image decoding error: {0}")]
    ImageDecode(String),

    #[error("Page {0} does not exist")]
    NoSuchPage(u32),

    #[error("Invalid scale: {0}")]
    InvalidScale(f32),

    #[error("Canvas of {0}x{1} pixels is too large")]
    CanvasTooLarge(u32, u32),
}

/// Canvas settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Pixels per page point.
    pub scale: f32,
    /// Encoded raster drawn under the fields, stretched to the page.
    pub background: Option<Vec<u8>>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_PREVIEW_SCALE,
            background: None,
        }
    }
}

impl RenderOptions {
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_background(mut self, bytes: Vec<u8>) -> Self {
        self.background = Some(bytes);
        self
    }
}

/// Preview renderer for a single page.
pub struct PreviewRenderer {
    canvas: RgbaImage,
    scale: Scale,
    glyphs: GlyphCache,
}

impl PreviewRenderer {
    /// Create a white canvas for a page.
    pub fn new(page: PageSize, scale: f32) -> Result<Self, PreviewError> {
        if !scale.is_finite() || scale <= 0.0 || scale > MAX_PREVIEW_SCALE {
            return Err(PreviewError::InvalidScale(scale));
        }
        let width = (page.width * scale).round().max(1.0) as u32;
        let height = (page.height * scale).round().max(1.0) as u32;
        if width as u64 * height as u64 > MAX_CANVAS_PIXELS {
            return Err(PreviewError::CanvasTooLarge(width, height));
        }
        Ok(Self {
            canvas: RgbaImage::from_pixel(width, height, WHITE),
            scale: Scale::canvas(scale),
            glyphs: GlyphCache::default(),
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Stretch an encoded raster over the whole canvas.
    pub fn background(&mut self, bytes: &[u8]) -> Result<(), PreviewError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| PreviewError::ImageDecode(e.to_string()))?;
        let resized = img
            .resize_exact(self.width(), self.height(), FilterType::Triangle)
            .to_rgba8();
        imageops::overlay(&mut self.canvas, &resized, 0, 0);
        Ok(())
    }

    /// Draw every op of `page` in order.
    pub fn draw_page(&mut self, plan: &Plan, page: u32) {
        for op in plan.ops_on_page(page) {
            self.draw(op);
        }
    }

    /// Draw one op.
    pub fn draw(&mut self, op: &Op) {
        match op {
            Op::Text {
                rect, lines, style, ..
            } => self.text(*rect, lines, style),

            Op::Stroke {
                rect, color, width, ..
            } => self.outline(self.scale.rect(*rect), *color, *width),

            Op::Line {
                from,
                to,
                color,
                width,
                ..
            } => {
                let s = self.scale.factor();
                let thickness = self.thickness(*width);
                self.line(
                    (from.0 * s, from.1 * s),
                    (to.0 * s, to.1 * s),
                    *color,
                    thickness,
                );
            }

            Op::Checkbox {
                rect,
                checked,
                color,
                ..
            } => {
                let r = self.scale.rect(*rect);
                self.outline(r, *color, 1.0);
                if *checked {
                    let m = r.inset(r.width * 0.2);
                    let t = self.thickness(1.0);
                    self.line((m.x, m.y), (m.right(), m.bottom()), *color, t);
                    self.line((m.right(), m.y), (m.x, m.bottom()), *color, t);
                }
            }

            Op::Image { rect, data, .. } => {
                let r = self.scale.rect(*rect);
                match load_image(data) {
                    Ok(img) => self.image(r, &img),
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable image");
                        self.outline(r, [160, 160, 160], 1.0);
                        self.line((r.x, r.y), (r.right(), r.bottom()), [160, 160, 160], 1);
                    }
                }
            }
        }
    }

    /// Encode the canvas as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, PreviewError> {
        encode_png(&self.canvas)
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas
    }

    /// Rule thickness in pixels for a width in points; never thinner than 1px.
    fn thickness(&self, width_pt: f32) -> u32 {
        self.scale.len(width_pt).round().max(1.0) as u32
    }

    fn set_pixel(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as u32, y as u32);
        if x < self.canvas.width() && y < self.canvas.height() {
            self.canvas.put_pixel(x, y, Rgba([color[0], color[1], color[2], 255]));
        }
    }

    /// Fill a pixel rectangle, clipped to the canvas.
    fn fill(&mut self, x0: i64, y0: i64, w: i64, h: i64, color: [u8; 3]) {
        let (cw, ch) = (self.canvas.width() as i64, self.canvas.height() as i64);
        let (xs, xe) = (x0.max(0), x0.saturating_add(w).min(cw));
        let (ys, ye) = (y0.max(0), y0.saturating_add(h).min(ch));
        for y in ys..ye {
            for x in xs..xe {
                self.set_pixel(x, y, color);
            }
        }
    }

    fn outline(&mut self, r: Rect, color: [u8; 3], width_pt: f32) {
        let t = self.thickness(width_pt) as i64;
        let (x0, y0) = (r.x.round() as i64, r.y.round() as i64);
        let (x1, y1) = (r.right().round() as i64, r.bottom().round() as i64);
        let (w, h) = (x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1));
        self.fill(x0, y0, w, t, color);
        self.fill(x0, y1.saturating_sub(t), w, t, color);
        self.fill(x0, y0, t, h, color);
        self.fill(x1.saturating_sub(t), y0, t, h, color);
    }

    /// Line with a square brush, stepped one pixel at a time along the major axis.
    /// Only the part of the segment near the canvas is stepped.
    fn line(&mut self, from: (f32, f32), to: (f32, f32), color: [u8; 3], thickness: u32) {
        let (x0, y0) = (from.0 as f64, from.1 as f64);
        let (dx, dy) = (to.0 as f64 - x0, to.1 as f64 - y0);
        let margin = thickness as f64 + 1.0;
        let x_span = clip_span(x0, dx, -margin, self.canvas.width() as f64 + margin);
        let y_span = clip_span(y0, dy, -margin, self.canvas.height() as f64 + margin);
        let (Some((ax, bx)), Some((ay, by))) = (x_span, y_span) else {
            return;
        };
        let (start, end) = (ax.max(ay), bx.min(by));
        if start > end {
            return;
        }

        let steps = dx.abs().max(dy.abs()).ceil().max(1.0);
        let t = thickness as i64;
        let half = (t - 1) / 2;
        let first = (start * steps).floor() as i64;
        // Rounding on very long segments must not widen the visible run.
        let budget = (self.canvas.width() + self.canvas.height()) as i64 + 4 * margin as i64;
        let last = ((end * steps).ceil() as i64).min(first.saturating_add(budget));
        for i in first..=last {
            let f = i as f64 / steps;
            let x = (x0 + dx * f).round() as i64 - half;
            let y = (y0 + dy * f).round() as i64 - half;
            self.fill(x, y, t, t, color);
        }
    }

    fn image(&mut self, r: Rect, img: &DynamicImage) {
        let (w, h) = (r.width.round() as u32, r.height.round() as u32);
        if w == 0 || h == 0 {
            return;
        }
        if w as u64 * h as u64 > MAX_CANVAS_PIXELS {
            warn!(width = w, height = h, "skipping oversized image box");
            return;
        }
        // Fit inside the box keeping the aspect ratio, centered.
        let fitted = img.resize(w, h, FilterType::Triangle).to_rgba8();
        let x = r.x.round() as i64 + (w as i64 - fitted.width() as i64) / 2;
        let y = r.y.round() as i64 + (h as i64 - fitted.height() as i64) / 2;
        imageops::overlay(&mut self.canvas, &fitted, x, y);
    }

    fn text(&mut self, rect: Rect, lines: &[String], style: &TextStyle) {
        let s = self.scale.factor();
        let glyph_h = (style.size * s).round().clamp(1.0, MAX_GLYPH_PX) as usize;
        let glyph_w = (glyph_h / 2).max(1);
        let face = Face::for_height(glyph_h);
        let pad = (style.line_height() - style.size) / 2.0;
        let strike = if style.bold { (glyph_h / 16).max(1) } else { 0 };

        let (cw, ch) = (self.canvas.width() as i64, self.canvas.height() as i64);
        let (gw, gh) = (glyph_w as i64, glyph_h as i64);
        let overhang = (glyph_h as f32 * ITALIC_SHEAR) as i64 + strike as i64;

        for (i, line) in lines.iter().enumerate() {
            let top = rect.y + pad + style.line_height() * i as f32;
            let y0 = (top * s).round() as i64;
            if y0 >= ch || y0 + gh <= 0 {
                continue;
            }
            let width = line.chars().count() as f32 * glyph_w as f32;
            let left = aligned_x(self.scale.rect(rect), width, style.align);

            // Rows of the glyph cell that land on the canvas.
            let rows = (-y0).max(0) as usize..(ch - y0).min(gh) as usize;
            for (n, c) in line.chars().enumerate() {
                let x0 = (left.round() as i64).saturating_add(n as i64 * gw);
                if x0 >= cw {
                    break;
                }
                if c.is_whitespace() || x0 + gw + overhang <= 0 {
                    continue;
                }
                let bitmap = self.glyphs.get(face, c).clone();
                for dy in rows.clone() {
                    let shear = if style.italic {
                        ((glyph_h - dy) as f32 * ITALIC_SHEAR) as i64
                    } else {
                        0
                    };
                    let cols = (-(x0 + shear + strike as i64)).max(0) as usize
                        ..(cw - x0 - shear).clamp(0, gw) as usize;
                    for dx in cols {
                        if !bitmap.sample(dx, dy, glyph_w, glyph_h) {
                            continue;
                        }
                        for b in 0..=strike {
                            self.set_pixel(
                                x0 + dx as i64 + shear + b as i64,
                                y0 + dy as i64,
                                style.color,
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Parameter range `[t0, t1]` within `[0, 1]` where `p + d * t` lies in `[lo, hi]`.
fn clip_span(p: f64, d: f64, lo: f64, hi: f64) -> Option<(f64, f64)> {
    if d == 0.0 {
        return (lo..=hi).contains(&p).then_some((0.0, 1.0));
    }
    let (a, b) = ((lo - p) / d, (hi - p) / d);
    let (t0, t1) = (a.min(b).max(0.0), a.max(b).min(1.0));
    (t0 <= t1).then_some((t0, t1))
}

/// Decode a `data:` URL (or bare base64) into raw bytes.
pub fn decode_data_url(data: &str) -> Result<Vec<u8>, PreviewError> {
    let payload = match data.strip_prefix("data:") {
        Some(rest) => {
            let (meta, payload) = rest
                .split_once(',')
                .ok_or_else(|| PreviewError::ImageDecode("data URL without payload".into()))?;
            if !meta.ends_with(";base64") {
                return Err(PreviewError::ImageDecode(format!(
                    "unsupported data URL encoding '{}'",
                    meta
                )));
            }
            payload
        }
        None => data,
    };
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(cleaned)
        .map_err(|e| PreviewError::ImageDecode(e.to_string()))
}

/// Decode an image or signature value.
pub fn load_image(data: &str) -> Result<DynamicImage, PreviewError> {
    let bytes = decode_data_url(data)?;
    image::load_from_memory(&bytes).map_err(|e| PreviewError::ImageDecode(e.to_string()))
}

/// Render one page of a plan to a canvas.
pub fn render_canvas(plan: &Plan, page: u32, options: &RenderOptions) -> Result<RgbaImage, PreviewError> {
    let size = plan.page_size(page).ok_or(PreviewError::NoSuchPage(page))?;
    let mut renderer = PreviewRenderer::new(size, options.scale)?;
    if let Some(bg) = &options.background {
        renderer.background(bg)?;
    }
    renderer.draw_page(plan, page);
    Ok(renderer.into_image())
}

/// Render one page of a plan to PNG bytes.
pub fn render_page(plan: &Plan, page: u32, options: &RenderOptions) -> Result<Vec<u8>, PreviewError> {
    encode_png(&render_canvas(plan, page, options)?)
}

fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, PreviewError> {
    let mut png_bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)
        .map_err(|e| PreviewError::ImageEncode(e.to_string()))?;
    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Align, FieldStyle};

    fn page(w: f32, h: f32) -> Plan {
        Plan::new(vec![PageSize {
            width: w,
            height: h,
        }])
    }

    fn dark(img: &RgbaImage, x0: u32, y0: u32, x1: u32, y1: u32) -> usize {
        let mut n = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                if img.get_pixel(x, y)[0] < 128 {
                    n += 1;
                }
            }
        }
        n
    }

    fn png_1x1() -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_canvas_size_follows_scale() {
        let plan = page(100.0, 50.0);
        let img = render_canvas(&plan, 1, &RenderOptions::default()).unwrap();
        assert_eq!((img.width(), img.height()), (150, 75));
        assert_eq!(dark(&img, 0, 0, 150, 75), 0);
    }

    #[test]
    fn test_missing_page() {
        let plan = page(10.0, 10.0);
        assert!(matches!(
            render_page(&plan, 2, &RenderOptions::default()),
            Err(PreviewError::NoSuchPage(2))
        ));
        assert!(matches!(
            render_page(&plan, 1, &RenderOptions::default().with_scale(0.0)),
            Err(PreviewError::InvalidScale(_))
        ));
    }

    #[test]
    fn test_text_draws_inside_box() {
        let mut plan = page(200.0, 100.0);
        plan.push(Op::Text {
            page: 1,
            rect: Rect::new(10.0, 10.0, 100.0, 20.0),
            lines: vec!["Hello".into()],
            style: TextStyle::from(&FieldStyle::default()),
        });
        let img = render_canvas(&plan, 1, &RenderOptions::default().with_scale(1.0)).unwrap();
        assert!(dark(&img, 10, 10, 110, 30) > 0);
        assert_eq!(dark(&img, 0, 40, 200, 100), 0);
    }

    #[test]
    fn test_bold_has_more_ink() {
        let draw = |bold: bool| {
            let mut plan = page(200.0, 60.0);
            let mut style = TextStyle::from(&FieldStyle::default());
            style.bold = bold;
            plan.push(Op::Text {
                page: 1,
                rect: Rect::new(0.0, 0.0, 200.0, 30.0),
                lines: vec!["Bold".into()],
                style,
            });
            let img = render_canvas(&plan, 1, &RenderOptions::default()).unwrap();
            dark(&img, 0, 0, img.width(), img.height())
        };
        assert!(draw(true) > draw(false));
    }

    #[test]
    fn test_checkbox_and_lines() {
        let mut plan = page(50.0, 50.0);
        plan.push(Op::Checkbox {
            page: 1,
            rect: Rect::new(10.0, 10.0, 20.0, 20.0),
            checked: true,
            color: [0, 0, 0],
        });
        let img = render_canvas(&plan, 1, &RenderOptions::default().with_scale(1.0)).unwrap();
        // border and the cross center
        assert_eq!(img.get_pixel(10, 20)[0], 0);
        assert_eq!(img.get_pixel(20, 20)[0], 0);
        assert_eq!(img.get_pixel(40, 40)[0], 255);
    }

    #[test]
    fn test_image_op_and_background() {
        let data = format!("data:image/png;base64,{}", STANDARD.encode(png_1x1()));
        let mut plan = page(20.0, 20.0);
        plan.push(Op::Image {
            page: 1,
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            data,
        });
        let options = RenderOptions::default()
            .with_scale(1.0)
            .with_background(png_1x1());
        let img = render_canvas(&plan, 1, &options).unwrap();
        assert_eq!(img.get_pixel(5, 5), &Rgba([0, 0, 255, 255]));
        assert_eq!(img.get_pixel(15, 15), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_decode_data_url() {
        assert_eq!(decode_data_url("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_data_url("aGk=").unwrap(), b"hi");
        assert!(decode_data_url("data:text/plain,hi").is_err());
        assert!(load_image("data:image/png;base64,aGk=").is_err());
    }

    fn text_plan(style: TextStyle, rect: Rect, line: &str) -> RgbaImage {
        let mut plan = page(200.0, 40.0);
        plan.push(Op::Text {
            page: 1,
            rect,
            lines: vec![line.into()],
            style,
        });
        render_canvas(&plan, 1, &RenderOptions::default().with_scale(1.0)).unwrap()
    }

    /// Leftmost and rightmost columns holding any dark pixel.
    fn ink_columns(img: &RgbaImage) -> (u32, u32) {
        let columns: Vec<u32> = (0..img.width())
            .filter(|&x| dark(img, x, 0, x + 1, img.height()) > 0)
            .collect();
        (columns[0], columns[columns.len() - 1])
    }

    #[test]
    fn test_alignment_moves_text() {
        let rect = Rect::new(0.0, 0.0, 200.0, 20.0);
        let with_align = |align: Align| {
            let mut style = TextStyle::from(&FieldStyle::default());
            style.align = align;
            ink_columns(&text_plan(style, rect, "MM"))
        };

        // 12px glyphs are 6px wide, so "MM" spans 12px
        let (left, _) = with_align(Align::Left);
        let (center, _) = with_align(Align::Center);
        let (_, right) = with_align(Align::Right);
        assert!(left < 6);
        assert!((94..=100).contains(&center), "centered ink starts at {center}");
        assert!((188..200).contains(&right), "right ink ends at {right}");
    }

    #[test]
    fn test_italic_shears_toward_the_top() {
        let rect = Rect::new(20.0, 0.0, 100.0, 20.0);
        let draw = |italic: bool| {
            let mut style = TextStyle::from(&FieldStyle::default());
            style.italic = italic;
            text_plan(style, rect, "l")
        };
        let upright = draw(false);
        let italic = draw(true);

        // the first text row sits at the top of the glyph cell, where the shear is largest
        let first_row = |img: &RgbaImage| {
            (0..img.height())
                .find(|&y| dark(img, 0, y, img.width(), y + 1) > 0)
                .unwrap()
        };
        let ink_start = |img: &RgbaImage, y: u32| {
            (0..img.width()).find(|&x| img.get_pixel(x, y)[0] < 128).unwrap()
        };
        let y = first_row(&upright);
        assert_eq!(first_row(&italic), y);
        assert!(ink_start(&italic, y) > ink_start(&upright, y));
        assert_eq!(dark(&italic, 0, 0, 200, 40), dark(&upright, 0, 0, 200, 40));
    }

    #[test]
    fn test_offscreen_geometry_is_clipped() {
        let mut plan = page(50.0, 50.0);
        let mut huge = TextStyle::from(&FieldStyle::default());
        huge.size = 1.0e9;
        plan.push(Op::Text {
            page: 1,
            rect: Rect::new(-1.0e9, -1.0e9, 2.0e9, 2.0e9),
            lines: vec!["W".repeat(1000)],
            style: huge,
        });
        plan.push(Op::Stroke {
            page: 1,
            rect: Rect::new(-1.0e12, 10.0, 2.0e12, 1.0e12),
            color: [0, 0, 0],
            width: 1.0,
        });
        plan.push(Op::Line {
            page: 1,
            from: (-1.0e15, 25.0),
            to: (1.0e15, 25.0),
            color: [0, 0, 0],
            width: 1.0,
        });
        plan.push(Op::Line {
            page: 1,
            from: (-1.0e15, -1.0e15),
            to: (-1.0e15 + 1.0, 1.0e15),
            color: [0, 0, 0],
            width: 1.0,
        });
        let img = render_canvas(&plan, 1, &RenderOptions::default().with_scale(1.0)).unwrap();
        // the horizontal rules cross the canvas; the far-left line never reaches it
        assert_eq!(img.get_pixel(25, 10)[0], 0);
        assert_eq!(img.get_pixel(25, 25)[0], 0);
    }

    #[test]
    fn test_scale_and_canvas_limits() {
        let plan = page(100.0, 100.0);
        assert!(matches!(
            render_page(&plan, 1, &RenderOptions::default().with_scale(MAX_PREVIEW_SCALE * 2.0)),
            Err(PreviewError::InvalidScale(_))
        ));
        let wide = page(14_400.0, 14_400.0);
        assert!(matches!(
            render_page(&wide, 1, &RenderOptions::default().with_scale(1.0)),
            Err(PreviewError::CanvasTooLarge(14_400, 14_400))
        ));
    }

    #[test]
    fn test_clip_span() {
        assert_eq!(clip_span(0.0, 10.0, 2.0, 5.0), Some((0.2, 0.5)));
        assert_eq!(clip_span(5.0, -10.0, 0.0, 10.0), Some((0.0, 0.5)));
        assert_eq!(clip_span(20.0, 0.0, 0.0, 10.0), None);
        assert_eq!(clip_span(20.0, 5.0, 0.0, 10.0), None);
    }
}
