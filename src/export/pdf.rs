//! printpdf backend.

use std::collections::HashMap;

use image::{Rgb as Pixel, RgbImage, Rgba};
use printpdf::{
    BuiltinFont, Color, ColorBits, ColorSpace, Image, ImageTransform, ImageXObject, IndirectFontRef,
    Line, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference, Point, Px, Rgb,
};
use tracing::{debug, warn};

use super::{ExportError, Family, pt_to_mm};
use crate::layout::{Op, Plan, Rect, TextStyle, aligned_x, text_width};
use crate::preview::load_image;
use crate::template::PageSize;

/// Baseline position below the top of a line box, as a fraction of the font size.
const ASCENT: f32 = 0.8;

const CHECKBOX_RULE: f32 = 0.75;

struct PageLayer {
    layer: PdfLayerReference,
    height: f32,
}

/// Builds a PDF page by page from plan ops.
pub struct PdfExporter {
    doc: PdfDocumentReference,
    pages: Vec<PageLayer>,
    fonts: HashMap<(Family, bool, bool), IndirectFontRef>,
}

impl PdfExporter {
    /// Create a document with one blank page per size.
    pub fn new(title: &str, sizes: &[PageSize]) -> Result<Self, ExportError> {
        let (first, rest) = sizes.split_first().ok_or(ExportError::NoPages)?;
        let (doc, page1, layer1) = PdfDocument::new(
            title,
            Mm(pt_to_mm(first.width)),
            Mm(pt_to_mm(first.height)),
            "Layer 1",
        );

        let mut pages = vec![PageLayer {
            layer: doc.get_page(page1).get_layer(layer1),
            height: first.height,
        }];
        for size in rest {
            let (page, layer) = doc.add_page(
                Mm(pt_to_mm(size.width)),
                Mm(pt_to_mm(size.height)),
                "Layer 1",
            );
            pages.push(PageLayer {
                layer: doc.get_page(page).get_layer(layer),
                height: size.height,
            });
        }

        Ok(Self {
            doc,
            pages,
            fonts: HashMap::new(),
        })
    }

    /// Draw one op. Ops for pages that do not exist are skipped.
    pub fn draw(&mut self, op: &Op) -> Result<(), ExportError> {
        let Some(index) = op.page().checked_sub(1).map(|i| i as usize) else {
            return Ok(());
        };
        if index >= self.pages.len() {
            debug!(page = op.page(), "op on missing page skipped");
            return Ok(());
        }

        match op {
            Op::Text {
                rect, lines, style, ..
            } => {
                let font = self.font(style)?;
                let page = &self.pages[index];
                text(page, &font, *rect, lines, style);
            }
            Op::Stroke {
                rect, color, width, ..
            } => {
                let page = &self.pages[index];
                set_stroke(&page.layer, *color, *width);
                page.layer.add_line(outline(page.height, *rect));
            }
            Op::Line {
                from,
                to,
                color,
                width,
                ..
            } => {
                let page = &self.pages[index];
                set_stroke(&page.layer, *color, *width);
                page.layer.add_line(segment(page.height, *from, *to));
            }
            Op::Checkbox {
                rect,
                checked,
                color,
                ..
            } => {
                let page = &self.pages[index];
                set_stroke(&page.layer, *color, CHECKBOX_RULE);
                page.layer.add_line(outline(page.height, *rect));
                if *checked {
                    let m = rect.inset(rect.width * 0.2);
                    page.layer
                        .add_line(segment(page.height, (m.x, m.y), (m.right(), m.bottom())));
                    page.layer
                        .add_line(segment(page.height, (m.right(), m.y), (m.x, m.bottom())));
                }
            }
            Op::Image { rect, data, .. } => match load_image(data) {
                Ok(img) => embed_image(&self.pages[index], *rect, &img),
                Err(e) => warn!(error = %e, "skipping undecodable image"),
            },
        }
        Ok(())
    }

    /// Serialize the document.
    pub fn finish(self) -> Result<Vec<u8>, ExportError> {
        self.doc
            .save_to_bytes()
            .map_err(|e| ExportError::Pdf(e.to_string()))
    }

    fn font(&mut self, style: &TextStyle) -> Result<IndirectFontRef, ExportError> {
        let key = (Family::from_name(&style.family), style.bold, style.italic);
        if let Some(font) = self.fonts.get(&key) {
            return Ok(font.clone());
        }
        let font = self
            .doc
            .add_builtin_font(builtin(key.0, key.1, key.2))
            .map_err(|e| ExportError::Pdf(e.to_string()))?;
        self.fonts.insert(key, font.clone());
        Ok(font)
    }
}

/// Render a plan to PDF bytes.
pub fn export_pdf(plan: &Plan, title: &str) -> Result<Vec<u8>, ExportError> {
    let mut exporter = PdfExporter::new(title, &plan.pages)?;
    for op in plan {
        exporter.draw(op)?;
    }
    exporter.finish()
}

fn builtin(family: Family, bold: bool, italic: bool) -> BuiltinFont {
    match (family, bold, italic) {
        (Family::Helvetica, false, false) => BuiltinFont::Helvetica,
        (Family::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (Family::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (Family::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (Family::Times, false, false) => BuiltinFont::TimesRoman,
        (Family::Times, true, false) => BuiltinFont::TimesBold,
        (Family::Times, false, true) => BuiltinFont::TimesItalic,
        (Family::Times, true, true) => BuiltinFont::TimesBoldItalic,
        (Family::Courier, false, false) => BuiltinFont::Courier,
        (Family::Courier, true, false) => BuiltinFont::CourierBold,
        (Family::Courier, false, true) => BuiltinFont::CourierOblique,
        (Family::Courier, true, true) => BuiltinFont::CourierBoldOblique,
    }
}

fn rgb(color: [u8; 3]) -> Color {
    Color::Rgb(Rgb::new(
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
        None,
    ))
}

fn set_stroke(layer: &PdfLayerReference, color: [u8; 3], width: f32) {
    layer.set_outline_color(rgb(color));
    layer.set_outline_thickness(width);
}

/// Top-left point space → PDF point in millimetres.
fn point(page_height: f32, x: f32, y: f32) -> Point {
    Point::new(Mm(pt_to_mm(x)), Mm(pt_to_mm(page_height - y)))
}

fn segment(page_height: f32, from: (f32, f32), to: (f32, f32)) -> Line {
    Line {
        points: vec![
            (point(page_height, from.0, from.1), false),
            (point(page_height, to.0, to.1), false),
        ],
        is_closed: false,
    }
}

fn outline(page_height: f32, r: Rect) -> Line {
    Line {
        points: vec![
            (point(page_height, r.x, r.y), false),
            (point(page_height, r.right(), r.y), false),
            (point(page_height, r.right(), r.bottom()), false),
            (point(page_height, r.x, r.bottom()), false),
        ],
        is_closed: true,
    }
}

fn text(page: &PageLayer, font: &IndirectFontRef, rect: Rect, lines: &[String], style: &TextStyle) {
    page.layer.set_fill_color(rgb(style.color));
    let pad = (style.line_height() - style.size) / 2.0;

    for (i, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let baseline = rect.y + pad + style.line_height() * i as f32 + style.size * ASCENT;
        let width = text_width(line, style.size);
        let x = aligned_x(rect, width, style.align);
        page.layer.use_text(
            line.as_str(),
            style.size,
            Mm(pt_to_mm(x)),
            Mm(pt_to_mm(page.height - baseline)),
            font,
        );
    }
}

/// Embed an image fitted into `rect`, keeping its aspect ratio.
fn embed_image(page: &PageLayer, rect: Rect, img: &image::DynamicImage) {
    let rgba = img.to_rgba8();
    let (width_px, height_px) = rgba.dimensions();
    if width_px == 0 || height_px == 0 || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }

    // PDF images carry no alpha here; composite over white.
    let mut rgb_image = RgbImage::new(width_px, height_px);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as f32 / 255.0;
        let over = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)) as u8;
        rgb_image.put_pixel(x, y, Pixel([over(r), over(g), over(b)]));
    }

    let aspect = width_px as f32 / height_px as f32;
    let (w, h) = if rect.width / rect.height > aspect {
        (rect.height * aspect, rect.height)
    } else {
        (rect.width, rect.width / aspect)
    };
    let left = rect.x + (rect.width - w) / 2.0;
    let top = rect.y + (rect.height - h) / 2.0;
    let fitted = Rect::new(left, top, w, h);

    let pdf_image = Image::from(ImageXObject {
        width: Px(width_px as usize),
        height: Px(height_px as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: true,
        image_data: rgb_image.into_raw(),
        image_filter: None,
        clipping_bbox: None,
        smask: None,
    });

    // DPI that makes the pixel width span the fitted width.
    let dpi = width_px as f32 / (w / 72.0);
    pdf_image.add_to_layer(
        page.layer.clone(),
        ImageTransform {
            translate_x: Some(Mm(pt_to_mm(fitted.x))),
            translate_y: Some(Mm(pt_to_mm(fitted.flipped_y(page.height)))),
            dpi: Some(dpi),
            ..Default::default()
        },
    );
}
