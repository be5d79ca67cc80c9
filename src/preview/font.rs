//! Spleen bitmap glyphs for preview text.
//!
//! Three Spleen faces are bundled; the renderer picks the one closest to the
//! target pixel height and scales it with nearest-neighbor sampling.

use std::collections::HashMap;

use spleen_font::{FONT_6X12, FONT_8X16, FONT_12X24, PSF2Font};

/// A bundled Spleen face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    /// 6x12
    Small,
    /// 8x16
    Medium,
    /// 12x24
    Large,
}

impl Face {
    /// Face whose native height best serves a glyph `px` pixels tall.
    pub fn for_height(px: usize) -> Face {
        match px {
            0..=13 => Face::Small,
            14..=19 => Face::Medium,
            _ => Face::Large,
        }
    }

    /// Native cell size (width, height).
    pub fn cell(self) -> (usize, usize) {
        match self {
            Face::Small => (6, 12),
            Face::Medium => (8, 16),
            Face::Large => (12, 24),
        }
    }

    fn data(self) -> &'static [u8] {
        match self {
            Face::Small => FONT_6X12,
            Face::Medium => FONT_8X16,
            Face::Large => FONT_12X24,
        }
    }
}

/// A 1-bit glyph bitmap, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    pub width: usize,
    pub height: usize,
    pub bits: Vec<bool>,
}

impl Bitmap {
    fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    /// Nearest-neighbor sample at a target cell of `dst_w` x `dst_h`.
    pub fn sample(&self, dx: usize, dy: usize, dst_w: usize, dst_h: usize) -> bool {
        if dst_w == 0 || dst_h == 0 {
            return false;
        }
        self.get(dx * self.width / dst_w, dy * self.height / dst_h)
    }
}

/// Render one character in a face. Characters the face lacks become a box.
pub fn glyph(face: Face, ch: char) -> Bitmap {
    let (w, h) = face.cell();
    let mut bitmap = Bitmap::blank(w, h);

    let Ok(mut font) = PSF2Font::new(face.data()) else {
        draw_box(&mut bitmap);
        return bitmap;
    };

    let utf8 = ch.to_string();
    match font.glyph_for_utf8(utf8.as_bytes()) {
        Some(rows) => {
            for (y, row) in rows.enumerate() {
                for (x, on) in row.enumerate() {
                    if x < w && y < h {
                        bitmap.bits[y * w + x] = on;
                    }
                }
            }
        }
        None => draw_box(&mut bitmap),
    }
    bitmap
}

fn draw_box(bitmap: &mut Bitmap) {
    let (w, h) = (bitmap.width, bitmap.height);
    for x in 1..w - 1 {
        bitmap.bits[2 * w + x] = true;
        bitmap.bits[(h - 3) * w + x] = true;
    }
    for y in 2..h - 2 {
        bitmap.bits[y * w + 1] = true;
        bitmap.bits[y * w + w - 2] = true;
    }
}

/// Memoized glyph lookups for one render.
#[derive(Default)]
pub struct GlyphCache {
    glyphs: HashMap<(Face, char), Bitmap>,
}

impl GlyphCache {
    pub fn get(&mut self, face: Face, ch: char) -> &Bitmap {
        self.glyphs
            .entry((face, ch))
            .or_insert_with(|| glyph(face, ch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_face_for_height() {
        assert_eq!(Face::for_height(8), Face::Small);
        assert_eq!(Face::for_height(16), Face::Medium);
        assert_eq!(Face::for_height(18), Face::Medium);
        assert_eq!(Face::for_height(40), Face::Large);
    }

    #[test]
    fn test_glyph_has_ink() {
        for face in [Face::Small, Face::Medium, Face::Large] {
            let g = glyph(face, 'A');
            assert_eq!((g.width, g.height), face.cell());
            assert!(g.bits.iter().any(|b| *b), "{face:?} 'A' is blank");
        }
    }

    #[test]
    fn test_space_is_blank() {
        assert!(glyph(Face::Large, ' ').bits.iter().all(|b| !*b));
    }

    #[test]
    fn test_sample_scales() {
        let g = glyph(Face::Small, 'I');
        // doubling keeps every source pixel
        let on = (0..24)
            .flat_map(|y| (0..12).map(move |x| (x, y)))
            .filter(|(x, y)| g.sample(*x, *y, 12, 24))
            .count();
        assert_eq!(on, g.bits.iter().filter(|b| **b).count() * 4);
    }

    #[test]
    fn test_cache_reuses() {
        let mut cache = GlyphCache::default();
        let a = cache.get(Face::Medium, 'x').clone();
        assert_eq!(&a, cache.get(Face::Medium, 'x'));
    }
}
