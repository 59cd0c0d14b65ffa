//! Glyph rasterization behind a trait, with a fontdue implementation.

use pack_common::{BundleError, Glyph, GlyphBox, Result, Stage};

/// Vertical metrics of a face at the requested pixel size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceMetrics {
    /// Pixels above the baseline
    pub ascent: i32,
    /// Pixels below the baseline, negative
    pub descent: i32,
    pub underline_position: i8,
    pub underline_thickness: i8,
}

/// A loaded face at a fixed pixel size
pub trait GlyphRasterSource: Send + Sync {
    fn metrics(&self) -> FaceMetrics;

    /// Rasterize one codepoint; `None` if the face has no glyph for it
    fn rasterize_glyph(&self, codepoint: u32) -> Option<Glyph>;

    /// Horizontal kerning adjustment in pixels
    fn kerning(&self, left: u32, right: u32) -> Option<f32>;
}

/// Turns font file bytes into a [`GlyphRasterSource`]
pub trait FontLoader: Send + Sync {
    fn load(&self, name: &str, bytes: &[u8], size: f32) -> Result<Box<dyn GlyphRasterSource>>;
}

/// TTF/OTF rasterizer backed by fontdue
pub struct FontdueSource {
    font: fontdue::Font,
    size: f32,
}

impl FontdueSource {
    pub fn from_bytes(name: &str, bytes: &[u8], size: f32) -> Result<Self> {
        let settings = fontdue::FontSettings {
            scale: size,
            ..Default::default()
        };
        let font = fontdue::Font::from_bytes(bytes, settings).map_err(|e| {
            BundleError::config(Stage::Font, name, format!("failed to parse font: {}", e))
        })?;
        Ok(Self { font, size })
    }

    fn char_of(&self, codepoint: u32) -> Option<char> {
        let ch = char::from_u32(codepoint)?;
        (self.font.lookup_glyph_index(ch) != 0).then_some(ch)
    }
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

impl GlyphRasterSource for FontdueSource {
    fn metrics(&self) -> FaceMetrics {
        let (ascent, descent) = match self.font.horizontal_line_metrics(self.size) {
            Some(m) => (m.ascent.ceil() as i32, m.descent.floor() as i32),
            None => (self.size.ceil() as i32, 0),
        };
        // fontdue exposes no post table; derive the underline from the size
        let thickness = (self.size / 14.0).round().max(1.0) as i8;
        FaceMetrics {
            ascent,
            descent,
            underline_position: (descent / 2).clamp(i8::MIN as i32, 0) as i8,
            underline_thickness: thickness,
        }
    }

    fn rasterize_glyph(&self, codepoint: u32) -> Option<Glyph> {
        let ch = self.char_of(codepoint)?;
        let (metrics, bitmap) = self.font.rasterize(ch, self.size);
        if metrics.width == 0 || metrics.height == 0 {
            return Some(Glyph::blank(codepoint, metrics.advance_width));
        }
        let bbox = GlyphBox {
            x: clamp_i16(metrics.xmin),
            // fontdue: ymin is the offset of the bottom row from the baseline
            y: clamp_i16(metrics.ymin),
            w: metrics.width.min(u16::MAX as usize) as u16,
            h: metrics.height.min(u16::MAX as usize) as u16,
        };
        Some(Glyph::new(codepoint, bbox, bitmap, metrics.advance_width))
    }

    fn kerning(&self, left: u32, right: u32) -> Option<f32> {
        let left = self.char_of(left)?;
        let right = self.char_of(right)?;
        self.font.horizontal_kern(left, right, self.size)
    }
}

/// [`FontLoader`] producing [`FontdueSource`] faces
#[derive(Debug, Clone, Copy, Default)]
pub struct FontdueLoader;

impl FontLoader for FontdueLoader {
    fn load(&self, name: &str, bytes: &[u8], size: f32) -> Result<Box<dyn GlyphRasterSource>> {
        Ok(Box::new(FontdueSource::from_bytes(name, bytes, size)?))
    }
}
