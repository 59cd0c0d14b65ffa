//! CBIN bitmap font format
//!
//! A pointer-relocatable bitmap font container. Glyph coverage is quantized
//! to 1/2/3/4/8 bpp, bit-packed (optionally RLE compressed) and indexed by
//! glyph descriptors; character codes map to glyph ids through compact cmap
//! subtables. See [`encoder`] for the byte layout.

mod bitstream;
pub mod cmap;
pub mod compress;
pub mod encoder;
pub mod quantize;
pub mod reader;

pub use cmap::{CmapEntries, CmapFormat, CmapSubtable, plan_cmaps, validate_plan};
pub use encoder::{GlyphDescriptorRecord, GlyphSet, build_font, encode_font};
pub use quantize::quantize;
pub use reader::CbinFont;

use crate::error::{BundleError, Result, Stage};

/// Bits per pixel used to store anti-aliased coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bpp {
    One,
    Two,
    Three,
    Four,
    Eight,
}

impl Bpp {
    pub fn bits(&self) -> u8 {
        match self {
            Bpp::One => 1,
            Bpp::Two => 2,
            Bpp::Three => 3,
            Bpp::Four => 4,
            Bpp::Eight => 8,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Bpp::One),
            2 => Some(Bpp::Two),
            3 => Some(Bpp::Three),
            4 => Some(Bpp::Four),
            8 => Some(Bpp::Eight),
            _ => None,
        }
    }

    /// Largest sample value at this depth
    pub fn max_value(&self) -> u8 {
        ((1u16 << self.bits()) - 1) as u8
    }
}

impl TryFrom<u8> for Bpp {
    type Error = BundleError;

    fn try_from(bits: u8) -> Result<Self> {
        Bpp::from_bits(bits).ok_or_else(|| {
            BundleError::config(
                Stage::Font,
                "bpp",
                format!("unsupported bpp {} (expected 1, 2, 3, 4 or 8)", bits),
            )
        })
    }
}

/// Glyph bounding box relative to the pen position and baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphBox {
    /// Left edge offset from the pen position
    pub x: i16,
    /// Bottom edge offset from the baseline (positive = above)
    pub y: i16,
    pub w: u16,
    pub h: u16,
}

/// One rasterized glyph
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub codepoint: u32,
    /// Row-major 8-bit coverage, `bbox.w * bbox.h` samples
    pub pixels: Vec<u8>,
    pub bbox: GlyphBox,
    /// Advance width in pixels
    pub advance_width: f32,
}

impl Glyph {
    pub fn new(codepoint: u32, bbox: GlyphBox, pixels: Vec<u8>, advance_width: f32) -> Self {
        Self {
            codepoint,
            pixels,
            bbox,
            advance_width,
        }
    }

    /// A glyph with no ink (space, zero-width marks)
    pub fn blank(codepoint: u32, advance_width: f32) -> Self {
        Self::new(codepoint, GlyphBox::default(), Vec::new(), advance_width)
    }

    /// Advance width in 1/16 pixel units
    pub fn advance_q4(&self) -> u32 {
        (self.advance_width * 16.0).round().max(0.0) as u32
    }
}

/// Bitmap storage mode written into the font descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BitmapFormat {
    Raw = 0,
    CompressedPrefiltered = 1,
    Compressed = 2,
}

impl BitmapFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BitmapFormat::Raw),
            1 => Some(BitmapFormat::CompressedPrefiltered),
            2 => Some(BitmapFormat::Compressed),
            _ => None,
        }
    }
}

/// Font-wide parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontDescriptor {
    pub bpp: Bpp,
    pub compressed: bool,
    /// XOR each row with the previous one before compressing
    pub prefilter: bool,
    pub ascent: i32,
    /// Negative below the baseline
    pub descent: i32,
    pub underline_position: i8,
    pub underline_thickness: i8,
}

impl FontDescriptor {
    pub fn new(bpp: Bpp, ascent: i32, descent: i32) -> Self {
        Self {
            bpp,
            compressed: false,
            prefilter: true,
            ascent,
            descent,
            underline_position: 0,
            underline_thickness: 0,
        }
    }

    pub fn line_height(&self) -> u32 {
        (self.ascent - self.descent).max(0) as u32
    }

    pub fn base_line(&self) -> i32 {
        -self.descent
    }

    pub fn bitmap_format(&self) -> BitmapFormat {
        match (self.compressed, self.prefilter) {
            (false, _) => BitmapFormat::Raw,
            (true, true) => BitmapFormat::CompressedPrefiltered,
            (true, false) => BitmapFormat::Compressed,
        }
    }

    /// Reject combinations the runtime cannot decode
    pub fn validate(&self, asset: &str) -> Result<()> {
        if self.bpp == Bpp::Three && !self.compressed {
            return Err(BundleError::config(
                Stage::Font,
                asset,
                "bpp 3 is only supported with compression enabled",
            ));
        }
        if self.ascent < self.descent {
            return Err(BundleError::config(
                Stage::Font,
                asset,
                format!("ascent {} below descent {}", self.ascent, self.descent),
            ));
        }
        Ok(())
    }
}

/// Size of a pointer field in the relocatable layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointerWidth {
    #[default]
    Four,
    Eight,
}

impl PointerWidth {
    pub fn bytes(&self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }

    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            4 => Some(PointerWidth::Four),
            8 => Some(PointerWidth::Eight),
            _ => None,
        }
    }
}

/// Horizontal kerning between two codepoints, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernPair {
    pub left: u32,
    pub right: u32,
    pub value: f32,
}

/// Encoder settings that do not belong to the font itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    pub pointer_width: PointerWidth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bpp_roundtrip() {
        for bits in [1u8, 2, 3, 4, 8] {
            assert_eq!(Bpp::from_bits(bits).unwrap().bits(), bits);
        }
        assert!(Bpp::from_bits(5).is_none());
        assert!(matches!(Bpp::try_from(6), Err(BundleError::Config { .. })));
    }

    #[test]
    fn test_bpp_max_value() {
        assert_eq!(Bpp::One.max_value(), 1);
        assert_eq!(Bpp::Three.max_value(), 7);
        assert_eq!(Bpp::Eight.max_value(), 255);
    }

    #[test]
    fn test_bpp3_requires_compression() {
        let mut desc = FontDescriptor::new(Bpp::Three, 12, -4);
        assert!(matches!(desc.validate("f"), Err(BundleError::Config { .. })));

        desc.compressed = true;
        assert!(desc.validate("f").is_ok());
    }

    #[test]
    fn test_bitmap_format() {
        let mut desc = FontDescriptor::new(Bpp::Four, 12, -4);
        assert_eq!(desc.bitmap_format(), BitmapFormat::Raw);
        desc.compressed = true;
        assert_eq!(desc.bitmap_format(), BitmapFormat::CompressedPrefiltered);
        desc.prefilter = false;
        assert_eq!(desc.bitmap_format(), BitmapFormat::Compressed);
    }

    #[test]
    fn test_line_metrics() {
        let desc = FontDescriptor::new(Bpp::Four, 13, -3);
        assert_eq!(desc.line_height(), 16);
        assert_eq!(desc.base_line(), 3);
    }

    #[test]
    fn test_advance_q4() {
        assert_eq!(Glyph::blank(0x20, 4.0).advance_q4(), 64);
        assert_eq!(Glyph::blank(0x20, 4.53).advance_q4(), 72);
        assert_eq!(Glyph::blank(0x20, -1.0).advance_q4(), 0);
    }
}
