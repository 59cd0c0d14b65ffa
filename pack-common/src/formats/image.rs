//! Raster image descriptor format (`.bin` backgrounds and emoji)
//!
//! A 28-byte descriptor header followed immediately by the pixel buffer.
//! Pixels are RGB565, little-endian, row-major, no padding between rows
//! (stride = width × 2). Images with transparency use RGB565A8: the RGB565
//! plane followed by a width × height alpha plane.
//!
//! # Layout
//! ```text
//! 0x00: magic u8 (0x19)
//! 0x01: color_format u8 (0x12 = RGB565, 0x14 = RGB565A8)
//! 0x02: flags u16
//! 0x04: width u16
//! 0x06: height u16
//! 0x08: stride u16
//! 0x0A: reserved u16
//! 0x0C: data_size u32
//! 0x10: data_offset u32 (= 28)
//! 0x14: reserved u32
//! 0x18: reserved2 u32
//! 0x1C: pixel data
//! ```

use super::serialization::{read_u16, read_u32};
use crate::error::{BundleError, Result, Stage};

/// Descriptor magic byte
pub const IMAGE_MAGIC: u8 = 0x19;

/// Pixel layout of the image payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColorFormat {
    /// 16-bit 5:6:5 colour
    Rgb565 = 0x12,
    /// RGB565 plane followed by an 8-bit alpha plane
    Rgb565A8 = 0x14,
}

impl ColorFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x12 => Some(ColorFormat::Rgb565),
            0x14 => Some(ColorFormat::Rgb565A8),
            _ => None,
        }
    }

    /// Payload size for the given dimensions
    pub fn data_size(&self, width: u16, height: u16) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            ColorFormat::Rgb565 => pixels * 2,
            ColorFormat::Rgb565A8 => pixels * 3,
        }
    }

    /// Manifest name of the format
    pub fn name(&self) -> &'static str {
        match self {
            ColorFormat::Rgb565 => "RGB565",
            ColorFormat::Rgb565A8 => "RGB565A8",
        }
    }
}

/// Image descriptor header (28 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub color_format: ColorFormat,
    pub flags: u16,
    pub width: u16,
    pub height: u16,
    pub stride: u16,
    pub data_size: u32,
    pub data_offset: u32,
}

impl ImageDescriptor {
    pub const SIZE: usize = 28;

    pub fn new(color_format: ColorFormat, width: u16, height: u16) -> Self {
        Self {
            color_format,
            flags: 0,
            width,
            height,
            stride: width.wrapping_mul(2),
            data_size: color_format.data_size(width, height) as u32,
            data_offset: Self::SIZE as u32,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = IMAGE_MAGIC;
        bytes[1] = self.color_format as u8;
        bytes[2..4].copy_from_slice(&self.flags.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.width.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.height.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.stride.to_le_bytes());
        // 0x0A reserved stays 0
        bytes[12..16].copy_from_slice(&self.data_size.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.data_offset.to_le_bytes());
        // 0x14..0x1C reserved stay 0
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE || bytes[0] != IMAGE_MAGIC {
            return None;
        }
        Some(Self {
            color_format: ColorFormat::from_u8(bytes[1])?,
            flags: read_u16(bytes, 2)?,
            width: read_u16(bytes, 4)?,
            height: read_u16(bytes, 6)?,
            stride: read_u16(bytes, 8)?,
            data_size: read_u32(bytes, 12)?,
            data_offset: read_u32(bytes, 16)?,
        })
    }
}

/// Pack an 8-bit RGB triple into RGB565
#[inline]
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Blend one straight-alpha channel over a background channel
#[inline]
fn blend(src: u8, alpha: u8, bg: u8) -> u8 {
    let a = alpha as u32;
    ((src as u32 * a + bg as u32 * (255 - a) + 127) / 255) as u8
}

fn check_rgba_len(name: &str, width: u16, height: u16, rgba: &[u8]) -> Result<()> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(BundleError::config(
            Stage::Image,
            name,
            format!(
                "RGBA buffer has {} bytes, expected {} for {}x{}",
                rgba.len(),
                expected,
                width,
                height
            ),
        ));
    }
    if width == 0 || height == 0 || width > u16::MAX / 2 {
        return Err(BundleError::config(
            Stage::Image,
            name,
            format!("unsupported image size {}x{}", width, height),
        ));
    }
    Ok(())
}

/// Encode an RGBA8 buffer as an opaque RGB565 image.
///
/// Alpha is composited over `background` before conversion.
pub fn encode_rgb565(
    name: &str,
    width: u16,
    height: u16,
    rgba: &[u8],
    background: [u8; 3],
) -> Result<Vec<u8>> {
    check_rgba_len(name, width, height, rgba)?;

    let header = ImageDescriptor::new(ColorFormat::Rgb565, width, height);
    let mut out = Vec::with_capacity(ImageDescriptor::SIZE + header.data_size as usize);
    out.extend_from_slice(&header.to_bytes());

    for px in rgba.chunks_exact(4) {
        let a = px[3];
        let value = rgb565(
            blend(px[0], a, background[0]),
            blend(px[1], a, background[1]),
            blend(px[2], a, background[2]),
        );
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Encode an RGBA8 buffer as RGB565A8 (colour plane, then alpha plane).
pub fn encode_rgb565a8(name: &str, width: u16, height: u16, rgba: &[u8]) -> Result<Vec<u8>> {
    check_rgba_len(name, width, height, rgba)?;

    let header = ImageDescriptor::new(ColorFormat::Rgb565A8, width, height);
    let mut out = Vec::with_capacity(ImageDescriptor::SIZE + header.data_size as usize);
    out.extend_from_slice(&header.to_bytes());

    for px in rgba.chunks_exact(4) {
        out.extend_from_slice(&rgb565(px[0], px[1], px[2]).to_le_bytes());
    }
    out.extend(rgba.chunks_exact(4).map(|px| px[3]));
    Ok(out)
}
