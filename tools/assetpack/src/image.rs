//! Image decoding, fitting and RGB565 conversion.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use pack_common::formats::{encode_rgb565, encode_rgb565a8};
use pack_common::{BundleError, Result, Stage};

use crate::plan::Fit;

/// An encoded image ready for the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedImage {
    pub data: Vec<u8>,
    pub width: u16,
    pub height: u16,
}

/// Decode PNG/JPEG/GIF bytes
pub fn decode(name: &str, bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| BundleError::config(Stage::Image, name, format!("cannot decode image: {}", e)))
}

fn has_transparency(img: &DynamicImage) -> bool {
    img.color().has_alpha() && img.to_rgba8().pixels().any(|p| p.0[3] < 255)
}

/// Scale into a `width` x `height` box.
///
/// `Cover` fills the box and center-crops; `Contain` fits inside it and
/// centers the result on `canvas`.
pub fn fit_image(img: &DynamicImage, width: u32, height: u32, fit: Fit, canvas: Rgba<u8>) -> RgbaImage {
    match fit {
        Fit::Cover => img.resize_to_fill(width, height, FilterType::Lanczos3).to_rgba8(),
        Fit::Contain => {
            let scaled = img.resize(width, height, FilterType::Lanczos3).to_rgba8();
            let mut out = RgbaImage::from_pixel(width, height, canvas);
            let x = (width - scaled.width()) / 2;
            let y = (height - scaled.height()) / 2;
            imageops::overlay(&mut out, &scaled, x as i64, y as i64);
            out
        }
    }
}

/// Decode, fit and encode an image at `width` x `height`.
///
/// Contain-fitted images with transparency become RGB565A8; everything else
/// is composited over `background` into opaque RGB565.
pub fn convert_image(
    name: &str,
    bytes: &[u8],
    width: u16,
    height: u16,
    fit: Fit,
    background: [u8; 3],
) -> Result<ConvertedImage> {
    if width == 0 || height == 0 {
        return Err(BundleError::config(
            Stage::Image,
            name,
            format!("target size {}x{} must be non-zero", width, height),
        ));
    }
    let img = decode(name, bytes)?;
    let [r, g, b] = background;

    let data = if fit == Fit::Contain && has_transparency(&img) {
        let fitted = fit_image(&img, width as u32, height as u32, fit, Rgba([0, 0, 0, 0]));
        encode_rgb565a8(name, width, height, fitted.as_raw())?
    } else {
        let fitted = fit_image(&img, width as u32, height as u32, fit, Rgba([r, g, b, 255]));
        encode_rgb565(name, width, height, fitted.as_raw(), background)?
    };

    Ok(ConvertedImage {
        data,
        width,
        height,
    })
}

/// Keep the source encoding, recording its dimensions
pub fn passthrough_image(name: &str, bytes: Vec<u8>) -> Result<ConvertedImage> {
    let img = decode(name, &bytes)?;
    let (width, height) = (img.width(), img.height());
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(BundleError::config(
            Stage::Image,
            name,
            format!("image size {}x{} too large", width, height),
        ));
    }
    Ok(ConvertedImage {
        data: bytes,
        width: width as u16,
        height: height as u16,
    })
}
