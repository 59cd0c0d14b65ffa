//! Custom font building: charset resolution, rasterization, CBIN encoding.

pub mod charset;
pub mod raster;

pub use charset::CharsetTable;
pub use raster::{FaceMetrics, FontLoader, FontdueLoader, FontdueSource, GlyphRasterSource};

use pack_common::{
    BundleError, EncodeOptions, FontDescriptor, Glyph, KernPair, Result, Stage, build_font,
};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::bundle::CancelToken;
use crate::plan::FontSection;

/// A finished font asset
#[derive(Debug, Clone)]
pub struct FontBuild {
    pub bytes: Vec<u8>,
    pub glyph_count: usize,
    /// Requested codepoints the face has no glyph for
    pub missing: Vec<u32>,
    pub kerning_pairs: usize,
}

/// Rasterize `codepoints` in ascending order, checking for cancellation
/// between glyphs.
pub fn rasterize_glyphs(
    face: &dyn GlyphRasterSource,
    codepoints: &[u32],
    cancel: &CancelToken,
) -> Result<(Vec<Glyph>, Vec<u32>)> {
    let mut glyphs = Vec::with_capacity(codepoints.len());
    let mut missing = Vec::new();
    for &code in codepoints {
        cancel.check(Stage::Font)?;
        match face.rasterize_glyph(code) {
            Some(glyph) => glyphs.push(glyph),
            None => missing.push(code),
        }
    }
    Ok((glyphs, missing))
}

/// Collect non-zero kerning for every ordered pair of present glyphs.
///
/// Cancellation is checked once per left glyph.
pub fn collect_kerning(
    face: &dyn GlyphRasterSource,
    glyphs: &[Glyph],
    cancel: &CancelToken,
) -> Result<Vec<KernPair>> {
    let codes: Vec<u32> = glyphs.iter().map(|g| g.codepoint).collect();
    let rows = codes
        .par_iter()
        .map(|&left| -> Result<Vec<KernPair>> {
            cancel.check(Stage::Font)?;
            Ok(codes
                .iter()
                .filter_map(|&right| {
                    let value = face.kerning(left, right)?;
                    (value.abs() >= 1.0 / 32.0).then_some(KernPair { left, right, value })
                })
                .collect())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(rows.into_iter().flatten().collect())
}

/// Rasterize and encode a custom font described by `section`.
pub fn build_custom_font(
    section: &FontSection,
    face: &dyn GlyphRasterSource,
    codepoints: &[u32],
    cancel: &CancelToken,
) -> Result<FontBuild> {
    let asset = section.asset_stem();
    let metrics = face.metrics();

    let mut descriptor = FontDescriptor::new(section.bpp()?, metrics.ascent, metrics.descent);
    descriptor.compressed = section.compressed;
    descriptor.prefilter = section.prefilter;
    descriptor.underline_position = metrics.underline_position;
    descriptor.underline_thickness = metrics.underline_thickness;
    descriptor.validate(&asset)?;

    let (glyphs, missing) = rasterize_glyphs(face, codepoints, cancel)?;
    if glyphs.is_empty() {
        return Err(BundleError::missing(
            Stage::Font,
            &asset,
            format!("face has none of the {} requested characters", codepoints.len()),
        ));
    }
    if !missing.is_empty() {
        warn!(
            "{}: {} of {} characters not in the face",
            asset,
            missing.len(),
            codepoints.len()
        );
    }

    let kerning = if section.kerning {
        collect_kerning(face, &glyphs, cancel)?
    } else {
        Vec::new()
    };
    debug!("{}: {} glyphs, {} kerning pairs", asset, glyphs.len(), kerning.len());

    let options = EncodeOptions {
        pointer_width: section.pointer_width()?,
    };
    let glyph_count = glyphs.len();
    let bytes = build_font(glyphs, &descriptor, &kerning, &options)?;
    Ok(FontBuild {
        bytes,
        glyph_count,
        missing,
        kerning_pairs: kerning.len(),
    })
}
