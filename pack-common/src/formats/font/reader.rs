//! CBIN reader used by `inspect` and the tests.
//!
//! Resolves codepoints the same way the runtime does: walk the cmap records,
//! then index the glyph descriptor table.

use super::bitstream::unpack_samples;
use super::cmap::{CmapEntries, CmapFormat, CmapSubtable};
use super::compress::decompress;
use super::encoder::{GlyphDescriptorRecord, dsc_size, head_size, kern_record_size};
use super::{BitmapFormat, Bpp, PointerWidth};
use crate::error::{BundleError, Result, Stage};
use crate::formats::serialization::{read_u16, read_u32};

const ASSET: &str = "cbin";

fn malformed(message: impl Into<String>) -> BundleError {
    BundleError::malformed(Stage::Inspect, ASSET, message)
}

fn read_ptr(bytes: &[u8], at: usize, pointer_width: PointerWidth) -> Option<usize> {
    match pointer_width {
        PointerWidth::Four => read_u32(bytes, at).map(|v| v as usize),
        PointerWidth::Eight => bytes
            .get(at..at + 8)
            .and_then(|b| b.try_into().ok())
            .map(|b: [u8; 8]| u64::from_le_bytes(b) as usize),
    }
}

/// Decoded kerning pairs
#[derive(Debug, Clone, PartialEq)]
struct KernPairs {
    pairs: Vec<(u16, u16)>,
    values: Vec<i8>,
}

/// Parsed view over a CBIN blob
#[derive(Debug, Clone)]
pub struct CbinFont<'a> {
    bytes: &'a [u8],
    pub pointer_width: PointerWidth,
    pub line_height: u32,
    pub base_line: i32,
    pub underline_position: i8,
    pub underline_thickness: i8,
    pub bitmap_offset: usize,
    pub glyph_dsc_offset: usize,
    pub cmaps_offset: usize,
    pub kern_offset: usize,
    pub kern_scale: u16,
    pub bpp: Bpp,
    pub bitmap_format: BitmapFormat,
    descriptors: Vec<GlyphDescriptorRecord>,
    cmaps: Vec<CmapSubtable>,
    kerning: Option<KernPairs>,
}

impl<'a> CbinFont<'a> {
    pub fn parse(bytes: &'a [u8], pointer_width: PointerWidth) -> Result<Self> {
        let ptr = pointer_width.bytes();
        let dsc = head_size(ptr);
        if bytes.len() < dsc + dsc_size(ptr) {
            return Err(malformed(format!("{} bytes is shorter than the header", bytes.len())));
        }

        let line_height = read_u32(bytes, 3 * ptr).ok_or_else(|| malformed("head"))?;
        let base_line = read_u32(bytes, 3 * ptr + 4).ok_or_else(|| malformed("head"))? as i32;
        let underline_position = bytes[3 * ptr + 9] as i8;
        let underline_thickness = bytes[3 * ptr + 10] as i8;
        let dsc_ptr = read_ptr(bytes, dsc - 3 * ptr, pointer_width);
        if dsc_ptr != Some(dsc) {
            return Err(malformed(format!(
                "descriptor pointer {:?} does not match {}-byte pointers",
                dsc_ptr, ptr
            )));
        }

        let field = |i: usize| read_ptr(bytes, dsc + i * ptr, pointer_width).unwrap_or(usize::MAX);
        let bitmap_offset = field(0);
        let glyph_dsc_offset = field(1);
        let cmaps_offset = field(2);
        let kern_offset = field(3);
        let kern_scale = read_u16(bytes, dsc + 4 * ptr).unwrap_or(0);
        let flags = read_u16(bytes, dsc + 4 * ptr + 2).unwrap_or(0);

        let cmap_count = (flags & 0x1FF) as usize;
        let bpp = Bpp::from_bits(((flags >> 9) & 0xF) as u8)
            .ok_or_else(|| malformed(format!("invalid bpp in flags {:#06x}", flags)))?;
        let kern_classes = (flags >> 13) & 1;
        let bitmap_format = BitmapFormat::from_u8((flags >> 14) as u8)
            .ok_or_else(|| malformed(format!("invalid bitmap format in flags {:#06x}", flags)))?;
        if kern_classes != 0 {
            return Err(BundleError::unsupported(
                Stage::Inspect,
                "class-based kerning tables",
            ));
        }

        if !(bitmap_offset <= glyph_dsc_offset
            && glyph_dsc_offset <= cmaps_offset
            && cmaps_offset <= bytes.len())
        {
            return Err(malformed("section offsets out of order"));
        }
        let descriptor_bytes = cmaps_offset - glyph_dsc_offset;
        if descriptor_bytes == 0 || descriptor_bytes % GlyphDescriptorRecord::SIZE != 0 {
            return Err(malformed(format!(
                "glyph descriptor section of {} bytes",
                descriptor_bytes
            )));
        }
        let descriptors: Vec<GlyphDescriptorRecord> = bytes[glyph_dsc_offset..cmaps_offset]
            .chunks_exact(GlyphDescriptorRecord::SIZE)
            .filter_map(GlyphDescriptorRecord::from_bytes)
            .collect();
        let bitmap_len = glyph_dsc_offset - bitmap_offset;
        if let Some(bad) = descriptors
            .iter()
            .skip(1)
            .find(|d| d.bitmap_offset as usize > bitmap_len)
        {
            return Err(malformed(format!(
                "bitmap offset {} beyond the {}-byte bitmap section",
                bad.bitmap_offset, bitmap_len
            )));
        }

        let cmaps = (0..cmap_count)
            .map(|i| {
                parse_cmap(
                    bytes,
                    cmaps_offset + i * (12 + 2 * ptr),
                    pointer_width,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let kerning = if kern_offset == 0 {
            None
        } else {
            Some(parse_kerning(bytes, kern_offset, pointer_width)?)
        };

        Ok(Self {
            bytes,
            pointer_width,
            line_height,
            base_line,
            underline_position,
            underline_thickness,
            bitmap_offset,
            glyph_dsc_offset,
            cmaps_offset,
            kern_offset,
            kern_scale,
            bpp,
            bitmap_format,
            descriptors,
            cmaps,
            kerning,
        })
    }

    /// Number of glyphs, excluding the reserved id 0
    pub fn glyph_count(&self) -> usize {
        self.descriptors.len() - 1
    }

    /// Descriptor records including the reserved entry 0
    pub fn descriptors(&self) -> &[GlyphDescriptorRecord] {
        &self.descriptors
    }

    pub fn cmaps(&self) -> &[CmapSubtable] {
        &self.cmaps
    }

    pub fn bitmap_section_len(&self) -> usize {
        self.glyph_dsc_offset - self.bitmap_offset
    }

    pub fn glyph_id(&self, codepoint: u32) -> Option<u16> {
        self.cmaps.iter().find_map(|c| c.lookup(codepoint))
    }

    pub fn descriptor(&self, glyph_id: u16) -> Option<&GlyphDescriptorRecord> {
        if glyph_id == 0 {
            return None;
        }
        self.descriptors.get(glyph_id as usize)
    }

    /// Quantized samples of a glyph, `box_w * box_h` values
    pub fn glyph_pixels(&self, glyph_id: u16) -> Result<Vec<u8>> {
        let desc = self
            .descriptor(glyph_id)
            .ok_or_else(|| malformed(format!("no glyph with id {}", glyph_id)))?;
        let (w, h) = (desc.box_w as usize, desc.box_h as usize);
        let data = self
            .bytes
            .get(self.bitmap_offset + desc.bitmap_offset as usize..self.glyph_dsc_offset)
            .ok_or_else(|| malformed(format!("bitmap of glyph {} out of bounds", glyph_id)))?;

        let samples = match self.bitmap_format {
            BitmapFormat::Raw => unpack_samples(data, self.bpp.bits(), w * h),
            BitmapFormat::CompressedPrefiltered => decompress(data, w, h, self.bpp, true),
            BitmapFormat::Compressed => decompress(data, w, h, self.bpp, false),
        };
        samples.ok_or_else(|| malformed(format!("bitmap of glyph {} is truncated", glyph_id)))
    }

    /// Kerning between two glyphs in pixels, 0 when the pair is absent
    pub fn kerning(&self, left: u16, right: u16) -> f32 {
        let Some(kern) = &self.kerning else {
            return 0.0;
        };
        match kern.pairs.binary_search(&(left, right)) {
            Ok(i) => kern.values[i] as f32 * self.kern_scale as f32 / 16.0 / 16.0,
            Err(_) => 0.0,
        }
    }

    pub fn kerning_pair_count(&self) -> usize {
        self.kerning.as_ref().map_or(0, |k| k.pairs.len())
    }
}

fn parse_cmap(bytes: &[u8], at: usize, pointer_width: PointerWidth) -> Result<CmapSubtable> {
    let ptr = pointer_width.bytes();
    let truncated = || malformed(format!("cmap record at {} is truncated", at));

    let min_code = read_u32(bytes, at).ok_or_else(truncated)?;
    let range_length = read_u16(bytes, at + 4).ok_or_else(truncated)?;
    let start_glyph_id = read_u16(bytes, at + 6).ok_or_else(truncated)?;
    let unicode_ptr = read_ptr(bytes, at + 8, pointer_width).ok_or_else(truncated)?;
    let glyph_id_ptr = read_ptr(bytes, at + 8 + ptr, pointer_width).ok_or_else(truncated)?;
    let entry_count = read_u16(bytes, at + 8 + 2 * ptr).ok_or_else(truncated)? as usize;
    let tag = *bytes.get(at + 10 + 2 * ptr).ok_or_else(truncated)?;
    let format =
        CmapFormat::from_tag(tag).ok_or_else(|| malformed(format!("unknown cmap format {}", tag)))?;

    let u16_list = |start: usize| -> Result<Vec<u16>> {
        (0..entry_count)
            .map(|i| read_u16(bytes, start + 2 * i).ok_or_else(truncated))
            .collect()
    };

    let entries = match format {
        CmapFormat::Format0Tiny => CmapEntries::Format0Tiny,
        CmapFormat::Format0Full => CmapEntries::Format0 {
            id_offsets: bytes
                .get(glyph_id_ptr..glyph_id_ptr + entry_count)
                .ok_or_else(truncated)?
                .to_vec(),
        },
        CmapFormat::SparseTiny => CmapEntries::SparseTiny {
            code_deltas: u16_list(unicode_ptr)?,
        },
        CmapFormat::SparseFull => CmapEntries::Sparse {
            code_deltas: u16_list(unicode_ptr)?,
            id_deltas: u16_list(glyph_id_ptr)?,
        },
    };

    let subtable = CmapSubtable {
        min_code,
        range_length,
        start_glyph_id,
        entries,
    };
    check_cmap(&subtable)
        .map_err(|reason| malformed(format!("cmap record at {}: {}", at, reason)))?;
    Ok(subtable)
}

/// Structural checks so that lookups on a parsed subtable stay in bounds
fn check_cmap(cmap: &CmapSubtable) -> std::result::Result<(), String> {
    if cmap.range_length == 0 {
        return Err("empty range".into());
    }
    if cmap.min_code.checked_add(cmap.range_length as u32 - 1).is_none() {
        return Err(format!("range from {:#x} overflows", cmap.min_code));
    }
    let max_id = match &cmap.entries {
        CmapEntries::Format0Tiny => cmap.range_length - 1,
        CmapEntries::Format0 { id_offsets } => {
            if id_offsets.len() != cmap.range_length as usize {
                return Err(format!(
                    "{} glyph offsets for a range of {}",
                    id_offsets.len(),
                    cmap.range_length
                ));
            }
            id_offsets.iter().copied().max().unwrap_or(0) as u16
        }
        CmapEntries::SparseTiny { code_deltas } | CmapEntries::Sparse { code_deltas, .. } => {
            if let Some(&bad) = code_deltas.iter().find(|&&d| d >= cmap.range_length) {
                return Err(format!("code delta {} outside range {}", bad, cmap.range_length));
            }
            if !code_deltas.windows(2).all(|w| w[0] < w[1]) {
                return Err("code deltas not ascending".into());
            }
            match &cmap.entries {
                CmapEntries::Sparse { id_deltas, .. } => id_deltas.iter().copied().max().unwrap_or(0),
                _ => code_deltas.len().saturating_sub(1) as u16,
            }
        }
    };
    if cmap.start_glyph_id.checked_add(max_id).is_none() {
        return Err(format!("glyph ids from {} overflow", cmap.start_glyph_id));
    }
    Ok(())
}

fn parse_kerning(bytes: &[u8], at: usize, pointer_width: PointerWidth) -> Result<KernPairs> {
    let ptr = pointer_width.bytes();
    let truncated = || malformed(format!("kerning table at {} is truncated", at));
    if bytes.len() < at + kern_record_size(ptr) {
        return Err(truncated());
    }

    let ids_at = read_ptr(bytes, at, pointer_width).ok_or_else(truncated)?;
    let values_at = read_ptr(bytes, at + ptr, pointer_width).ok_or_else(truncated)?;
    let packed = read_u32(bytes, at + 2 * ptr).ok_or_else(truncated)?;
    let count = (packed & 0x3FFF_FFFF) as usize;
    let wide = (packed >> 30) & 1 == 1;

    let pairs = (0..count)
        .map(|i| {
            if wide {
                Some((read_u16(bytes, ids_at + 4 * i)?, read_u16(bytes, ids_at + 4 * i + 2)?))
            } else {
                let pair = bytes.get(ids_at + 2 * i..ids_at + 2 * i + 2)?;
                Some((pair[0] as u16, pair[1] as u16))
            }
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(truncated)?;
    let values = bytes
        .get(values_at..values_at + count)
        .ok_or_else(truncated)?
        .iter()
        .map(|&v| v as i8)
        .collect();

    Ok(KernPairs { pairs, values })
}
