//! CBIN font container encoder
//!
//! # Layout
//! All multi-byte fields are little-endian. `ptr` is the configured pointer
//! width (4 or 8); every offset is relative to the start of the blob.
//! ```text
//! head:  3 zero ptrs, line_height u32, base_line i32,
//!        subpx u8, underline_position i8, underline_thickness i8,
//!        (pad to ptr), dsc ptr, 0 ptr, 0 ptr
//! dsc:   bitmap ptr, glyph_dsc ptr, cmaps ptr, kern ptr, kern_scale u16,
//!        flags u16 = cmap_count | bpp << 9 | kern_classes << 13 | bitmap_format << 14
//!        (pad to ptr)
//! kern:  glyph_ids ptr, values ptr, pair_count | ids_are_u16 << 30   (optional)
//!        left/right id pairs (u8 or u16), i8 values
//! bitmaps: per glyph bit stream, byte aligned
//! glyph_dsc: 16 bytes per glyph id 0..=N, id 0 all zero
//! cmaps: 12 + 2 * ptr bytes per subtable, then each subtable's payload
//! ```
//! Sections start on 4-byte boundaries.

use rayon::prelude::*;

use super::bitstream::pack_samples;
use super::cmap::{CmapSubtable, plan_cmaps, validate_plan};
use super::compress::compress;
use super::{EncodeOptions, FontDescriptor, Glyph, KernPair, quantize};
use crate::error::{BundleError, Result, Stage};
use crate::formats::serialization::{align_up, read_u16, read_u32};

/// The cmap count field is 9 bits wide
pub const MAX_CMAP_SUBTABLES: usize = (1 << 9) - 1;

/// Glyph id 0 is reserved, so ids 1..=65535 are usable
pub const MAX_GLYPHS: usize = u16::MAX as usize;

const ASSET: &str = "cbin";

/// Glyphs sorted by codepoint; glyph id = index + 1
#[derive(Debug, Clone, Default)]
pub struct GlyphSet {
    glyphs: Vec<Glyph>,
}

impl GlyphSet {
    /// Sort glyphs and check them for duplicates and bitmap size mismatches.
    pub fn new(mut glyphs: Vec<Glyph>) -> Result<Self> {
        glyphs.sort_by_key(|g| g.codepoint);

        if glyphs.len() > MAX_GLYPHS {
            return Err(BundleError::config(
                Stage::Font,
                ASSET,
                format!("{} glyphs exceed the limit of {}", glyphs.len(), MAX_GLYPHS),
            ));
        }
        if let Some(w) = glyphs.windows(2).find(|w| w[0].codepoint == w[1].codepoint) {
            return Err(BundleError::config(
                Stage::Font,
                ASSET,
                format!("duplicate glyph for U+{:04X}", w[0].codepoint),
            ));
        }
        for glyph in &glyphs {
            let expected = glyph.bbox.w as usize * glyph.bbox.h as usize;
            if glyph.pixels.len() != expected {
                return Err(BundleError::config(
                    Stage::Font,
                    ASSET,
                    format!(
                        "glyph U+{:04X} has {} samples for a {}x{} box",
                        glyph.codepoint,
                        glyph.pixels.len(),
                        glyph.bbox.w,
                        glyph.bbox.h
                    ),
                ));
            }
        }
        Ok(Self { glyphs })
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyph_id(&self, codepoint: u32) -> Option<u16> {
        self.glyphs
            .binary_search_by_key(&codepoint, |g| g.codepoint)
            .ok()
            .map(|i| i as u16 + 1)
    }

    /// `(codepoint, glyph id)` pairs in codepoint order
    pub fn cmap_pairs(&self) -> Vec<(u32, u16)> {
        self.glyphs
            .iter()
            .enumerate()
            .map(|(i, g)| (g.codepoint, i as u16 + 1))
            .collect()
    }
}

/// Glyph descriptor record (16 bytes)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlyphDescriptorRecord {
    /// Offset of the glyph's bitmap inside the bitmap section
    pub bitmap_offset: u32,
    /// Advance width in 1/16 pixels
    pub adv_w: u32,
    pub box_w: u16,
    pub box_h: u16,
    pub ofs_x: i16,
    pub ofs_y: i16,
}

impl GlyphDescriptorRecord {
    pub const SIZE: usize = 16;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.bitmap_offset.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.adv_w.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.box_w.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.box_h.to_le_bytes());
        bytes[12..14].copy_from_slice(&self.ofs_x.to_le_bytes());
        bytes[14..16].copy_from_slice(&self.ofs_y.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            bitmap_offset: read_u32(bytes, 0)?,
            adv_w: read_u32(bytes, 4)?,
            box_w: read_u16(bytes, 8)?,
            box_h: read_u16(bytes, 10)?,
            ofs_x: read_u16(bytes, 12)? as i16,
            ofs_y: read_u16(bytes, 14)? as i16,
        })
    }
}

/// Size of the head block for a pointer width
pub(crate) fn head_size(ptr: usize) -> usize {
    align_up(3 * ptr + 4 + 4 + 3, ptr) + 3 * ptr
}

/// Size of the dsc block for a pointer width
pub(crate) fn dsc_size(ptr: usize) -> usize {
    align_up(4 * ptr + 4, ptr)
}

pub(crate) fn kern_record_size(ptr: usize) -> usize {
    2 * ptr + 4
}

fn push_ptr(out: &mut Vec<u8>, value: usize, ptr: usize) {
    if ptr == 8 {
        out.extend_from_slice(&(value as u64).to_le_bytes());
    } else {
        out.extend_from_slice(&(value as u32).to_le_bytes());
    }
}

fn pad_to(out: &mut Vec<u8>, align: usize) {
    out.resize(align_up(out.len(), align), 0);
}

/// Quantize and pack (or compress) one glyph's coverage
fn encode_bitmap(glyph: &Glyph, descriptor: &FontDescriptor) -> Vec<u8> {
    let samples = quantize(&glyph.pixels, descriptor.bpp);
    if descriptor.compressed {
        compress(
            &samples,
            glyph.bbox.w as usize,
            descriptor.bpp,
            descriptor.prefilter,
        )
    } else {
        pack_samples(&samples, descriptor.bpp.bits())
    }
}

/// Pair kerning resolved to glyph ids
#[derive(Debug, Clone, PartialEq)]
struct KernTable {
    pairs: Vec<(u16, u16)>,
    values: Vec<i8>,
    scale: u16,
}

impl KernTable {
    /// Resolve codepoint pairs to glyph ids and scale values into i8.
    ///
    /// Pairs naming unknown glyphs or rounding to zero are dropped; the first
    /// value wins for duplicate pairs.
    fn build(glyphs: &GlyphSet, kerning: &[KernPair]) -> Option<Self> {
        let mut resolved: Vec<(u16, u16, i32)> = kerning
            .iter()
            .filter_map(|k| {
                let fp4 = (k.value * 16.0).round() as i32;
                let left = glyphs.glyph_id(k.left)?;
                let right = glyphs.glyph_id(k.right)?;
                (fp4 != 0).then_some((left, right, fp4))
            })
            .collect();
        resolved.sort_by_key(|&(l, r, _)| (l, r));
        resolved.dedup_by_key(|&mut (l, r, _)| (l, r));

        let max_abs = resolved.iter().map(|&(_, _, v)| v.unsigned_abs()).max()?;
        let scale = (max_abs * 16).div_ceil(127).max(16);
        let values = resolved
            .iter()
            .map(|&(_, _, fp4)| {
                let stored = (fp4 as f64 * 16.0 / scale as f64).round();
                stored.clamp(i8::MIN as f64, i8::MAX as f64) as i8
            })
            .collect();

        Some(Self {
            pairs: resolved.iter().map(|&(l, r, _)| (l, r)).collect(),
            values,
            scale: scale.min(u16::MAX as u32) as u16,
        })
    }

    fn wide_ids(&self) -> bool {
        self.pairs.iter().any(|&(l, r)| l > 0xFF || r > 0xFF)
    }

    /// Append the kerning section and return its offset
    fn write(&self, out: &mut Vec<u8>, ptr: usize) -> usize {
        let record_at = out.len();
        out.resize(record_at + kern_record_size(ptr), 0);
        pad_to(out, 4);

        let wide = self.wide_ids();
        let ids_at = out.len();
        for &(l, r) in &self.pairs {
            if wide {
                out.extend_from_slice(&l.to_le_bytes());
                out.extend_from_slice(&r.to_le_bytes());
            } else {
                out.push(l as u8);
                out.push(r as u8);
            }
        }
        pad_to(out, 4);

        let values_at = out.len();
        out.extend(self.values.iter().map(|&v| v as u8));
        pad_to(out, 4);

        let mut record = Vec::with_capacity(kern_record_size(ptr));
        push_ptr(&mut record, ids_at, ptr);
        push_ptr(&mut record, values_at, ptr);
        let packed = self.pairs.len() as u32 | (wide as u32) << 30;
        record.extend_from_slice(&packed.to_le_bytes());
        out[record_at..record_at + record.len()].copy_from_slice(&record);
        record_at
    }
}

/// Append cmap records followed by their payloads
fn write_cmaps(out: &mut Vec<u8>, cmaps: &[CmapSubtable], ptr: usize) {
    let rec = 12 + 2 * ptr;
    let records_at = out.len();
    out.resize(records_at + cmaps.len() * rec, 0);

    for (i, table) in cmaps.iter().enumerate() {
        pad_to(out, 4);
        let mut payload_ptr = |payload: Option<Vec<u8>>| match payload {
            Some(bytes) => {
                pad_to(out, 4);
                let at = out.len();
                out.extend_from_slice(&bytes);
                at
            }
            None => 0,
        };
        let unicode_ptr = payload_ptr(table.entries.unicode_list());
        let glyph_id_ptr = payload_ptr(table.entries.glyph_id_list());

        let mut record = Vec::with_capacity(rec);
        record.extend_from_slice(&table.min_code.to_le_bytes());
        record.extend_from_slice(&table.range_length.to_le_bytes());
        record.extend_from_slice(&table.start_glyph_id.to_le_bytes());
        push_ptr(&mut record, unicode_ptr, ptr);
        push_ptr(&mut record, glyph_id_ptr, ptr);
        record.extend_from_slice(&table.entry_count().to_le_bytes());
        record.push(table.format().tag());
        record.push(0);

        let at = records_at + i * rec;
        out[at..at + rec].copy_from_slice(&record);
    }
    pad_to(out, 4);
}

/// Encode glyphs, a cmap plan and optional kerning into a CBIN blob.
pub fn encode_font(
    glyphs: &GlyphSet,
    descriptor: &FontDescriptor,
    cmaps: &[CmapSubtable],
    kerning: &[KernPair],
    options: &EncodeOptions,
) -> Result<Vec<u8>> {
    descriptor.validate(ASSET)?;
    if cmaps.len() > MAX_CMAP_SUBTABLES {
        return Err(BundleError::config(
            Stage::Font,
            ASSET,
            format!(
                "{} cmap subtables exceed the limit of {}",
                cmaps.len(),
                MAX_CMAP_SUBTABLES
            ),
        ));
    }
    validate_plan(cmaps, &glyphs.cmap_pairs())?;

    let ptr = options.pointer_width.bytes();
    let bitmaps: Vec<Vec<u8>> = glyphs
        .glyphs()
        .par_iter()
        .map(|glyph| encode_bitmap(glyph, descriptor))
        .collect();
    let kern = KernTable::build(glyphs, kerning);

    let mut out = Vec::new();

    // Head
    for _ in 0..3 {
        push_ptr(&mut out, 0, ptr);
    }
    out.extend_from_slice(&descriptor.line_height().to_le_bytes());
    out.extend_from_slice(&descriptor.base_line().to_le_bytes());
    out.push(0);
    out.push(descriptor.underline_position as u8);
    out.push(descriptor.underline_thickness as u8);
    pad_to(&mut out, ptr);
    let dsc_at = head_size(ptr);
    push_ptr(&mut out, dsc_at, ptr);
    push_ptr(&mut out, 0, ptr);
    push_ptr(&mut out, 0, ptr);
    debug_assert_eq!(out.len(), dsc_at);

    out.resize(dsc_at + dsc_size(ptr), 0);
    pad_to(&mut out, 4);

    let kern_ofs = kern.as_ref().map_or(0, |k| k.write(&mut out, ptr));

    let bitmap_ofs = out.len();
    let mut records = Vec::with_capacity(glyphs.len() + 1);
    records.push(GlyphDescriptorRecord::default());
    for (glyph, bitmap) in glyphs.glyphs().iter().zip(&bitmaps) {
        records.push(GlyphDescriptorRecord {
            bitmap_offset: (out.len() - bitmap_ofs) as u32,
            adv_w: glyph.advance_q4(),
            box_w: glyph.bbox.w,
            box_h: glyph.bbox.h,
            ofs_x: glyph.bbox.x,
            ofs_y: glyph.bbox.y,
        });
        out.extend_from_slice(bitmap);
    }
    pad_to(&mut out, 4);

    let glyph_dsc_ofs = out.len();
    for record in &records {
        out.extend_from_slice(&record.to_bytes());
    }

    let cmaps_ofs = out.len();
    write_cmaps(&mut out, cmaps, ptr);

    let flags = cmaps.len() as u16
        | (descriptor.bpp.bits() as u16) << 9
        | (descriptor.bitmap_format() as u16) << 14;
    let mut dsc = Vec::with_capacity(dsc_size(ptr));
    push_ptr(&mut dsc, bitmap_ofs, ptr);
    push_ptr(&mut dsc, glyph_dsc_ofs, ptr);
    push_ptr(&mut dsc, cmaps_ofs, ptr);
    push_ptr(&mut dsc, kern_ofs, ptr);
    dsc.extend_from_slice(&kern.as_ref().map_or(0, |k| k.scale).to_le_bytes());
    dsc.extend_from_slice(&flags.to_le_bytes());
    out[dsc_at..dsc_at + dsc.len()].copy_from_slice(&dsc);

    if ptr == 4 && out.len() > u32::MAX as usize {
        return Err(BundleError::config(
            Stage::Font,
            ASSET,
            "font does not fit 32-bit offsets",
        ));
    }
    Ok(out)
}

/// Sort glyphs, plan the cmaps and encode in one step.
pub fn build_font(
    glyphs: Vec<Glyph>,
    descriptor: &FontDescriptor,
    kerning: &[KernPair],
    options: &EncodeOptions,
) -> Result<Vec<u8>> {
    descriptor.validate(ASSET)?;
    let set = GlyphSet::new(glyphs)?;
    let cmaps = plan_cmaps(&set.cmap_pairs(), options.pointer_width)?;
    encode_font(&set, descriptor, &cmaps, kerning, options)
}
