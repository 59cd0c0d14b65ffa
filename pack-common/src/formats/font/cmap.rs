//! Character map subtables and the planner that partitions a font's
//! codepoints into them.
//!
//! Four layouts are supported, dispatched through [`CmapEntries`]:
//!
//! | Format        | Payload                                   | Cost        |
//! |---------------|-------------------------------------------|-------------|
//! | `Format0Tiny` | none, id = start + (code - min)           | 0           |
//! | `SparseTiny`  | u16 code deltas, id = start + index       | 2 per code  |
//! | `Format0Full` | u8 id offset per code in the range        | 1 per code  |
//! | `SparseFull`  | u16 code deltas and u16 id deltas         | 4 per code  |
//!
//! The planner splits the input into identity-consecutive segments and
//! merges neighbours greedily while the merged subtable is no larger than
//! the two separate ones plus a record header.

use crate::error::{BundleError, Result, Stage};

use super::PointerWidth;

/// Largest `max_code - min_code` a subtable can describe
const MAX_CODE_SPAN: u32 = u16::MAX as u32 - 1;

/// Format0 stores one byte per code
const FORMAT0_MAX_RANGE: u32 = 256;

/// Subtable layout tag written into the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CmapFormat {
    Format0Full = 0,
    SparseFull = 1,
    Format0Tiny = 2,
    SparseTiny = 3,
}

impl CmapFormat {
    pub fn tag(&self) -> u8 {
        *self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CmapFormat::Format0Full),
            1 => Some(CmapFormat::SparseFull),
            2 => Some(CmapFormat::Format0Tiny),
            3 => Some(CmapFormat::SparseTiny),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CmapFormat::Format0Full => "format0",
            CmapFormat::SparseFull => "sparse",
            CmapFormat::Format0Tiny => "format0-tiny",
            CmapFormat::SparseTiny => "sparse-tiny",
        }
    }

    /// Bytes a run of `count` codes spanning `range` codes costs in this format
    fn cost(&self, count: usize, range: usize) -> usize {
        match self {
            CmapFormat::Format0Tiny => 0,
            CmapFormat::SparseTiny => 2 * count,
            CmapFormat::Format0Full => range,
            CmapFormat::SparseFull => 4 * count,
        }
    }
}

/// Subtable payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmapEntries {
    /// Id offset per code in the range; holes hold 0
    Format0 { id_offsets: Vec<u8> },
    Format0Tiny,
    Sparse {
        code_deltas: Vec<u16>,
        id_deltas: Vec<u16>,
    },
    SparseTiny { code_deltas: Vec<u16> },
}

impl CmapEntries {
    pub fn format(&self) -> CmapFormat {
        match self {
            CmapEntries::Format0 { .. } => CmapFormat::Format0Full,
            CmapEntries::Format0Tiny => CmapFormat::Format0Tiny,
            CmapEntries::Sparse { .. } => CmapFormat::SparseFull,
            CmapEntries::SparseTiny { .. } => CmapFormat::SparseTiny,
        }
    }

    /// Serialized code delta list, if the format has one
    pub fn unicode_list(&self) -> Option<Vec<u8>> {
        match self {
            CmapEntries::Sparse { code_deltas, .. } | CmapEntries::SparseTiny { code_deltas } => {
                Some(code_deltas.iter().flat_map(|d| d.to_le_bytes()).collect())
            }
            _ => None,
        }
    }

    /// Serialized glyph id list, if the format has one
    pub fn glyph_id_list(&self) -> Option<Vec<u8>> {
        match self {
            CmapEntries::Format0 { id_offsets } => Some(id_offsets.clone()),
            CmapEntries::Sparse { id_deltas, .. } => {
                Some(id_deltas.iter().flat_map(|d| d.to_le_bytes()).collect())
            }
            _ => None,
        }
    }
}

/// One contiguous slice of the character map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmapSubtable {
    pub min_code: u32,
    pub range_length: u16,
    pub start_glyph_id: u16,
    pub entries: CmapEntries,
}

impl CmapSubtable {
    /// Build a subtable of the given format from `(codepoint, glyph id)`
    /// pairs sorted by codepoint.
    ///
    /// Fails with [`BundleError::RangeOverflow`] if a delta does not fit its
    /// field and with a config error if the ids do not fit a tiny layout.
    pub fn from_run(format: CmapFormat, run: &[(u32, u16)]) -> Result<Self> {
        let (&(min_code, first_gid), &(max_code, _)) = match (run.first(), run.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => {
                return Err(BundleError::config(
                    Stage::Font,
                    "cmap",
                    "subtable needs at least one codepoint",
                ));
            }
        };

        if run.windows(2).any(|w| w[0].0 >= w[1].0) {
            return Err(BundleError::config(
                Stage::Font,
                "cmap",
                "codepoints must be sorted and distinct",
            ));
        }

        let span = max_code - min_code;
        if span > MAX_CODE_SPAN {
            return Err(BundleError::RangeOverflow {
                min_code,
                code: max_code,
                field: "code",
                delta: span as i64,
            });
        }

        let start_glyph_id = match format {
            CmapFormat::SparseFull => run.iter().map(|&(_, gid)| gid).min().unwrap_or(first_gid),
            _ => first_gid,
        };

        let overflow = |code: u32, field: &'static str, delta: i64| BundleError::RangeOverflow {
            min_code,
            code,
            field,
            delta,
        };
        let not_tiny = |code: u32| {
            BundleError::config(
                Stage::Font,
                "cmap",
                format!(
                    "U+{:04X} breaks the implicit id sequence of a {} subtable",
                    code,
                    format.name()
                ),
            )
        };

        let entries = match format {
            CmapFormat::Format0Tiny => {
                if run.len() as u32 != span + 1 {
                    return Err(not_tiny(max_code));
                }
                for &(code, gid) in run {
                    if gid as u32 != start_glyph_id as u32 + (code - min_code) {
                        return Err(not_tiny(code));
                    }
                }
                CmapEntries::Format0Tiny
            }
            CmapFormat::SparseTiny => {
                let mut code_deltas = Vec::with_capacity(run.len());
                for (i, &(code, gid)) in run.iter().enumerate() {
                    if gid as usize != start_glyph_id as usize + i {
                        return Err(not_tiny(code));
                    }
                    code_deltas.push((code - min_code) as u16);
                }
                CmapEntries::SparseTiny { code_deltas }
            }
            CmapFormat::Format0Full => {
                if span + 1 > FORMAT0_MAX_RANGE {
                    return Err(overflow(max_code, "code", span as i64));
                }
                let mut id_offsets = vec![0u8; span as usize + 1];
                for (i, &(code, gid)) in run.iter().enumerate() {
                    let delta = gid as i64 - start_glyph_id as i64;
                    // Offset 0 marks a hole everywhere but the first code
                    let valid = if i == 0 { delta == 0 } else { (1..=255).contains(&delta) };
                    if !valid {
                        return Err(overflow(code, "id", delta));
                    }
                    id_offsets[(code - min_code) as usize] = delta as u8;
                }
                CmapEntries::Format0 { id_offsets }
            }
            CmapFormat::SparseFull => {
                let mut code_deltas = Vec::with_capacity(run.len());
                let mut id_deltas = Vec::with_capacity(run.len());
                for &(code, gid) in run {
                    code_deltas.push((code - min_code) as u16);
                    id_deltas.push(gid - start_glyph_id);
                }
                CmapEntries::Sparse {
                    code_deltas,
                    id_deltas,
                }
            }
        };

        Ok(Self {
            min_code,
            range_length: (span + 1) as u16,
            start_glyph_id,
            entries,
        })
    }

    pub fn format(&self) -> CmapFormat {
        self.entries.format()
    }

    /// Value written into the record's entry count field
    pub fn entry_count(&self) -> u16 {
        match &self.entries {
            CmapEntries::Format0 { id_offsets } => id_offsets.len() as u16,
            CmapEntries::Format0Tiny => 0,
            CmapEntries::Sparse { code_deltas, .. } | CmapEntries::SparseTiny { code_deltas } => {
                code_deltas.len() as u16
            }
        }
    }

    /// Payload bytes before alignment
    pub fn payload_len(&self) -> usize {
        match &self.entries {
            CmapEntries::Format0 { id_offsets } => id_offsets.len(),
            CmapEntries::Format0Tiny => 0,
            CmapEntries::Sparse { code_deltas, .. } => code_deltas.len() * 4,
            CmapEntries::SparseTiny { code_deltas } => code_deltas.len() * 2,
        }
    }

    /// Last codepoint covered, saturating for ranges the reader would reject
    pub fn max_code(&self) -> u32 {
        self.min_code
            .saturating_add((self.range_length as u32).saturating_sub(1))
    }

    /// Resolve a codepoint the way the runtime does
    pub fn lookup(&self, code: u32) -> Option<u16> {
        if self.range_length == 0 || code < self.min_code || code > self.max_code() {
            return None;
        }
        let rcp = code - self.min_code;
        let id_delta = match &self.entries {
            CmapEntries::Format0Tiny => u16::try_from(rcp).ok()?,
            CmapEntries::Format0 { id_offsets } => {
                let ofs = *id_offsets.get(rcp as usize)?;
                if ofs == 0 && rcp != 0 {
                    return None;
                }
                ofs as u16
            }
            CmapEntries::SparseTiny { code_deltas } => {
                let i = code_deltas.binary_search(&u16::try_from(rcp).ok()?).ok()?;
                u16::try_from(i).ok()?
            }
            CmapEntries::Sparse {
                code_deltas,
                id_deltas,
            } => {
                let i = code_deltas.binary_search(&u16::try_from(rcp).ok()?).ok()?;
                *id_deltas.get(i)?
            }
        };
        self.start_glyph_id.checked_add(id_delta)
    }

    /// Every `(codepoint, glyph id)` pair this subtable maps, in code order
    pub fn codepoints(&self) -> Vec<(u32, u16)> {
        match &self.entries {
            CmapEntries::Format0Tiny => (0..self.range_length as u32)
                .map(|i| (self.min_code + i, self.start_glyph_id + i as u16))
                .collect(),
            CmapEntries::Format0 { id_offsets } => id_offsets
                .iter()
                .enumerate()
                .filter(|&(i, &ofs)| i == 0 || ofs != 0)
                .map(|(i, &ofs)| (self.min_code + i as u32, self.start_glyph_id + ofs as u16))
                .collect(),
            CmapEntries::SparseTiny { code_deltas } => code_deltas
                .iter()
                .enumerate()
                .map(|(i, &d)| (self.min_code + d as u32, self.start_glyph_id + i as u16))
                .collect(),
            CmapEntries::Sparse {
                code_deltas,
                id_deltas,
            } => code_deltas
                .iter()
                .zip(id_deltas)
                .map(|(&d, &id)| (self.min_code + d as u32, self.start_glyph_id + id))
                .collect(),
        }
    }
}

/// Summary of a candidate run used to price the formats in O(1)
#[derive(Debug, Clone, Copy)]
struct RunStats {
    start: usize,
    end: usize,
    first_code: u32,
    last_code: u32,
    first_gid: u16,
    min_gid: u16,
    max_gid: u16,
    /// gid == first_gid + (code - first_code) for every entry
    identity: bool,
    /// gid == first_gid + index for every entry
    sequential: bool,
    /// every later gid lies in first_gid+1 ..= first_gid+255
    byte_offsets: bool,
}

impl RunStats {
    fn segment(pairs: &[(u32, u16)], start: usize, end: usize) -> Self {
        let (first_code, first_gid) = pairs[start];
        let (last_code, last_gid) = pairs[end - 1];
        let byte_offsets = last_gid as u32 - first_gid as u32 <= 255;
        Self {
            start,
            end,
            first_code,
            last_code,
            first_gid,
            min_gid: first_gid,
            max_gid: last_gid,
            identity: true,
            sequential: true,
            byte_offsets,
        }
    }

    fn count(&self) -> usize {
        self.end - self.start
    }

    fn span(&self) -> u32 {
        self.last_code - self.first_code
    }

    fn merge(&self, next: &RunStats) -> RunStats {
        let code_gap = next.first_code as i64 - self.first_code as i64;
        let gid_gap = next.first_gid as i64 - self.first_gid as i64;
        let base = self.first_gid as u32;
        RunStats {
            start: self.start,
            end: next.end,
            first_code: self.first_code,
            last_code: next.last_code,
            first_gid: self.first_gid,
            min_gid: self.min_gid.min(next.min_gid),
            max_gid: self.max_gid.max(next.max_gid),
            identity: self.identity && next.identity && gid_gap == code_gap,
            sequential: self.sequential
                && next.sequential
                && gid_gap == self.count() as i64,
            byte_offsets: self.byte_offsets
                && next.min_gid as u32 > base
                && next.max_gid as u32 <= base + 255,
        }
    }

    fn feasible(&self) -> bool {
        self.span() <= MAX_CODE_SPAN
    }

    fn eligible(&self, format: CmapFormat) -> bool {
        let range = self.span() + 1;
        match format {
            CmapFormat::Format0Tiny => self.identity && self.count() as u32 == range,
            CmapFormat::SparseTiny => self.sequential,
            CmapFormat::Format0Full => self.byte_offsets && range <= FORMAT0_MAX_RANGE,
            CmapFormat::SparseFull => true,
        }
    }

    /// Cheapest eligible format; earlier candidates win ties
    fn best(&self) -> (CmapFormat, usize) {
        const CANDIDATES: [CmapFormat; 4] = [
            CmapFormat::Format0Tiny,
            CmapFormat::SparseTiny,
            CmapFormat::Format0Full,
            CmapFormat::SparseFull,
        ];
        let range = self.span() as usize + 1;
        CANDIDATES
            .into_iter()
            .filter(|&format| self.eligible(format))
            .map(|format| (format, format.cost(self.count(), range)))
            .min_by_key(|&(_, cost)| cost)
            .unwrap_or((CmapFormat::SparseFull, 4 * self.count()))
    }
}

/// Bytes of one subtable record for the given pointer width
pub fn record_size(pointer_width: PointerWidth) -> usize {
    12 + 2 * pointer_width.bytes()
}

/// Partition `(codepoint, glyph id)` pairs (sorted by codepoint, distinct)
/// into cmap subtables.
pub fn plan_cmaps(pairs: &[(u32, u16)], pointer_width: PointerWidth) -> Result<Vec<CmapSubtable>> {
    if pairs.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(BundleError::config(
            Stage::Font,
            "cmap",
            "codepoints must be sorted and distinct",
        ));
    }
    if pairs.is_empty() {
        return Ok(Vec::new());
    }

    // Maximal runs where both code and glyph id advance by one
    let mut segments = Vec::new();
    let mut start = 0;
    for i in 1..=pairs.len() {
        let breaks = i == pairs.len() || {
            let (prev_code, prev_gid) = pairs[i - 1];
            let (code, gid) = pairs[i];
            code != prev_code + 1 || gid as u32 != prev_gid as u32 + 1
        };
        if breaks {
            segments.push(RunStats::segment(pairs, start, i));
            start = i;
        }
    }

    let overhead = record_size(pointer_width);
    let mut runs = Vec::new();
    let mut segments = segments.into_iter();
    let Some(mut current) = segments.next() else {
        return Ok(Vec::new());
    };
    for segment in segments {
        let merged = current.merge(&segment);
        if merged.feasible() && merged.best().1 <= current.best().1 + overhead + segment.best().1 {
            current = merged;
        } else {
            runs.push(current);
            current = segment;
        }
    }
    runs.push(current);

    runs.iter()
        .map(|run| CmapSubtable::from_run(run.best().0, &pairs[run.start..run.end]))
        .collect()
}

/// Check that `plan` maps exactly `pairs`, in order, without overlap
pub fn validate_plan(plan: &[CmapSubtable], pairs: &[(u32, u16)]) -> Result<()> {
    let invalid = |message: String| BundleError::config(Stage::Font, "cmap", message);

    for w in plan.windows(2) {
        if w[0].max_code() >= w[1].min_code {
            return Err(invalid(format!(
                "subtables at U+{:04X} and U+{:04X} overlap or are out of order",
                w[0].min_code, w[1].min_code
            )));
        }
    }

    let mapped: Vec<(u32, u16)> = plan.iter().flat_map(|s| s.codepoints()).collect();
    if mapped.len() != pairs.len() {
        return Err(invalid(format!(
            "plan maps {} codepoints, expected {}",
            mapped.len(),
            pairs.len()
        )));
    }
    if let Some((got, want)) = mapped.iter().zip(pairs).find(|(a, b)| a != b) {
        return Err(invalid(format!(
            "plan maps U+{:04X} to glyph {}, expected U+{:04X} to glyph {}",
            got.0, got.1, want.0, want.1
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn with_ids(codes: &[u32]) -> Vec<(u32, u16)> {
        codes
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u16 + 1))
            .collect()
    }

    #[test]
    fn test_latin_letters_two_tiny_subtables() {
        let codes: Vec<u32> = (0x41..=0x5A).chain(0x61..=0x7A).collect();
        let pairs = with_ids(&codes);
        let plan = plan_cmaps(&pairs, PointerWidth::Four).unwrap();

        assert_eq!(plan.len(), 2);
        assert!(plan.iter().all(|s| s.format() == CmapFormat::Format0Tiny));
        assert_eq!(plan[0].min_code, 0x41);
        assert_eq!(plan[0].range_length, 26);
        assert_eq!(plan[0].start_glyph_id, 1);
        assert_eq!(plan[1].min_code, 0x61);
        assert_eq!(plan[1].start_glyph_id, 27);
        validate_plan(&plan, &pairs).unwrap();
    }

    #[test]
    fn test_dense_identity_is_tiny() {
        let pairs = with_ids(&(0x20..0x7F).collect::<Vec<_>>());
        let plan = plan_cmaps(&pairs, PointerWidth::Four).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].format(), CmapFormat::Format0Tiny);
        assert_eq!(plan[0].payload_len(), 0);
    }

    #[test]
    fn test_sparse_run_prefers_sparse_tiny() {
        // Widely spaced codes with sequential ids: no holes table, no id list
        let codes: Vec<u32> = (0..40).map(|i| 0x4E00 + i * 300).collect();
        let pairs = with_ids(&codes);
        let plan = plan_cmaps(&pairs, PointerWidth::Four).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].format(), CmapFormat::SparseTiny);
        assert_eq!(plan[0].payload_len(), 80);
        validate_plan(&plan, &pairs).unwrap();
    }

    #[test]
    fn test_small_holes_choose_format0() {
        // Every other code in a 64 wide range
        let codes: Vec<u32> = (0x100..0x140).step_by(2).collect();
        let mut pairs = with_ids(&codes);
        // Break the sequential ids so only the full formats apply
        for (i, p) in pairs.iter_mut().enumerate() {
            p.1 = 1 + (i as u16) * 2;
        }
        let plan = plan_cmaps(&pairs, PointerWidth::Four).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].format(), CmapFormat::Format0Full);
        validate_plan(&plan, &pairs).unwrap();
        assert_eq!(plan[0].lookup(0x101), None);
        assert_eq!(plan[0].lookup(0x102), Some(3));
    }

    #[test]
    fn test_large_span_is_split() {
        let pairs = with_ids(&[0x20, 0x21, 0x1_0000 + 0x20, 0x1_0000 + 0x21, 0x2_0000]);
        let plan = plan_cmaps(&pairs, PointerWidth::Four).unwrap();
        assert!(plan.len() >= 2);
        for s in &plan {
            assert!(s.max_code() - s.min_code <= MAX_CODE_SPAN);
        }
        validate_plan(&plan, &pairs).unwrap();
    }

    #[test]
    fn test_randomized_partition() {
        let mut rng = Pcg64::seed_from_u64(0x5eed);
        for round in 0..200 {
            let mut code = rng.random_range(0..0x3000u32);
            let mut codes = Vec::new();
            for _ in 0..rng.random_range(1..400) {
                codes.push(code);
                code += if rng.random_bool(0.7) {
                    1
                } else {
                    rng.random_range(2..if round % 5 == 0 { 40_000 } else { 300 })
                };
            }
            let mut pairs = with_ids(&codes);
            if round % 3 == 0 {
                // Non-sequential ids
                let mut gid = 1u16;
                for p in pairs.iter_mut() {
                    p.1 = gid;
                    gid += rng.random_range(1..4);
                }
            }

            for ptr in [PointerWidth::Four, PointerWidth::Eight] {
                let plan = plan_cmaps(&pairs, ptr).unwrap();
                validate_plan(&plan, &pairs).unwrap();
                for &(code, gid) in &pairs {
                    let hits: Vec<u16> = plan.iter().filter_map(|s| s.lookup(code)).collect();
                    assert_eq!(hits, vec![gid], "round {} code U+{:04X}", round, code);
                }
            }
        }
    }

    #[test]
    fn test_from_run_overflow() {
        let err = CmapSubtable::from_run(CmapFormat::SparseFull, &[(0x20, 1), (0x20 + 70_000, 2)])
            .unwrap_err();
        assert!(matches!(
            err,
            BundleError::RangeOverflow {
                min_code: 0x20,
                field: "code",
                ..
            }
        ));

        let err =
            CmapSubtable::from_run(CmapFormat::Format0Full, &[(0x20, 1), (0x21, 400)]).unwrap_err();
        assert!(matches!(err, BundleError::RangeOverflow { field: "id", .. }));
    }

    #[test]
    fn test_from_run_rejects_wrong_tiny() {
        let err = CmapSubtable::from_run(CmapFormat::Format0Tiny, &[(0x20, 1), (0x22, 2)])
            .unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }

    #[test]
    fn test_sparse_full_uses_min_gid() {
        let table =
            CmapSubtable::from_run(CmapFormat::SparseFull, &[(0x30, 9), (0x40, 4), (0x50, 7)])
                .unwrap();
        assert_eq!(table.start_glyph_id, 4);
        assert_eq!(table.lookup(0x30), Some(9));
        assert_eq!(table.lookup(0x40), Some(4));
        assert_eq!(table.lookup(0x41), None);
        assert_eq!(table.entry_count(), 3);
    }

    #[test]
    fn test_validate_plan_detects_gap() {
        let pairs = with_ids(&[0x41, 0x42, 0x43]);
        let plan = vec![CmapSubtable::from_run(CmapFormat::Format0Tiny, &pairs[..2]).unwrap()];
        assert!(validate_plan(&plan, &pairs).is_err());
    }

    #[test]
    fn test_unsorted_input_rejected() {
        let err = plan_cmaps(&[(0x42, 1), (0x41, 2)], PointerWidth::Four).unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }

    #[test]
    fn test_empty_plan() {
        assert!(plan_cmaps(&[], PointerWidth::Four).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_on_impossible_subtables() {
        let empty = CmapSubtable {
            min_code: 0,
            range_length: 0,
            start_glyph_id: 1,
            entries: CmapEntries::Format0Tiny,
        };
        assert_eq!(empty.lookup(0), None);
        assert_eq!(empty.lookup(5), None);

        let short = CmapSubtable {
            min_code: 0x41,
            range_length: 10,
            start_glyph_id: 1,
            entries: CmapEntries::Format0 {
                id_offsets: vec![0, 1],
            },
        };
        assert_eq!(short.lookup(0x42), Some(2));
        assert_eq!(short.lookup(0x49), None);

        let high = CmapSubtable {
            min_code: u32::MAX - 1,
            range_length: 4,
            start_glyph_id: u16::MAX,
            entries: CmapEntries::Format0Tiny,
        };
        assert_eq!(high.max_code(), u32::MAX);
        assert_eq!(high.lookup(u32::MAX - 1), Some(u16::MAX));
        assert_eq!(high.lookup(u32::MAX), None);
    }
}
