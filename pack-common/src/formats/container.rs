//! Assets container format (`assets.bin`)
//!
//! SPIFFS-style multi-file blob: a small header, a fixed-size table of
//! named entries, then the file data region. Entries are ordered by
//! (extension, stem) so identical inputs always produce identical bytes.
//!
//! # Layout
//! ```text
//! 0x00: file_count u32 LE
//! 0x04: checksum u32 LE        (low 16 bits = byte sum of table ‖ data, high 16 bits = 0)
//! 0x08: combined_len u32 LE    (table bytes + data bytes)
//! 0x0C: table, one 44-byte record per entry:
//!       name [u8; 32] (zero-padded), size u32, offset u32, width u16, height u16
//! ....: data region, per entry: 0x5A 0x5A marker + file bytes
//! ```
//!
//! `offset` is relative to the start of the data region and points at the
//! entry's marker: offset(i) = Σ (2 + size) over all prior entries.

use std::cmp::Ordering;
use std::sync::OnceLock;

use assetpack_shared::ASSETS_BUNDLE_FORMAT;
use hashbrown::HashMap;

use super::serialization::{
    NAME_LEN, decode_fixed_name, encode_fixed_name, read_u16, read_u32,
};
use crate::error::{BundleError, Result, Stage};

/// Marker written in front of every file in the data region
pub const DATA_MARKER: [u8; 2] = *ASSETS_BUNDLE_FORMAT.data_marker;

/// One named file in the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub data: Vec<u8>,
    /// Image width for converted images, 0 otherwise
    pub width: u16,
    /// Image height for converted images, 0 otherwise
    pub height: u16,
}

impl ContainerEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
            width: 0,
            height: 0,
        }
    }

    /// Create an entry carrying image dimensions
    pub fn with_dimensions(name: impl Into<String>, data: Vec<u8>, width: u16, height: u16) -> Self {
        Self {
            name: name.into(),
            data,
            width,
            height,
        }
    }
}

/// Container header (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub file_count: u32,
    pub checksum: u32,
    pub combined_len: u32,
}

impl ContainerHeader {
    pub const SIZE: usize = 12;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.file_count.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.combined_len.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self {
            file_count: read_u32(bytes, 0)?,
            checksum: read_u32(bytes, 4)?,
            combined_len: read_u32(bytes, 8)?,
        })
    }
}

/// Table record (44 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableEntry {
    pub name: [u8; NAME_LEN],
    pub size: u32,
    pub offset: u32,
    pub width: u16,
    pub height: u16,
}

impl TableEntry {
    pub const SIZE: usize = NAME_LEN + 12;

    pub fn name(&self) -> String {
        decode_fixed_name(&self.name)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..32].copy_from_slice(&self.name);
        bytes[32..36].copy_from_slice(&self.size.to_le_bytes());
        bytes[36..40].copy_from_slice(&self.offset.to_le_bytes());
        bytes[40..42].copy_from_slice(&self.width.to_le_bytes());
        bytes[42..44].copy_from_slice(&self.height.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(bytes.get(0..NAME_LEN)?);
        Some(Self {
            name,
            size: read_u32(bytes, 32)?,
            offset: read_u32(bytes, 36)?,
            width: read_u16(bytes, 40)?,
            height: read_u16(bytes, 42)?,
        })
    }
}

/// Split a file name into (stem, extension) the way `os.path.splitext` does:
/// the extension includes the dot, leading dots do not start an extension.
fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if name[..dot].chars().any(|c| c != '.') => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    }
}

/// Canonical entry ordering: (extension, stem) ascending, case-insensitive,
/// falling back to the exact name so distinct names never compare equal.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    let (stem_a, ext_a) = split_name(a);
    let (stem_b, ext_b) = split_name(b);
    ext_a
        .to_lowercase()
        .cmp(&ext_b.to_lowercase())
        .then_with(|| stem_a.to_lowercase().cmp(&stem_b.to_lowercase()))
        .then_with(|| a.cmp(b))
}

/// Unsigned byte sum modulo 65536
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc + b as u32) & 0xFFFF)
}

/// Pack entries into a container blob.
///
/// Entries are sorted by (extension, stem) before packing; input order does
/// not matter. Fails with [`BundleError::EmptyBundle`] for an empty set and
/// with a config error for duplicate or unrepresentable names.
pub fn pack_container(entries: &[ContainerEntry]) -> Result<Vec<u8>> {
    if entries.is_empty() {
        return Err(BundleError::EmptyBundle {
            stage: Stage::Container,
        });
    }

    let mut ordered: Vec<&ContainerEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| compare_names(&a.name, &b.name));

    for pair in ordered.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(BundleError::config(
                Stage::Container,
                &pair[0].name,
                "duplicate entry name",
            ));
        }
    }

    let table_len = ordered.len() * TableEntry::SIZE;
    let data_len: usize = ordered.iter().map(|e| DATA_MARKER.len() + e.data.len()).sum();
    let combined_len = table_len + data_len;
    let combined_len_u32 = u32::try_from(combined_len).map_err(|_| {
        BundleError::config(
            Stage::Container,
            ASSETS_BUNDLE_FORMAT.extension,
            format!("container too large ({} bytes)", combined_len),
        )
    })?;

    let mut combined = Vec::with_capacity(combined_len);
    let mut offset = 0u32;
    for entry in &ordered {
        let size = u32::try_from(entry.data.len()).map_err(|_| {
            BundleError::config(Stage::Container, &entry.name, "entry larger than 4 GiB")
        })?;
        let record = TableEntry {
            name: encode_fixed_name(&entry.name, Stage::Container)?,
            size,
            offset,
            width: entry.width,
            height: entry.height,
        };
        combined.extend_from_slice(&record.to_bytes());
        offset += DATA_MARKER.len() as u32 + size;
    }
    for entry in &ordered {
        combined.extend_from_slice(&DATA_MARKER);
        combined.extend_from_slice(&entry.data);
    }

    let header = ContainerHeader {
        file_count: ordered.len() as u32,
        checksum: checksum(&combined),
        combined_len: combined_len_u32,
    };

    let mut out = Vec::with_capacity(ContainerHeader::SIZE + combined.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&combined);
    Ok(out)
}

/// Container read back from bytes
#[derive(Debug, Default)]
pub struct UnpackedContainer {
    /// Entries in stored order
    pub entries: Vec<ContainerEntry>,

    /// Stored checksum
    pub checksum: u32,

    index: OnceLock<HashMap<String, usize>>,
}

impl UnpackedContainer {
    /// Find an entry by name (O(1) lookup via lazy-initialized hash index)
    pub fn find(&self, name: &str) -> Option<&ContainerEntry> {
        let index = self.index.get_or_init(|| {
            self.entries
                .iter()
                .enumerate()
                .map(|(i, e)| (e.name.clone(), i))
                .collect()
        });
        index.get(name).map(|&i| &self.entries[i])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse a container blob, validating the checksum, lengths and markers.
pub fn unpack_container(bytes: &[u8]) -> Result<UnpackedContainer> {
    let malformed = |message: String| BundleError::malformed(Stage::Inspect, "container", message);

    let header = ContainerHeader::from_bytes(bytes)
        .ok_or_else(|| malformed(format!("{} bytes is shorter than the header", bytes.len())))?;
    let combined = &bytes[ContainerHeader::SIZE..];
    if combined.len() != header.combined_len as usize {
        return Err(malformed(format!(
            "combined length {} does not match {} stored bytes",
            header.combined_len,
            combined.len()
        )));
    }
    if header.checksum >> 16 != 0 {
        return Err(malformed(format!(
            "checksum 0x{:08X} has non-zero high bits",
            header.checksum
        )));
    }
    let actual = checksum(combined);
    if actual != header.checksum {
        return Err(malformed(format!(
            "checksum mismatch (stored 0x{:04X}, computed 0x{:04X})",
            header.checksum, actual
        )));
    }

    let count = header.file_count as usize;
    let table_len = count
        .checked_mul(TableEntry::SIZE)
        .filter(|&len| len <= combined.len())
        .ok_or_else(|| malformed(format!("table for {} entries exceeds the blob", count)))?;
    let data = &combined[table_len..];

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let record = TableEntry::from_bytes(&combined[i * TableEntry::SIZE..])
            .ok_or_else(|| malformed(format!("truncated table record {}", i)))?;
        let start = record.offset as usize;
        let body = start + DATA_MARKER.len();
        let end = body + record.size as usize;
        if end > data.len() {
            return Err(malformed(format!(
                "entry '{}' ends at {} past the data region ({} bytes)",
                record.name(),
                end,
                data.len()
            )));
        }
        if data[start..body] != DATA_MARKER {
            return Err(malformed(format!(
                "entry '{}' is missing its data marker",
                record.name()
            )));
        }
        entries.push(ContainerEntry {
            name: record.name(),
            data: data[body..end].to_vec(),
            width: record.width,
            height: record.height,
        });
    }

    Ok(UnpackedContainer {
        entries,
        checksum: header.checksum,
        index: OnceLock::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<ContainerEntry> {
        vec![
            ContainerEntry::new("index.json", br#"{"version":1}"#.to_vec()),
            ContainerEntry::new("a.png", vec![0xAB; 100]),
            ContainerEntry::new("b.png", vec![0xCD; 50]),
        ]
    }

    /// Independent reference: sum every byte after the 12-byte header
    fn reference_checksum(blob: &[u8]) -> u32 {
        let mut sum: u64 = 0;
        for &b in &blob[12..] {
            sum += b as u64;
        }
        (sum % 65536) as u32
    }

    #[test]
    fn test_pack_three_entries() {
        let entries = sample_entries();
        let blob = pack_container(&entries).unwrap();
        let header = ContainerHeader::from_bytes(&blob).unwrap();

        assert_eq!(header.file_count, 3);
        let table_bytes = 3 * TableEntry::SIZE;
        let data_bytes: usize = entries.iter().map(|e| 2 + e.data.len()).sum();
        assert_eq!(header.combined_len as usize, table_bytes + data_bytes);
        assert_eq!(blob.len(), ContainerHeader::SIZE + table_bytes + data_bytes);
        assert_eq!(header.checksum, reference_checksum(&blob));
        assert_eq!(header.checksum >> 16, 0);
    }

    #[test]
    fn test_sort_by_extension_then_stem() {
        let blob = pack_container(&sample_entries()).unwrap();
        let names: Vec<String> = (0..3)
            .map(|i| {
                TableEntry::from_bytes(&blob[ContainerHeader::SIZE + i * TableEntry::SIZE..])
                    .unwrap()
                    .name()
            })
            .collect();
        // ".json" < ".png"
        assert_eq!(names, vec!["index.json", "a.png", "b.png"]);
    }

    #[test]
    fn test_offsets_include_markers() {
        let blob = pack_container(&sample_entries()).unwrap();
        let table = &blob[ContainerHeader::SIZE..];
        let first = TableEntry::from_bytes(table).unwrap();
        let second = TableEntry::from_bytes(&table[TableEntry::SIZE..]).unwrap();
        let third = TableEntry::from_bytes(&table[2 * TableEntry::SIZE..]).unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, 2 + first.size);
        assert_eq!(third.offset, second.offset + 2 + second.size);

        let data = &table[3 * TableEntry::SIZE..];
        assert_eq!(&data[second.offset as usize..second.offset as usize + 2], &DATA_MARKER);
    }

    #[test]
    fn test_case_insensitive_order() {
        let entries = vec![
            ContainerEntry::new("Zeta.BIN", vec![1]),
            ContainerEntry::new("alpha.bin", vec![2]),
            ContainerEntry::new("beta.JSON", vec![3]),
        ];
        let unpacked = unpack_container(&pack_container(&entries).unwrap()).unwrap();
        let names: Vec<&str> = unpacked.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha.bin", "Zeta.BIN", "beta.JSON"]);
    }

    #[test]
    fn test_pack_unpack_repack_identical() {
        let mut entries = sample_entries();
        entries.push(ContainerEntry::with_dimensions("bg.bin", vec![7; 40], 320, 240));
        let blob = pack_container(&entries).unwrap();

        let unpacked = unpack_container(&blob).unwrap();
        let bg = unpacked.find("bg.bin").unwrap();
        assert_eq!((bg.width, bg.height), (320, 240));

        // Re-pack in reverse order: canonical sort must restore identical bytes
        let mut reversed = unpacked.entries.clone();
        reversed.reverse();
        assert_eq!(pack_container(&reversed).unwrap(), blob);
    }

    #[test]
    fn test_zero_length_entry_checksum() {
        let entries = vec![
            ContainerEntry::new("empty.txt", Vec::new()),
            ContainerEntry::new("index.json", b"{}".to_vec()),
        ];
        let blob = pack_container(&entries).unwrap();
        let unpacked = unpack_container(&blob).unwrap();

        assert_eq!(unpacked.checksum, reference_checksum(&blob));
        assert!(unpacked.find("empty.txt").unwrap().data.is_empty());
        assert_eq!(unpacked.find("index.json").unwrap().data, b"{}");
    }

    #[test]
    fn test_checksum_wraps() {
        let entries = vec![ContainerEntry::new("big.bin", vec![0xFF; 1000])];
        let blob = pack_container(&entries).unwrap();
        let header = ContainerHeader::from_bytes(&blob).unwrap();
        assert_eq!(header.checksum, reference_checksum(&blob));
        assert!(header.checksum < 65536);
    }

    #[test]
    fn test_empty_bundle() {
        let err = pack_container(&[]).unwrap_err();
        assert!(matches!(err, BundleError::EmptyBundle { stage: Stage::Container }));
    }

    #[test]
    fn test_duplicate_names() {
        let entries = vec![
            ContainerEntry::new("a.bin", vec![1]),
            ContainerEntry::new("a.bin", vec![2]),
        ];
        let err = pack_container(&entries).unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }

    #[test]
    fn test_name_too_long() {
        let entries = vec![ContainerEntry::new(format!("{}.bin", "x".repeat(40)), vec![1])];
        assert!(matches!(
            pack_container(&entries).unwrap_err(),
            BundleError::Config { .. }
        ));
    }

    #[test]
    fn test_unpack_detects_corruption() {
        let mut blob = pack_container(&sample_entries()).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let err = unpack_container(&blob).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_unpack_truncated() {
        let blob = pack_container(&sample_entries()).unwrap();
        assert!(unpack_container(&blob[..8]).is_err());
        assert!(unpack_container(&blob[..blob.len() - 1]).is_err());
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("index.json"), ("index", ".json"));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
        assert_eq!(split_name("noext"), ("noext", ""));
    }
}
