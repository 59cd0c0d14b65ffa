//! Binary serialization helpers shared by the fixed-layout records.
//!
//! Fixed-size records carry their own `SIZE`, `to_bytes` and `from_bytes`.
//! Names in the container and model tables are fixed-width single-byte
//! strings handled by [`encode_fixed_name`] and [`decode_fixed_name`].

use assetpack_shared::ASSETS_BUNDLE_FORMAT;

use crate::error::{BundleError, Result, Stage};

/// Width of every name field in the container and model tables
pub const NAME_LEN: usize = ASSETS_BUNDLE_FORMAT.name_len;

/// Encode a name as a fixed-width, left-justified, zero-padded byte array.
///
/// Characters are stored one byte each (Latin-1); names longer than
/// [`NAME_LEN`] bytes or containing characters above U+00FF are rejected.
pub fn encode_fixed_name(name: &str, stage: Stage) -> Result<[u8; NAME_LEN]> {
    let mut out = [0u8; NAME_LEN];
    let mut len = 0;
    for ch in name.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return Err(BundleError::config(
                stage,
                name,
                format!("character {:?} cannot be stored in a single-byte name", ch),
            ));
        }
        if len == NAME_LEN {
            return Err(BundleError::config(
                stage,
                name,
                format!("name longer than {} bytes", NAME_LEN),
            ));
        }
        out[len] = code as u8;
        len += 1;
    }
    if len == 0 {
        return Err(BundleError::config(stage, name, "name is empty"));
    }
    Ok(out)
}

/// Decode a fixed-width name field (stops at the first zero byte).
pub fn decode_fixed_name(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

pub(crate) fn read_u16(bytes: &[u8], at: usize) -> Option<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}
