//! Charset resolution for custom fonts.
//!
//! A [`CharsetTable`] lives for one build. It caches parsed charset text
//! files so the same file named twice is read once.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use hashbrown::HashMap;
use pack_common::{BundleError, Result, Stage};

use crate::plan::FontSection;
use crate::source::AssetSource;

/// Printable ASCII
const ASCII: RangeInclusive<u32> = 0x20..=0x7E;
/// Latin-1 supplement, printable part
const LATIN1_SUPPLEMENT: RangeInclusive<u32> = 0xA0..=0xFF;

/// Codepoints of a built-in charset
pub fn builtin_charset(name: &str) -> Option<Vec<u32>> {
    match name {
        "ascii" => Some(ASCII.collect()),
        "latin1" => Some(ASCII.chain(LATIN1_SUPPLEMENT).collect()),
        _ => None,
    }
}

/// Parse `0x4E00-0x9FFF`, `U+20AC` or a single decimal/hex codepoint
pub fn parse_range(value: &str) -> Result<RangeInclusive<u32>> {
    let invalid = || {
        BundleError::config(
            Stage::Plan,
            "font.ranges",
            format!("invalid range {:?}", value),
        )
    };
    let parse_one = |s: &str| -> Result<u32> {
        let s = s.trim();
        let hex = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .or_else(|| s.strip_prefix("U+"));
        let code = match hex {
            Some(h) => u32::from_str_radix(h, 16),
            None => s.parse(),
        }
        .map_err(|_| invalid())?;
        char::from_u32(code).ok_or_else(invalid)?;
        Ok(code)
    };

    let (start, end) = match value.split_once('-') {
        Some((a, b)) => (parse_one(a)?, parse_one(b)?),
        None => {
            let code = parse_one(value)?;
            (code, code)
        }
    };
    if start > end {
        return Err(invalid());
    }
    Ok(start..=end)
}

/// Characters of a charset text file, control characters excluded
pub fn parse_charset_text(name: &str, bytes: &[u8]) -> Result<Vec<u32>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BundleError::config(Stage::Font, name, format!("charset is not UTF-8: {}", e)))?;
    let set: BTreeSet<u32> = text
        .chars()
        .filter(|c| !c.is_control() && *c != '\u{FEFF}')
        .map(|c| c as u32)
        .collect();
    Ok(set.into_iter().collect())
}

/// Build-scoped charset lookup
#[derive(Debug, Default)]
pub struct CharsetTable {
    files: HashMap<String, Vec<u32>>,
}

impl CharsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codepoints of a charset text file, read through `source` once
    pub fn file(&mut self, path: &str, source: &dyn AssetSource) -> Result<&[u32]> {
        if !self.files.contains_key(path) {
            let bytes = source.read_user_file(path)?;
            let codes = parse_charset_text(path, &bytes)?;
            self.files.insert(path.to_string(), codes);
        }
        Ok(self.files.get(path).map(Vec::as_slice).unwrap_or_default())
    }

    /// Sorted, distinct codepoints selected by a font section
    pub fn resolve(&mut self, font: &FontSection, source: &dyn AssetSource) -> Result<Vec<u32>> {
        let mut codes = BTreeSet::new();
        for name in &font.charsets {
            let builtin = builtin_charset(name).ok_or_else(|| {
                BundleError::config(
                    Stage::Plan,
                    "font.charsets",
                    format!("unknown charset {:?} (expected \"ascii\" or \"latin1\")", name),
                )
            })?;
            codes.extend(builtin);
        }
        for path in &font.charset_files {
            codes.extend(self.file(path, source)?.iter().copied());
        }
        for range in &font.ranges {
            codes.extend(parse_range(range)?);
        }
        Ok(codes.into_iter().collect())
    }

    pub fn cached_files(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TextSource {
        reads: AtomicUsize,
    }

    impl AssetSource for TextSource {
        fn list_model_files(&self, model: &str) -> Result<Vec<String>> {
            Err(BundleError::missing(Stage::WakeModels, model, "none"))
        }
        fn fetch_model_file(&self, model: &str, _file: &str) -> Result<Vec<u8>> {
            Err(BundleError::missing(Stage::WakeModels, model, "none"))
        }
        fn fetch_preset_font(&self, name: &str) -> Result<Vec<u8>> {
            Err(BundleError::missing(Stage::Font, name, "none"))
        }
        fn fetch_preset_emoji(&self, _set: &str, name: &str) -> Result<SourceImage> {
            Err(BundleError::missing(Stage::Image, name, "none"))
        }
        fn read_user_file(&self, _path: &str) -> Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok("\u{FEFF}你好\nAB\r\n你".as_bytes().to_vec())
        }
    }

    fn section(charsets: &[&str], files: &[&str], ranges: &[&str]) -> FontSection {
        let to_vec = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        FontSection {
            preset: None,
            file: Some("font.ttf".to_string()),
            size: 16,
            bpp: 4,
            compressed: false,
            prefilter: true,
            charsets: to_vec(charsets),
            charset_files: to_vec(files),
            ranges: to_vec(ranges),
            kerning: false,
            pointer_width: 4,
        }
    }

    #[test]
    fn test_builtin_charsets() {
        assert_eq!(builtin_charset("ascii").unwrap().len(), 95);
        assert_eq!(builtin_charset("latin1").unwrap().len(), 95 + 96);
        assert!(builtin_charset("klingon").is_none());
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("0x4E00-0x4E10").unwrap(), 0x4E00..=0x4E10);
        assert_eq!(parse_range("U+20AC").unwrap(), 0x20AC..=0x20AC);
        assert_eq!(parse_range("65 - 70").unwrap(), 65..=70);
        assert!(parse_range("0x50-0x40").is_err());
        assert!(parse_range("0xD800").is_err());
        assert!(parse_range("zz").is_err());
    }

    #[test]
    fn test_charset_text_skips_controls() {
        let codes = parse_charset_text("c.txt", "\u{FEFF}你好\nAB\r\n你".as_bytes()).unwrap();
        assert_eq!(codes, vec![0x41, 0x42, 0x4F60, 0x597D]);
        assert!(parse_charset_text("c.txt", &[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_resolve_union_and_cache() {
        let source = TextSource {
            reads: AtomicUsize::new(0),
        };
        let mut table = CharsetTable::new();
        let font = section(&["ascii"], &["cn.txt", "cn.txt"], &["0x4E00-0x4E01"]);
        let codes = table.resolve(&font, &source).unwrap();

        assert_eq!(codes.len(), 95 + 2 + 2);
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(table.cached_files(), 1);
    }

    #[test]
    fn test_unknown_charset() {
        let source = TextSource {
            reads: AtomicUsize::new(0),
        };
        let err = CharsetTable::new()
            .resolve(&section(&["emoji"], &[], &[]), &source)
            .unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }
}
