//! Bundle format specification for the assets container.
//!
//! This module defines the `BundleFormat` struct which serves as the single source of truth
//! for all bundle-related constants (well-known entry names, name width, data marker).
//!
//! # Example
//!
//! ```
//! use assetpack_shared::ASSETS_BUNDLE_FORMAT;
//!
//! // Name of the manifest entry
//! assert_eq!(ASSETS_BUNDLE_FORMAT.index_name, "index.json");
//!
//! // Every file in the data region is prefixed by the marker
//! assert_eq!(ASSETS_BUNDLE_FORMAT.data_marker, &[0x5A, 0x5A]);
//! ```

/// Bundle format specification.
///
/// Defines the naming and framing constants shared by the encoders,
/// the orchestrator and the readers. Each target runtime has its own
/// static `BundleFormat` instance.
#[derive(Debug, Clone, Copy)]
pub struct BundleFormat {
    /// Bundle file extension without dot (e.g., "bin")
    pub extension: &'static str,

    /// Manifest entry name, always the first logical entry of a build
    pub index_name: &'static str,

    /// File name used for the packed wake-word models
    pub models_name: &'static str,

    /// Extension of converted image and font entries (e.g., "bin")
    pub asset_ext: &'static str,

    /// Fixed width of every name field in the container and model tables
    pub name_len: usize,

    /// Marker written in front of every file in the container data region
    pub data_marker: &'static [u8; 2],

    /// Manifest schema version
    pub manifest_version: u32,
}

impl BundleFormat {
    /// Create a new bundle format specification.
    pub const fn new(
        extension: &'static str,
        index_name: &'static str,
        models_name: &'static str,
        asset_ext: &'static str,
        name_len: usize,
        data_marker: &'static [u8; 2],
        manifest_version: u32,
    ) -> Self {
        Self {
            extension,
            index_name,
            models_name,
            asset_ext,
            name_len,
            data_marker,
            manifest_version,
        }
    }

    /// File name for a converted asset with the given stem (e.g., "happy" -> "happy.bin")
    pub fn asset_file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.asset_ext)
    }
}

/// Assets bundle format specification.
///
/// - Bundle extension: `.bin`
/// - Manifest entry: `index.json`
/// - Wake-word model pack: `srmodels.bin`
/// - 32-byte names, `0x5A 0x5A` data marker
pub const ASSETS_BUNDLE_FORMAT: BundleFormat =
    BundleFormat::new("bin", "index.json", "srmodels.bin", "bin", 32, &[0x5A, 0x5A], 1);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_format_names() {
        assert_eq!(ASSETS_BUNDLE_FORMAT.extension, "bin");
        assert_eq!(ASSETS_BUNDLE_FORMAT.index_name, "index.json");
        assert_eq!(ASSETS_BUNDLE_FORMAT.models_name, "srmodels.bin");
    }

    #[test]
    fn test_bundle_format_framing() {
        assert_eq!(ASSETS_BUNDLE_FORMAT.name_len, 32);
        assert_eq!(ASSETS_BUNDLE_FORMAT.data_marker, &[0x5A, 0x5A]);
        assert_eq!(ASSETS_BUNDLE_FORMAT.manifest_version, 1);
    }

    #[test]
    fn test_asset_file_name() {
        assert_eq!(ASSETS_BUNDLE_FORMAT.asset_file_name("happy"), "happy.bin");
        assert_eq!(
            ASSETS_BUNDLE_FORMAT.asset_file_name("background_dark"),
            "background_dark.bin"
        );
    }
}
