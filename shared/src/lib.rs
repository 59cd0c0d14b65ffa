//! Shared constants and helpers for the assetpack bundle pipeline.

pub mod bundle_format;
pub mod fs;

pub use bundle_format::{ASSETS_BUNDLE_FORMAT, BundleFormat};
pub use fs::{
    MAX_BUNDLE_BYTES, MAX_FONT_BYTES, MAX_IMAGE_BYTES, MAX_MODEL_FILE_BYTES, read_file_with_limit,
};
