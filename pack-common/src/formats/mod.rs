//! Binary formats written into an asset bundle
//!
//! Little-endian, fixed-layout records. Bundle-level constants (file names,
//! data marker, name width) are defined in `assetpack_shared::BundleFormat`.

pub mod container;
pub mod font;
pub mod image;
mod serialization;
pub mod wake_model;

pub use container::*;
pub use image::*;
pub use serialization::{NAME_LEN, decode_fixed_name, encode_fixed_name};
pub use wake_model::*;

// Re-export bundle format from shared for convenience
pub use assetpack_shared::{ASSETS_BUNDLE_FORMAT, BundleFormat};
