//! Binary formats for the assetpack bundle pipeline
//!
//! Pure encoders and readers shared by the `assetpack` tool and its tests:
//! - `assetpack` (build orchestrator and CLI)
//! - integration tests that read bundles back
//!
//! # Modules
//!
//! - [`formats`] - CBIN fonts, wake-word model packs, RGB565 images, the assets container
//! - [`manifest`] - `index.json` value types
//! - [`error`] - error taxonomy shared by every stage
//!
//! Nothing in this crate touches the filesystem or logs.

pub mod error;
pub mod formats;
pub mod manifest;

pub use error::{BundleError, Result, Stage};

// Re-export commonly used format items
pub use formats::font::{
    BitmapFormat, Bpp, CbinFont, EncodeOptions, FontDescriptor, Glyph, GlyphBox, GlyphSet,
    KernPair, PointerWidth, build_font, encode_font, plan_cmaps,
};
pub use formats::{
    ColorFormat, ContainerEntry, ImageDescriptor, ModelBundle, ModelFile,
    UnpackedContainer, pack_container, pack_models, unpack_container, unpack_models,
};
pub use manifest::{AssetManifest, DisplayConfig, EmojiEntry, Skin, SkinTheme};
