//! Error taxonomy for the bundle pipeline.
//!
//! Every error is terminal for the current build. Variants carry the asset
//! name and the pipeline [`Stage`] so callers can report a precise message.

use std::fmt;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Build plan validation
    Plan,
    /// Font rasterization and CBIN encoding
    Font,
    /// Wake-word model packing
    WakeModels,
    /// Image conversion (backgrounds, emoji)
    Image,
    /// Manifest serialization
    Manifest,
    /// Final container packing
    Container,
    /// Reading back a finished blob
    Inspect,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Font => "font",
            Stage::WakeModels => "wake models",
            Stage::Image => "image",
            Stage::Manifest => "manifest",
            Stage::Container => "container",
            Stage::Inspect => "inspect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bundle pipeline error
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Invalid bpp/compression/size combination or malformed plan value
    #[error("{stage}: invalid configuration for '{asset}': {message}")]
    Config {
        stage: Stage,
        asset: String,
        message: String,
    },

    /// A declared font/model/image source could not be obtained
    #[error("{stage}: missing resource '{asset}': {message}")]
    ResourceMissing {
        stage: Stage,
        asset: String,
        message: String,
    },

    /// A cmap delta does not fit its field
    #[error("font: cmap subtable at U+{min_code:04X} cannot encode U+{code:04X} ({field} delta {delta} out of range)")]
    RangeOverflow {
        min_code: u32,
        code: u32,
        field: &'static str,
        delta: i64,
    },

    /// Requested feature is not implemented by the encoder
    #[error("{stage}: unsupported feature: {feature}")]
    UnsupportedFeature { stage: Stage, feature: String },

    /// Nothing to pack
    #[error("{stage}: no entries to pack")]
    EmptyBundle { stage: Stage },

    /// A blob handed to a reader does not follow its format
    #[error("{stage}: malformed '{asset}': {message}")]
    Malformed {
        stage: Stage,
        asset: String,
        message: String,
    },

    /// Build aborted by the caller between stages
    #[error("build cancelled before {stage} stage")]
    Cancelled { stage: Stage },

    /// Filesystem error from a collaborator
    #[error("{stage}: I/O error for '{asset}': {source}")]
    Io {
        stage: Stage,
        asset: String,
        #[source]
        source: std::io::Error,
    },
}

impl BundleError {
    pub fn config(stage: Stage, asset: impl Into<String>, message: impl Into<String>) -> Self {
        BundleError::Config {
            stage,
            asset: asset.into(),
            message: message.into(),
        }
    }

    pub fn missing(stage: Stage, asset: impl Into<String>, message: impl Into<String>) -> Self {
        BundleError::ResourceMissing {
            stage,
            asset: asset.into(),
            message: message.into(),
        }
    }

    pub fn malformed(stage: Stage, asset: impl Into<String>, message: impl Into<String>) -> Self {
        BundleError::Malformed {
            stage,
            asset: asset.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(stage: Stage, feature: impl Into<String>) -> Self {
        BundleError::UnsupportedFeature {
            stage,
            feature: feature.into(),
        }
    }

    /// Stage the error was raised in
    pub fn stage(&self) -> Stage {
        match self {
            BundleError::Config { stage, .. }
            | BundleError::ResourceMissing { stage, .. }
            | BundleError::UnsupportedFeature { stage, .. }
            | BundleError::EmptyBundle { stage }
            | BundleError::Malformed { stage, .. }
            | BundleError::Cancelled { stage }
            | BundleError::Io { stage, .. } => *stage,
            BundleError::RangeOverflow { .. } => Stage::Font,
        }
    }
}

/// Result alias used throughout the formats crate
pub type Result<T> = std::result::Result<T, BundleError>;
