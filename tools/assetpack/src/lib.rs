//! Asset bundle builder
//!
//! Turns an `assets.toml` build plan into one device asset container:
//! a CBIN font, packed wake-word models, RGB565 backgrounds and emoji,
//! and the `index.json` manifest describing them.
//!
//! # Modules
//!
//! - [`plan`] - `assets.toml` parsing and validation
//! - [`source`] - where fonts, models and images come from
//! - [`font`] - charset resolution, rasterization, CBIN encoding
//! - [`image`] - image fitting and RGB565 conversion
//! - [`bundle`] - the orchestrator tying the stages together

pub mod bundle;
pub mod font;
pub mod image;
pub mod plan;
pub mod source;

pub use bundle::{BuildContext, BuildEvent, BuiltBundle, CancelToken, EntrySummary, build_bundle};
pub use plan::{BuildPlan, load_plan, parse_plan};
pub use source::{AssetSource, DirectorySource};
