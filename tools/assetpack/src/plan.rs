//! assets.toml build plan parsing
//!
//! The plan names every input of one bundle build. Optional sections default
//! to "not included"; [`BuildPlan::validate`] rejects inconsistent values
//! before any encoding starts.

use std::path::Path;

use anyhow::{Context, Result};
use pack_common::formats::{ASSETS_BUNDLE_FORMAT, encode_fixed_name};
use pack_common::{BundleError, Bpp, FontDescriptor, PointerWidth, Stage};
use serde::Deserialize;

use crate::source::EMOJI_EXTENSIONS;

/// assets.toml structure
#[derive(Debug, Clone, Deserialize)]
pub struct BuildPlan {
    /// Target chip (e.g. "esp32s3")
    pub chip_model: String,
    pub display: DisplaySection,
    #[serde(default)]
    pub font: Option<FontSection>,
    #[serde(default)]
    pub wake_word: Option<WakeWordSection>,
    #[serde(default)]
    pub emoji: Option<EmojiSection>,
    #[serde(default)]
    pub skin: SkinSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplaySection {
    pub width: u16,
    pub height: u16,
}

/// Font section: either a prebuilt preset or a font file to rasterize
#[derive(Debug, Clone, Deserialize)]
pub struct FontSection {
    /// Prebuilt CBIN font shipped with the presets (e.g. "font_puhui_16_4")
    pub preset: Option<String>,
    /// TTF/OTF file relative to the plan
    pub file: Option<String>,
    /// Pixel size
    #[serde(default = "default_font_size")]
    pub size: u16,
    /// Bits per pixel (1, 2, 3, 4 or 8)
    #[serde(default = "default_bpp")]
    pub bpp: u8,
    /// RLE compress glyph bitmaps
    #[serde(default)]
    pub compressed: bool,
    /// XOR rows with the previous row before compressing
    #[serde(default = "default_true")]
    pub prefilter: bool,
    /// Built-in charsets ("ascii", "latin1")
    #[serde(default)]
    pub charsets: Vec<String>,
    /// Text files whose characters are included
    #[serde(default)]
    pub charset_files: Vec<String>,
    /// Explicit ranges ("0x4E00-0x9FFF" or single "0x20AC")
    #[serde(default)]
    pub ranges: Vec<String>,
    /// Encode pair kerning from the font
    #[serde(default)]
    pub kerning: bool,
    /// Pointer width of the target runtime (4 or 8)
    #[serde(default = "default_pointer_width")]
    pub pointer_width: u8,
}

fn default_font_size() -> u16 {
    16
}

fn default_bpp() -> u8 {
    4
}

fn default_true() -> bool {
    true
}

fn default_pointer_width() -> u8 {
    4
}

/// Wake-word models, fetched by name from the model source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WakeWordSection {
    #[serde(default)]
    pub models: Vec<String>,
}

/// Emoji conversion mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmojiFormat {
    /// Convert to RGB565 (or RGB565A8 for transparent images)
    #[default]
    Rgb565,
    /// Store the source PNG/GIF unchanged
    Raw,
}

/// How an image is fitted into its target box
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Fit {
    /// Scale to fill, center crop
    #[default]
    Cover,
    /// Scale to fit, center, pad
    Contain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmojiSection {
    /// Preset emoji set (e.g. "twemoji_64")
    pub set: Option<String>,
    /// Emoji names taken from the preset set
    #[serde(default)]
    pub names: Vec<String>,
    /// User emoji images
    #[serde(default)]
    pub custom: Vec<CustomEmoji>,
    /// Target edge length in pixels
    #[serde(default = "default_emoji_size")]
    pub size: u16,
    #[serde(default)]
    pub format: EmojiFormat,
    #[serde(default = "default_emoji_fit")]
    pub fit: Fit,
}

fn default_emoji_size() -> u16 {
    64
}

fn default_emoji_fit() -> Fit {
    Fit::Contain
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomEmoji {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SkinSection {
    #[serde(default = "ThemeSection::light")]
    pub light: ThemeSection,
    #[serde(default = "ThemeSection::dark")]
    pub dark: ThemeSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeSection {
    pub text_color: String,
    pub background_color: String,
    /// Background image relative to the plan, scaled to the display
    pub background_image: Option<String>,
    #[serde(default)]
    pub fit: Fit,
}

impl ThemeSection {
    fn light() -> Self {
        Self {
            text_color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            background_image: None,
            fit: Fit::Cover,
        }
    }

    fn dark() -> Self {
        Self {
            text_color: "#ffffff".to_string(),
            background_color: "#121212".to_string(),
            background_image: None,
            fit: Fit::Cover,
        }
    }
}

impl Default for SkinSection {
    fn default() -> Self {
        Self {
            light: ThemeSection::light(),
            dark: ThemeSection::dark(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputSection {
    /// Output bundle path relative to the plan
    pub path: Option<String>,
}

/// Load and parse an assets.toml file
pub fn load_plan(path: &Path) -> Result<BuildPlan> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read build plan: {}", path.display()))?;
    let plan = parse_plan(&content)
        .with_context(|| format!("Failed to parse build plan: {}", path.display()))?;
    Ok(plan)
}

/// Parse assets.toml content
pub fn parse_plan(content: &str) -> pack_common::Result<BuildPlan> {
    toml::from_str(content).map_err(|e| BundleError::config(Stage::Plan, "assets.toml", e.to_string()))
}

/// Parse `#rrggbb` into RGB
pub fn parse_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

impl FontSection {
    pub fn bpp(&self) -> pack_common::Result<Bpp> {
        Bpp::try_from(self.bpp)
    }

    pub fn pointer_width(&self) -> pack_common::Result<PointerWidth> {
        PointerWidth::from_bytes(self.pointer_width as usize).ok_or_else(|| {
            BundleError::config(
                Stage::Plan,
                "font.pointer_width",
                format!("pointer width {} (expected 4 or 8)", self.pointer_width),
            )
        })
    }

    /// Asset name of the encoded font inside the bundle (without extension)
    pub fn asset_stem(&self) -> String {
        match (&self.preset, &self.file) {
            (Some(preset), _) => preset.clone(),
            _ => format!("font_custom_{}_{}", self.size, self.bpp),
        }
    }

    /// Check the section on its own, without touching any source
    pub fn validate(&self) -> pack_common::Result<()> {
        match (&self.preset, &self.file) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(BundleError::config(
                    Stage::Plan,
                    "font",
                    "set exactly one of `preset` or `file`",
                ));
            }
            (Some(_), None) => return Ok(()),
            (None, Some(_)) => {}
        }

        if self.size == 0 || self.size > 255 {
            return Err(BundleError::config(
                Stage::Plan,
                "font.size",
                format!("font size {} outside 1..=255", self.size),
            ));
        }
        self.pointer_width()?;
        let mut descriptor = FontDescriptor::new(self.bpp()?, self.size as i32, 0);
        descriptor.compressed = self.compressed;
        descriptor.validate(&self.asset_stem())?;

        if self.charsets.is_empty() && self.charset_files.is_empty() && self.ranges.is_empty() {
            return Err(BundleError::config(
                Stage::Plan,
                "font",
                "no charsets, charset files or ranges selected",
            ));
        }
        Ok(())
    }
}

impl BuildPlan {
    /// Check every value that can be checked without touching the sources
    pub fn validate(&self) -> pack_common::Result<()> {
        if self.chip_model.trim().is_empty() {
            return Err(BundleError::config(Stage::Plan, "chip_model", "chip model is empty"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(BundleError::config(
                Stage::Plan,
                "display",
                format!(
                    "display size {}x{} must be non-zero",
                    self.display.width, self.display.height
                ),
            ));
        }

        if let Some(font) = &self.font {
            font.validate()?;
            encode_fixed_name(
                &ASSETS_BUNDLE_FORMAT.asset_file_name(&font.asset_stem()),
                Stage::Plan,
            )?;
        }

        if let Some(wake) = &self.wake_word {
            if wake.models.iter().any(|m| m.trim().is_empty()) {
                return Err(BundleError::config(
                    Stage::Plan,
                    "wake_word.models",
                    "empty model name",
                ));
            }
            for model in &wake.models {
                encode_fixed_name(model, Stage::Plan)?;
            }
        }

        if let Some(emoji) = &self.emoji {
            if emoji.size == 0 {
                return Err(BundleError::config(Stage::Plan, "emoji.size", "emoji size is zero"));
            }
            if !emoji.names.is_empty() && emoji.set.is_none() {
                return Err(BundleError::config(
                    Stage::Plan,
                    "emoji",
                    "preset emoji names given without a `set`",
                ));
            }
            let mut seen = hashbrown::HashSet::new();
            for name in emoji.names.iter().chain(emoji.custom.iter().map(|c| &c.name)) {
                if name.is_empty() || !seen.insert(name.as_str()) {
                    return Err(BundleError::config(
                        Stage::Plan,
                        "emoji",
                        format!("emoji name {:?} is empty or duplicated", name),
                    ));
                }
            }

            let reserved = self.reserved_stems();
            let longest_ext = EMOJI_EXTENSIONS
                .iter()
                .max_by_key(|e| e.len())
                .copied()
                .unwrap_or(ASSETS_BUNDLE_FORMAT.asset_ext);
            let entries = emoji
                .names
                .iter()
                .map(|name| (name, longest_ext.to_string()))
                .chain(emoji.custom.iter().map(|c| {
                    let ext = Path::new(&c.file)
                        .extension()
                        .and_then(|e| e.to_str())
                        .map_or_else(|| longest_ext.to_string(), str::to_ascii_lowercase);
                    (&c.name, ext)
                }));
            for (name, raw_ext) in entries {
                if reserved.contains(name) {
                    return Err(BundleError::config(
                        Stage::Plan,
                        "emoji",
                        format!("emoji name {:?} collides with a reserved bundle entry", name),
                    ));
                }
                let entry = match emoji.format {
                    EmojiFormat::Rgb565 => ASSETS_BUNDLE_FORMAT.asset_file_name(name),
                    EmojiFormat::Raw => format!("{}.{}", name, raw_ext),
                };
                encode_fixed_name(&entry, Stage::Plan)?;
            }
        }

        for (label, theme) in [("skin.light", &self.skin.light), ("skin.dark", &self.skin.dark)] {
            for color in [&theme.text_color, &theme.background_color] {
                if parse_color(color).is_none() {
                    return Err(BundleError::config(
                        Stage::Plan,
                        label,
                        format!("invalid colour {:?} (expected #rrggbb)", color),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Stems of the non-emoji entries a build may emit
    fn reserved_stems(&self) -> Vec<String> {
        let mut stems: Vec<String> = [ASSETS_BUNDLE_FORMAT.index_name, ASSETS_BUNDLE_FORMAT.models_name]
            .iter()
            .map(|name| name.split_once('.').map_or(*name, |(stem, _)| stem).to_string())
            .collect();
        stems.extend(["light", "dark"].map(|label| format!("background_{}", label)));
        if let Some(font) = &self.font {
            stems.push(font.asset_stem());
        }
        stems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"
chip_model = "esp32s3"

[display]
width = 320
height = 240

[font]
file = "fonts/NotoSans.ttf"
size = 20
bpp = 4
compressed = true
charsets = ["ascii"]
ranges = ["0x4E00-0x4E10"]

[wake_word]
models = ["wn9_nihaoxiaozhi_tts"]

[emoji]
set = "twemoji_64"
names = ["happy", "sad"]
format = "raw"

[[emoji.custom]]
name = "logo"
file = "images/logo.png"

[skin.dark]
text_color = "#eeeeee"
background_color = "#000000"
background_image = "images/night.png"
fit = "contain"
"##;

    #[test]
    fn test_parse_full_plan() {
        let plan = parse_plan(FULL).unwrap();
        plan.validate().unwrap();

        let font = plan.font.as_ref().unwrap();
        assert_eq!(font.size, 20);
        assert!(font.prefilter);
        assert_eq!(font.pointer_width().unwrap(), PointerWidth::Four);
        assert_eq!(font.asset_stem(), "font_custom_20_4");

        let emoji = plan.emoji.as_ref().unwrap();
        assert_eq!(emoji.format, EmojiFormat::Raw);
        assert_eq!(emoji.fit, Fit::Contain);
        assert_eq!(emoji.size, 64);
        assert_eq!(emoji.custom[0].name, "logo");

        // Light theme falls back to defaults
        assert_eq!(plan.skin.light.background_color, "#ffffff");
        assert_eq!(plan.skin.dark.fit, Fit::Contain);
    }

    #[test]
    fn test_minimal_plan() {
        let plan = parse_plan("chip_model = \"esp32c3\"\n[display]\nwidth = 128\nheight = 64\n")
            .unwrap();
        plan.validate().unwrap();
        assert!(plan.font.is_none());
        assert!(plan.wake_word.is_none());
        assert_eq!(plan.skin.dark.text_color, "#ffffff");
    }

    #[test]
    fn test_bpp3_without_compression_rejected() {
        let content = FULL.replace("bpp = 4", "bpp = 3").replace("compressed = true", "");
        let err = parse_plan(&content).unwrap().validate().unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }

    #[test]
    fn test_font_needs_one_source() {
        let content = FULL.replace(
            "file = \"fonts/NotoSans.ttf\"",
            "file = \"a.ttf\"\npreset = \"font_puhui_16_4\"",
        );
        assert!(parse_plan(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_bad_colour_rejected() {
        let content = FULL.replace("#eeeeee", "white");
        let err = parse_plan(&content).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("skin.dark"));
    }

    #[test]
    fn test_duplicate_emoji_rejected() {
        let content = FULL.replace("name = \"logo\"", "name = \"happy\"");
        assert!(parse_plan(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_long_entry_names_rejected() {
        let long = "x".repeat(40);
        let content = FULL.replace("name = \"logo\"", &format!("name = \"{}\"", long));
        let err = parse_plan(&content).unwrap().validate().unwrap_err();
        assert!(matches!(err, BundleError::Config { stage: Stage::Plan, .. }));

        // 28 characters fit as `.bin` but not with a raw `.jpeg` extension
        let edge = "e".repeat(28);
        let content = FULL.replace("\"sad\"", &format!("\"{}\"", edge));
        assert!(parse_plan(&content).unwrap().validate().is_err());
        let rgb = content.replace("format = \"raw\"", "");
        parse_plan(&rgb).unwrap().validate().unwrap();

        let content = FULL.replace(
            "file = \"fonts/NotoSans.ttf\"",
            &format!("preset = \"font_{}\"", long),
        );
        assert!(parse_plan(&content).unwrap().validate().is_err());

        let content = FULL.replace("wn9_nihaoxiaozhi_tts", &long);
        assert!(parse_plan(&content).unwrap().validate().is_err());
    }

    #[test]
    fn test_reserved_emoji_names_rejected() {
        for reserved in ["srmodels", "index", "background_light", "background_dark", "font_custom_20_4"] {
            let content = FULL.replace("name = \"logo\"", &format!("name = \"{}\"", reserved));
            let err = parse_plan(&content).unwrap().validate().unwrap_err();
            assert!(
                err.to_string().contains("reserved"),
                "{} should be reserved: {}",
                reserved,
                err
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        let err = parse_plan("chip_model = ").unwrap_err();
        assert!(matches!(err, BundleError::Config { stage: Stage::Plan, .. }));
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#1a2B3c"), Some([0x1A, 0x2B, 0x3C]));
        assert_eq!(parse_color("1a2b3c"), None);
        assert_eq!(parse_color("#12345"), None);
    }
}
