//! Bundle orchestration: build plan in, assets container out.
//!
//! [`build_bundle`] runs the stages in a fixed order (font, wake models,
//! images, manifest, container) against an explicit [`BuildContext`]. The
//! context carries the asset source, the font loader, a cancellation token
//! and an optional progress channel. Nothing outlives one call.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;

use assetpack_shared::ASSETS_BUNDLE_FORMAT;
use pack_common::{
    AssetManifest, BundleError, CbinFont, ColorFormat, ContainerEntry, DisplayConfig, EmojiEntry,
    ModelBundle, ModelFile, Result, Skin, SkinTheme, Stage, pack_container, pack_models,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::font::{CharsetTable, FontLoader, build_custom_font};
use crate::image::{convert_image, passthrough_image};
use crate::plan::{BuildPlan, EmojiFormat, EmojiSection, FontSection, ThemeSection, WakeWordSection, parse_color};
use crate::source::{AssetSource, EMOJI_EXTENSIONS, SourceImage};

/// Shared cancellation flag, checked between stages and between glyphs
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once [`cancel`](Self::cancel) has been called
    pub fn check(&self, stage: Stage) -> Result<()> {
        if self.is_cancelled() {
            return Err(BundleError::Cancelled { stage });
        }
        Ok(())
    }
}

/// Progress reported to the caller while a build runs
#[derive(Debug, Clone, PartialEq)]
pub enum BuildEvent {
    StageStarted(Stage),
    /// A container entry is ready
    AssetEncoded { name: String, bytes: usize },
    /// Non-fatal problem (missing glyphs, unreadable preset font)
    Warning(String),
    StageFinished(Stage),
    Finished { entries: usize, bytes: usize },
}

/// Collaborators and controls of one build
pub struct BuildContext<'a> {
    pub source: &'a dyn AssetSource,
    pub font_loader: &'a dyn FontLoader,
    pub cancel: CancelToken,
    pub events: Option<Sender<BuildEvent>>,
}

impl<'a> BuildContext<'a> {
    pub fn new(source: &'a dyn AssetSource, font_loader: &'a dyn FontLoader) -> Self {
        Self {
            source,
            font_loader,
            cancel: CancelToken::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(event);
        }
    }

    fn begin(&self, stage: Stage) -> Result<()> {
        self.cancel.check(stage)?;
        debug!("stage {} started", stage);
        self.emit(BuildEvent::StageStarted(stage));
        Ok(())
    }

    fn finish(&self, stage: Stage) {
        self.emit(BuildEvent::StageFinished(stage));
    }

    fn encoded(&self, entry: &ContainerEntry) {
        debug!("encoded {} ({} bytes)", entry.name, entry.data.len());
        self.emit(BuildEvent::AssetEncoded {
            name: entry.name.clone(),
            bytes: entry.data.len(),
        });
    }

    fn warn(&self, message: String) {
        warn!("{}", message);
        self.emit(BuildEvent::Warning(message));
    }
}

/// Size and dimensions of one packed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySummary {
    pub name: String,
    pub size: usize,
    pub width: u16,
    pub height: u16,
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuiltBundle {
    /// Final container blob
    pub bytes: Vec<u8>,
    pub manifest: AssetManifest,
    /// Entries in input order (the container stores them sorted)
    pub entries: Vec<EntrySummary>,
    /// Requested font codepoints the face could not supply
    pub missing_glyphs: Vec<u32>,
}

impl BuiltBundle {
    /// xxh3-64 fingerprint of the container
    pub fn hash(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(&self.bytes)
    }
}

/// Run a complete build.
///
/// Validates the plan, encodes every declared asset, writes `index.json`
/// and packs everything into one container. Any error aborts the build
/// without a partial blob.
pub fn build_bundle(plan: &BuildPlan, ctx: &BuildContext<'_>) -> Result<BuiltBundle> {
    ctx.begin(Stage::Plan)?;
    plan.validate()?;
    ctx.finish(Stage::Plan);

    let mut entries: Vec<ContainerEntry> = Vec::new();
    let mut missing_glyphs = Vec::new();

    let font_file = match &plan.font {
        Some(section) => {
            ctx.begin(Stage::Font)?;
            let (entry, missing) = encode_font_entry(section, ctx)?;
            missing_glyphs = missing;
            ctx.encoded(&entry);
            let name = entry.name.clone();
            entries.push(entry);
            ctx.finish(Stage::Font);
            Some(name)
        }
        None => None,
    };

    let wake_model_file = match &plan.wake_word {
        Some(section) if !section.models.is_empty() => {
            ctx.begin(Stage::WakeModels)?;
            let entry = pack_wake_models(section, ctx)?;
            ctx.encoded(&entry);
            let name = entry.name.clone();
            entries.push(entry);
            ctx.finish(Stage::WakeModels);
            Some(name)
        }
        _ => None,
    };

    ctx.begin(Stage::Image)?;
    let light = encode_theme("light", &plan.skin.light, plan, ctx, &mut entries)?;
    let dark = encode_theme("dark", &plan.skin.dark, plan, ctx, &mut entries)?;
    let emojis = match &plan.emoji {
        Some(section) => encode_emojis(section, plan, ctx, &mut entries)?,
        None => Vec::new(),
    };
    ctx.finish(Stage::Image);

    ctx.begin(Stage::Manifest)?;
    let manifest = AssetManifest {
        version: ASSETS_BUNDLE_FORMAT.manifest_version,
        chip_model: plan.chip_model.clone(),
        display: DisplayConfig {
            width: plan.display.width,
            height: plan.display.height,
            color_format: ColorFormat::Rgb565.name().to_string(),
        },
        font_file,
        wake_model_file,
        skin: Skin { light, dark },
        emojis,
    };
    let index = ContainerEntry::new(ASSETS_BUNDLE_FORMAT.index_name, manifest.to_json_bytes()?);
    ctx.encoded(&index);
    entries.insert(0, index);
    ctx.finish(Stage::Manifest);

    ctx.begin(Stage::Container)?;
    let bytes = pack_container(&entries)?;
    ctx.finish(Stage::Container);

    info!(
        "Packed {} entries into {} bytes for {}",
        entries.len(),
        bytes.len(),
        plan.chip_model
    );
    ctx.emit(BuildEvent::Finished {
        entries: entries.len(),
        bytes: bytes.len(),
    });

    Ok(BuiltBundle {
        bytes,
        manifest,
        entries: entries
            .into_iter()
            .map(|e| EntrySummary {
                size: e.data.len(),
                name: e.name,
                width: e.width,
                height: e.height,
            })
            .collect(),
        missing_glyphs,
    })
}

/// Fetch a preset font or rasterize the configured face
fn encode_font_entry(section: &FontSection, ctx: &BuildContext<'_>) -> Result<(ContainerEntry, Vec<u32>)> {
    let name = ASSETS_BUNDLE_FORMAT.asset_file_name(&section.asset_stem());

    match (&section.preset, &section.file) {
        (Some(preset), _) => {
            let bytes = ctx.source.fetch_preset_font(preset)?;
            if let Err(e) = CbinFont::parse(&bytes, section.pointer_width()?) {
                ctx.warn(format!("preset font {} did not parse as CBIN: {}", preset, e));
            }
            info!("Font: preset {} ({} bytes)", preset, bytes.len());
            Ok((ContainerEntry::new(name, bytes), Vec::new()))
        }
        (None, Some(file)) => {
            let font_bytes = ctx.source.read_user_file(file)?;
            let codepoints = CharsetTable::new().resolve(section, ctx.source)?;
            let face = ctx.font_loader.load(file, &font_bytes, section.size as f32)?;
            let build = build_custom_font(section, face.as_ref(), &codepoints, &ctx.cancel)?;
            if !build.missing.is_empty() {
                ctx.warn(format!(
                    "{}: {} requested characters have no glyph",
                    file,
                    build.missing.len()
                ));
            }
            info!(
                "Font: {} ({} glyphs, {} kerning pairs, {} bytes)",
                name,
                build.glyph_count,
                build.kerning_pairs,
                build.bytes.len()
            );
            Ok((ContainerEntry::new(name, build.bytes), build.missing))
        }
        (None, None) => Err(BundleError::config(
            Stage::Font,
            "font",
            "neither `preset` nor `file` set",
        )),
    }
}

/// Fetch every declared model and pack them into `srmodels.bin`
fn pack_wake_models(section: &WakeWordSection, ctx: &BuildContext<'_>) -> Result<ContainerEntry> {
    let mut bundles = Vec::with_capacity(section.models.len());
    for model in &section.models {
        ctx.cancel.check(Stage::WakeModels)?;
        let files = ctx
            .source
            .list_model_files(model)?
            .into_iter()
            .map(|file| -> Result<ModelFile> {
                let data = ctx.source.fetch_model_file(model, &file)?;
                Ok(ModelFile::new(file, data))
            })
            .collect::<Result<Vec<_>>>()?;
        let bundle = ModelBundle::new(model.clone(), files)?;
        bundle.validate()?;
        debug!("model {}: {} files", bundle.name, bundle.files.len());
        bundles.push(bundle);
    }

    let bytes = pack_models(&bundles)?;
    info!("Wake models: {} packed ({} bytes)", bundles.len(), bytes.len());
    Ok(ContainerEntry::new(ASSETS_BUNDLE_FORMAT.models_name, bytes))
}

fn theme_color(label: &str, value: &str) -> Result<[u8; 3]> {
    parse_color(value).ok_or_else(|| {
        BundleError::config(
            Stage::Image,
            format!("skin.{}", label),
            format!("invalid colour {:?}", value),
        )
    })
}

/// Convert a theme's background image, if any, at display resolution
fn encode_theme(
    label: &str,
    theme: &ThemeSection,
    plan: &BuildPlan,
    ctx: &BuildContext<'_>,
    entries: &mut Vec<ContainerEntry>,
) -> Result<SkinTheme> {
    let background_image_file = match &theme.background_image {
        Some(path) => {
            ctx.cancel.check(Stage::Image)?;
            let stem = format!("background_{}", label);
            let name = ASSETS_BUNDLE_FORMAT.asset_file_name(&stem);
            let bytes = ctx.source.read_user_file(path)?;
            let image = convert_image(
                &stem,
                &bytes,
                plan.display.width,
                plan.display.height,
                theme.fit,
                theme_color(label, &theme.background_color)?,
            )?;
            let entry = ContainerEntry::with_dimensions(name.clone(), image.data, image.width, image.height);
            ctx.encoded(&entry);
            entries.push(entry);
            Some(name)
        }
        None => None,
    };

    Ok(SkinTheme {
        text_color: theme.text_color.clone(),
        background_color: theme.background_color.clone(),
        background_image_file,
    })
}

fn extension_of(name: &str, file: &str) -> Result<String> {
    let ext = Path::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !EMOJI_EXTENSIONS.contains(&ext.as_str()) {
        return Err(BundleError::config(
            Stage::Image,
            name,
            format!("unsupported image type {:?} (expected png, gif or jpg)", file),
        ));
    }
    Ok(ext)
}

/// Fetch preset and custom emoji in plan order, then convert in parallel
fn encode_emojis(
    section: &EmojiSection,
    plan: &BuildPlan,
    ctx: &BuildContext<'_>,
    entries: &mut Vec<ContainerEntry>,
) -> Result<Vec<EmojiEntry>> {
    let mut inputs: Vec<(String, SourceImage)> = Vec::new();
    if let Some(set) = &section.set {
        for name in &section.names {
            ctx.cancel.check(Stage::Image)?;
            inputs.push((name.clone(), ctx.source.fetch_preset_emoji(set, name)?));
        }
    }
    for custom in &section.custom {
        ctx.cancel.check(Stage::Image)?;
        let extension = extension_of(&custom.name, &custom.file)?;
        let data = ctx.source.read_user_file(&custom.file)?;
        inputs.push((custom.name.clone(), SourceImage { data, extension }));
    }

    // Emoji padding uses the light theme background
    let background = theme_color("light", &plan.skin.light.background_color)?;
    let converted: Vec<ContainerEntry> = inputs
        .into_par_iter()
        .map(|(name, image)| -> Result<ContainerEntry> {
            match section.format {
                EmojiFormat::Rgb565 => {
                    let out = convert_image(
                        &name,
                        &image.data,
                        section.size,
                        section.size,
                        section.fit,
                        background,
                    )?;
                    Ok(ContainerEntry::with_dimensions(
                        ASSETS_BUNDLE_FORMAT.asset_file_name(&name),
                        out.data,
                        out.width,
                        out.height,
                    ))
                }
                EmojiFormat::Raw => {
                    let out = passthrough_image(&name, image.data)?;
                    Ok(ContainerEntry::with_dimensions(
                        format!("{}.{}", name, image.extension),
                        out.data,
                        out.width,
                        out.height,
                    ))
                }
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let names = section
        .set
        .iter()
        .flat_map(|_| section.names.iter())
        .chain(section.custom.iter().map(|c| &c.name));
    let mut manifest_entries = Vec::with_capacity(converted.len());
    for (name, entry) in names.zip(converted) {
        ctx.encoded(&entry);
        manifest_entries.push(EmojiEntry {
            name: name.clone(),
            file: entry.name.clone(),
        });
        entries.push(entry);
    }
    info!("Emoji: {} converted ({:?})", manifest_entries.len(), section.format);
    Ok(manifest_entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::tests::BoxLoader;
    use crate::image::tests::png;
    use crate::plan::parse_plan;
    use hashbrown::HashMap;
    use pack_common::{ImageDescriptor, PointerWidth, unpack_container, unpack_models};
    use std::sync::mpsc;

    #[derive(Default)]
    struct MemorySource {
        models: HashMap<String, Vec<(String, Vec<u8>)>>,
        fonts: HashMap<String, Vec<u8>>,
        emoji: HashMap<String, SourceImage>,
        user: HashMap<String, Vec<u8>>,
    }

    impl AssetSource for MemorySource {
        fn list_model_files(&self, model: &str) -> Result<Vec<String>> {
            self.models
                .get(model)
                .map(|files| files.iter().map(|(n, _)| n.clone()).collect())
                .ok_or_else(|| BundleError::missing(Stage::WakeModels, model, "unknown model"))
        }

        fn fetch_model_file(&self, model: &str, file: &str) -> Result<Vec<u8>> {
            self.models
                .get(model)
                .and_then(|files| files.iter().find(|(n, _)| n == file))
                .map(|(_, data)| data.clone())
                .ok_or_else(|| BundleError::missing(Stage::WakeModels, file, "unknown file"))
        }

        fn fetch_preset_font(&self, name: &str) -> Result<Vec<u8>> {
            self.fonts
                .get(name)
                .cloned()
                .ok_or_else(|| BundleError::missing(Stage::Font, name, "unknown font"))
        }

        fn fetch_preset_emoji(&self, _set: &str, name: &str) -> Result<SourceImage> {
            self.emoji
                .get(name)
                .cloned()
                .ok_or_else(|| BundleError::missing(Stage::Image, name, "unknown emoji"))
        }

        fn read_user_file(&self, path: &str) -> Result<Vec<u8>> {
            self.user
                .get(path)
                .cloned()
                .ok_or_else(|| BundleError::missing(Stage::Plan, path, "unknown file"))
        }
    }

    fn source() -> MemorySource {
        let mut source = MemorySource::default();
        source.models.insert(
            "wn9_hi".to_string(),
            vec![
                ("_MODEL_INFO_".to_string(), b"info".to_vec()),
                ("wn9_data".to_string(), vec![7; 300]),
                ("wn9_index".to_string(), vec![1, 2, 3]),
            ],
        );
        source.emoji.insert(
            "happy".to_string(),
            SourceImage {
                data: png(40, 40, [255, 200, 0, 255]),
                extension: "png".to_string(),
            },
        );
        source.user.insert("f.ttf".to_string(), b"face".to_vec());
        source.user.insert("logo.png".to_string(), png(20, 10, [0, 0, 255, 128]));
        source.user.insert("night.png".to_string(), png(64, 48, [10, 10, 40, 255]));
        source
    }

    const FULL: &str = r##"
chip_model = "esp32s3"

[display]
width = 32
height = 24

[font]
file = "f.ttf"
size = 16
charsets = ["ascii"]
kerning = true

[wake_word]
models = ["wn9_hi"]

[emoji]
set = "twemoji"
names = ["happy"]
size = 16

[[emoji.custom]]
name = "logo"
file = "logo.png"

[skin.dark]
text_color = "#ffffff"
background_color = "#000000"
background_image = "night.png"
"##;

    #[test]
    fn test_full_build() {
        let source = source();
        let plan = parse_plan(FULL).unwrap();
        let ctx = BuildContext::new(&source, &BoxLoader);
        let built = build_bundle(&plan, &ctx).unwrap();

        let container = unpack_container(&built.bytes).unwrap();
        assert_eq!(container.len(), 6);
        for file in built.manifest.referenced_files() {
            assert!(container.find(file).is_some(), "{} not packed", file);
        }

        let index = container.find("index.json").unwrap();
        assert_eq!(AssetManifest::from_json(&index.data).unwrap(), built.manifest);
        assert_eq!(built.manifest.font_file.as_deref(), Some("font_custom_16_4.bin"));
        assert_eq!(built.manifest.wake_model_file.as_deref(), Some("srmodels.bin"));
        assert_eq!(built.manifest.skin.light.background_image_file, None);
        assert_eq!(
            built.manifest.skin.dark.background_image_file.as_deref(),
            Some("background_dark.bin")
        );
        let emoji: Vec<_> = built.manifest.emojis.iter().map(|e| e.file.as_str()).collect();
        assert_eq!(emoji, ["happy.bin", "logo.bin"]);

        let font = container.find("font_custom_16_4.bin").unwrap();
        let parsed = CbinFont::parse(&font.data, PointerWidth::Four).unwrap();
        assert!(parsed.glyph_id(0x41).is_some());
        assert_eq!(built.missing_glyphs.len(), 10);

        let models = unpack_models(&container.find("srmodels.bin").unwrap().data).unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].files.len(), 3);

        let background = container.find("background_dark.bin").unwrap();
        assert_eq!((background.width, background.height), (32, 24));
        let header = ImageDescriptor::from_bytes(&background.data).unwrap();
        assert_eq!(header.color_format, ColorFormat::Rgb565);

        // Transparent custom emoji keeps its alpha plane
        let logo = container.find("logo.bin").unwrap();
        let header = ImageDescriptor::from_bytes(&logo.data).unwrap();
        assert_eq!(header.color_format, ColorFormat::Rgb565A8);
        assert_eq!((logo.width, logo.height), (16, 16));
    }

    #[test]
    fn test_build_is_deterministic() {
        let source = source();
        let plan = parse_plan(FULL).unwrap();
        let ctx = BuildContext::new(&source, &BoxLoader);
        let a = build_bundle(&plan, &ctx).unwrap();
        let b = build_bundle(&plan, &ctx).unwrap();
        assert_eq!(a.bytes, b.bytes);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_minimal_plan_packs_index_only() {
        let source = MemorySource::default();
        let plan = parse_plan("chip_model = \"esp32c3\"\n[display]\nwidth = 128\nheight = 64\n").unwrap();
        let built = build_bundle(&plan, &BuildContext::new(&source, &BoxLoader)).unwrap();

        let container = unpack_container(&built.bytes).unwrap();
        assert_eq!(container.len(), 1);
        assert_eq!(container.entries[0].name, "index.json");
        assert_eq!(built.manifest.display.color_format, "RGB565");
        assert_eq!(built.manifest.skin.dark.background_color, "#121212");
    }

    #[test]
    fn test_raw_emoji_keep_extension() {
        let source = source();
        let plan = parse_plan(
            "chip_model = \"esp32s3\"\n[display]\nwidth = 8\nheight = 8\n\
             [emoji]\nset = \"twemoji\"\nnames = [\"happy\"]\nformat = \"raw\"\n",
        )
        .unwrap();
        let built = build_bundle(&plan, &BuildContext::new(&source, &BoxLoader)).unwrap();

        let container = unpack_container(&built.bytes).unwrap();
        let happy = container.find("happy.png").unwrap();
        assert_eq!((happy.width, happy.height), (40, 40));
        assert_eq!(happy.data, png(40, 40, [255, 200, 0, 255]));
    }

    #[test]
    fn test_preset_font_passthrough() {
        let mut source = source();
        source.fonts.insert("font_puhui_16_4".to_string(), vec![0xAB; 40]);
        let plan = parse_plan(
            "chip_model = \"esp32s3\"\n[display]\nwidth = 8\nheight = 8\n\
             [font]\npreset = \"font_puhui_16_4\"\n",
        )
        .unwrap();
        let (tx, rx) = mpsc::channel();
        let ctx = BuildContext::new(&source, &BoxLoader).with_events(tx);
        let built = build_bundle(&plan, &ctx).unwrap();
        drop(ctx);

        let container = unpack_container(&built.bytes).unwrap();
        assert_eq!(container.find("font_puhui_16_4.bin").unwrap().data, vec![0xAB; 40]);

        // Garbage preset bytes are packed but reported
        let events: Vec<BuildEvent> = rx.iter().collect();
        assert!(events.iter().any(|e| matches!(e, BuildEvent::Warning(_))));
    }

    #[test]
    fn test_events_follow_stages() {
        let source = source();
        let plan = parse_plan(FULL).unwrap();
        let (tx, rx) = mpsc::channel();
        let ctx = BuildContext::new(&source, &BoxLoader).with_events(tx);
        build_bundle(&plan, &ctx).unwrap();
        drop(ctx);

        let events: Vec<BuildEvent> = rx.iter().collect();
        let started: Vec<Stage> = events
            .iter()
            .filter_map(|e| match e {
                BuildEvent::StageStarted(stage) => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            started,
            [
                Stage::Plan,
                Stage::Font,
                Stage::WakeModels,
                Stage::Image,
                Stage::Manifest,
                Stage::Container
            ]
        );
        assert!(matches!(events.last(), Some(BuildEvent::Finished { entries: 6, .. })));
    }

    #[test]
    fn test_cancelled_build() {
        let source = source();
        let plan = parse_plan(FULL).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = BuildContext::new(&source, &BoxLoader).with_cancel(cancel);
        let err = build_bundle(&plan, &ctx).unwrap_err();
        assert!(matches!(err, BundleError::Cancelled { stage: Stage::Plan }));
    }

    #[test]
    fn test_missing_model_aborts() {
        let mut source = source();
        source.models.clear();
        let plan = parse_plan(FULL).unwrap();
        let err = build_bundle(&plan, &BuildContext::new(&source, &BoxLoader)).unwrap_err();
        assert!(matches!(err, BundleError::ResourceMissing { stage: Stage::WakeModels, .. }));
    }

    #[test]
    fn test_incomplete_model_rejected() {
        let mut source = source();
        source
            .models
            .insert("wn9_hi".to_string(), vec![("wn9_data".to_string(), vec![1])]);
        let plan = parse_plan(FULL).unwrap();
        let err = build_bundle(&plan, &BuildContext::new(&source, &BoxLoader)).unwrap_err();
        assert!(matches!(err, BundleError::ResourceMissing { .. }));
    }

    #[test]
    fn test_unsupported_custom_emoji_type() {
        let mut source = source();
        source.user.insert("logo.bmp".to_string(), vec![0; 4]);
        let plan = parse_plan(&FULL.replace("logo.png", "logo.bmp")).unwrap();
        let err = build_bundle(&plan, &BuildContext::new(&source, &BoxLoader)).unwrap_err();
        assert!(matches!(err, BundleError::Config { stage: Stage::Image, .. }));
    }
}
