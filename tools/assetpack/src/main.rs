//! assetpack - device asset bundle builder
//!
//! Converts a font, wake-word models, backgrounds and emoji into one
//! assets container (`assets.bin`) described by an `index.json` manifest.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use assetpack::bundle::{BuildContext, BuildEvent, CancelToken, build_bundle};
use assetpack::font::{CharsetTable, FontLoader, FontdueLoader, build_custom_font};
use assetpack::plan::{Fit, FontSection, load_plan, parse_color};
use assetpack::source::DirectorySource;
use assetpack_shared::{
    ASSETS_BUNDLE_FORMAT, MAX_BUNDLE_BYTES, MAX_FONT_BYTES, MAX_IMAGE_BYTES, MAX_MODEL_FILE_BYTES,
    read_file_with_limit,
};
use pack_common::{
    AssetManifest, CbinFont, ModelBundle, ModelFile, PointerWidth, UnpackedContainer,
    pack_models, unpack_container, unpack_models,
};

#[derive(Parser)]
#[command(name = "assetpack")]
#[command(about = "Device asset bundle builder")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an assets container from a build plan
    Build {
        /// Path to assets.toml build plan
        #[arg(default_value = "assets.toml")]
        plan: PathBuf,

        /// Output container (overrides the plan)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Preset directory (default: `presets` next to the plan)
        #[arg(long)]
        presets: Option<PathBuf>,

        /// Target pointer width for the font (4 or 8, overrides the plan)
        #[arg(long)]
        pointer_width: Option<u8>,
    },

    /// Validate a build plan without building
    Check {
        /// Path to assets.toml build plan
        #[arg(default_value = "assets.toml")]
        plan: PathBuf,
    },

    /// Encode a single TTF/OTF font as CBIN
    Font {
        /// Input font file
        input: PathBuf,

        /// Output .bin file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pixel size
        #[arg(long, default_value_t = 16)]
        size: u16,

        /// Bits per pixel (1, 2, 3, 4 or 8)
        #[arg(long, default_value_t = 4)]
        bpp: u8,

        /// RLE compress glyph bitmaps
        #[arg(long)]
        compressed: bool,

        /// Disable the XOR row prefilter of compressed bitmaps
        #[arg(long)]
        no_prefilter: bool,

        /// Built-in charset (ascii, latin1); repeatable
        #[arg(long = "charset")]
        charsets: Vec<String>,

        /// Text file whose characters are included; repeatable
        #[arg(long = "charset-file")]
        charset_files: Vec<String>,

        /// Codepoint range such as 0x4E00-0x4E10; repeatable
        #[arg(long = "range")]
        ranges: Vec<String>,

        /// Encode pair kerning
        #[arg(long)]
        kerning: bool,

        /// Target pointer width (4 or 8)
        #[arg(long, default_value_t = 4)]
        pointer_width: u8,
    },

    /// Convert a single image to RGB565
    Image {
        /// Input PNG/JPEG/GIF file
        input: PathBuf,

        /// Output .bin file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        width: u16,

        #[arg(long)]
        height: u16,

        #[arg(long, value_enum, default_value_t = Fit::Cover)]
        fit: Fit,

        /// Padding / blend colour (#rrggbb)
        #[arg(long, default_value = "#000000")]
        background: String,
    },

    /// Pack a directory of model directories into srmodels.bin
    Models {
        /// Directory holding one sub-directory per model
        dir: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the contents of an assets container or CBIN font
    Inspect {
        input: PathBuf,

        /// Pointer width the font was encoded for (4 or 8)
        #[arg(long, default_value_t = 4)]
        pointer_width: u8,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            plan,
            output,
            presets,
            pointer_width,
        } => build(&plan, output, presets, pointer_width)?,

        Commands::Check { plan } => {
            tracing::info!("Checking build plan {:?}", plan);
            let config = load_plan(&plan)?;
            config
                .validate()
                .with_context(|| format!("Invalid build plan: {}", plan.display()))?;
            tracing::info!(
                "Plan is valid: font {}, {} wake models, {} emoji",
                config.font.as_ref().map(|f| f.asset_stem()).unwrap_or_else(|| "none".into()),
                config.wake_word.as_ref().map_or(0, |w| w.models.len()),
                config
                    .emoji
                    .as_ref()
                    .map_or(0, |e| e.names.len() + e.custom.len())
            );
        }

        Commands::Font {
            input,
            output,
            size,
            bpp,
            compressed,
            no_prefilter,
            mut charsets,
            charset_files,
            ranges,
            kerning,
            pointer_width,
        } => {
            if charsets.is_empty() && charset_files.is_empty() && ranges.is_empty() {
                charsets.push("ascii".to_string());
            }
            let section = FontSection {
                preset: None,
                file: Some(input.display().to_string()),
                size,
                bpp,
                compressed,
                prefilter: !no_prefilter,
                charsets,
                charset_files,
                ranges,
                kerning,
                pointer_width,
            };
            let output = output.unwrap_or_else(|| input.with_extension(ASSETS_BUNDLE_FORMAT.asset_ext));
            tracing::info!("Converting {:?} -> {:?}", input, output);
            encode_font_file(&input, &output, &section)?;
            tracing::info!("Done!");
        }

        Commands::Image {
            input,
            output,
            width,
            height,
            fit,
            background,
        } => {
            let output = output.unwrap_or_else(|| input.with_extension(ASSETS_BUNDLE_FORMAT.asset_ext));
            tracing::info!("Converting {:?} -> {:?}", input, output);
            let background = parse_color(&background)
                .with_context(|| format!("Invalid background colour {:?} (expected #rrggbb)", background))?;
            let bytes = read_file_with_limit(&input, MAX_IMAGE_BYTES)?;
            let name = file_stem(&input);
            let image = assetpack::image::convert_image(&name, &bytes, width, height, fit, background)?;
            std::fs::write(&output, &image.data)
                .with_context(|| format!("Failed to write image: {}", output.display()))?;
            tracing::info!("Done! {}x{}, {} bytes", image.width, image.height, image.data.len());
        }

        Commands::Models { dir, output } => {
            let output = output.unwrap_or_else(|| PathBuf::from(ASSETS_BUNDLE_FORMAT.models_name));
            tracing::info!("Packing models in {:?} -> {:?}", dir, output);
            let bundles = load_model_dir(&dir)?;
            let bytes = pack_models(&bundles)?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write model pack: {}", output.display()))?;
            tracing::info!("Done! {} models, {} bytes", bundles.len(), bytes.len());
        }

        Commands::Inspect {
            input,
            pointer_width,
        } => inspect(&input, pointer_width)?,
    }

    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn build(
    plan_path: &Path,
    output: Option<PathBuf>,
    presets: Option<PathBuf>,
    pointer_width: Option<u8>,
) -> Result<()> {
    let mut plan = load_plan(plan_path)?;
    if let (Some(width), Some(font)) = (pointer_width, plan.font.as_mut()) {
        font.pointer_width = width;
    }

    let plan_dir = plan_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let presets = presets.unwrap_or_else(|| plan_dir.join("presets"));
    let output = output.unwrap_or_else(|| match &plan.output.path {
        Some(path) => plan_dir.join(path),
        None => plan_dir.join(format!("assets.{}", ASSETS_BUNDLE_FORMAT.extension)),
    });
    tracing::info!("Building {:?} for {}", plan_path, plan.chip_model);

    let source = DirectorySource::new(presets, plan_dir);
    let (tx, rx) = mpsc::channel();
    let reporter = thread::spawn(move || {
        for event in rx {
            match event {
                BuildEvent::StageStarted(stage) => tracing::debug!("[{}]", stage),
                BuildEvent::AssetEncoded { name, bytes } => {
                    tracing::info!("  {} ({} bytes)", name, bytes)
                }
                _ => {}
            }
        }
    });

    let built = {
        let ctx = BuildContext::new(&source, &FontdueLoader).with_events(tx);
        build_bundle(&plan, &ctx)
    };
    // The sender went away with the context
    let _ = reporter.join();
    let built = built.with_context(|| format!("Failed to build {}", plan_path.display()))?;

    std::fs::write(&output, &built.bytes)
        .with_context(|| format!("Failed to write bundle: {}", output.display()))?;

    tracing::info!(
        "Created {} ({} bytes, {} entries, xxh3 {:016x})",
        output.display(),
        built.bytes.len(),
        built.entries.len(),
        built.hash()
    );
    if !built.missing_glyphs.is_empty() {
        tracing::warn!("{} requested characters had no glyph", built.missing_glyphs.len());
    }
    Ok(())
}

fn encode_font_file(input: &Path, output: &Path, section: &FontSection) -> Result<()> {
    section.validate()?;
    let bytes = read_file_with_limit(input, MAX_FONT_BYTES)?;
    let name = input.display().to_string();
    let face = FontdueLoader.load(&name, &bytes, section.size as f32)?;

    // Charset files resolve against the working directory
    let source = DirectorySource::new(".", ".");
    let codepoints = CharsetTable::new().resolve(section, &source)?;
    let build = build_custom_font(section, face.as_ref(), &codepoints, &CancelToken::new())?;

    std::fs::write(output, &build.bytes)
        .with_context(|| format!("Failed to write font: {}", output.display()))?;
    tracing::info!(
        "{} glyphs ({} missing), {} kerning pairs, {} bytes",
        build.glyph_count,
        build.missing.len(),
        build.kerning_pairs,
        build.bytes.len()
    );
    Ok(())
}

/// One model per sub-directory, files taken from its top level
fn load_model_dir(dir: &Path) -> Result<Vec<ModelBundle>> {
    let mut bundles = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let mut files = Vec::new();
        for file in WalkDir::new(entry.path()).min_depth(1).max_depth(1).sort_by_file_name() {
            let file = file?;
            if file.file_type().is_file() {
                let data = read_file_with_limit(file.path(), MAX_MODEL_FILE_BYTES)?;
                files.push(ModelFile::new(file.file_name().to_string_lossy().into_owned(), data));
            }
        }
        bundles.push(ModelBundle::new(entry.file_name().to_string_lossy().into_owned(), files)?);
    }
    if bundles.is_empty() {
        anyhow::bail!("No model directories in {}", dir.display());
    }
    Ok(bundles)
}

fn inspect(input: &Path, pointer_width: u8) -> Result<()> {
    let width = PointerWidth::from_bytes(pointer_width as usize)
        .with_context(|| format!("Invalid pointer width {} (expected 4 or 8)", pointer_width))?;
    let bytes = read_file_with_limit(input, MAX_BUNDLE_BYTES)?;

    match unpack_container(&bytes) {
        Ok(container) => print_container(&container, width),
        Err(container_err) => {
            let font = CbinFont::parse(&bytes, width).map_err(|font_err| {
                anyhow!(
                    "{} is neither an assets container ({}) nor a CBIN font ({})",
                    input.display(),
                    container_err,
                    font_err
                )
            })?;
            println!("{}", input.display());
            print_font(&font);
            Ok(())
        }
    }
}

fn print_container(container: &UnpackedContainer, width: PointerWidth) -> Result<()> {
    println!(
        "{} entries, checksum {:#06x}",
        container.len(),
        container.checksum
    );
    for entry in &container.entries {
        if entry.width > 0 || entry.height > 0 {
            println!(
                "  {:<32} {:>10} bytes  {}x{}",
                entry.name,
                entry.data.len(),
                entry.width,
                entry.height
            );
        } else {
            println!("  {:<32} {:>10} bytes", entry.name, entry.data.len());
        }
    }

    let Some(index) = container.find(ASSETS_BUNDLE_FORMAT.index_name) else {
        println!("(no {})", ASSETS_BUNDLE_FORMAT.index_name);
        return Ok(());
    };
    let manifest = AssetManifest::from_json(&index.data)?;
    println!();
    println!(
        "Chip {}, display {}x{} {}",
        manifest.chip_model,
        manifest.display.width,
        manifest.display.height,
        manifest.display.color_format
    );
    for file in manifest.referenced_files() {
        if container.find(file).is_none() {
            println!("  missing: {}", file);
        }
    }

    if let Some(entry) = manifest.font_file.as_deref().and_then(|f| container.find(f)) {
        println!("Font {}:", entry.name);
        match CbinFont::parse(&entry.data, width) {
            Ok(font) => print_font(&font),
            Err(e) => println!("  unreadable: {}", e),
        }
    }
    if let Some(entry) = manifest.wake_model_file.as_deref().and_then(|f| container.find(f)) {
        for model in unpack_models(&entry.data)? {
            let files: Vec<&str> = model.files.iter().map(|f| f.name.as_str()).collect();
            println!("Model {}: {}", model.name, files.join(", "));
        }
    }
    if !manifest.emojis.is_empty() {
        let names: Vec<&str> = manifest.emojis.iter().map(|e| e.name.as_str()).collect();
        println!("Emoji: {}", names.join(", "));
    }
    Ok(())
}

fn print_font(font: &CbinFont<'_>) {
    println!(
        "  {} glyphs, line height {}, base line {}, {} bpp, {:?} bitmaps",
        font.glyph_count(),
        font.line_height,
        font.base_line,
        font.bpp.bits(),
        font.bitmap_format
    );
    let cmaps: Vec<String> = font
        .cmaps()
        .iter()
        .map(|c| format!("U+{:04X}+{} {}", c.min_code, c.range_length, c.format().name()))
        .collect();
    println!("  cmaps: {}", cmaps.join(", "));
    println!("  kerning pairs: {}", font.kerning_pair_count());
}
