//! Asset sources the orchestrator fetches inputs from.
//!
//! Downloads, caches and upload storage live outside the pipeline; the
//! orchestrator only sees the [`AssetSource`] trait. [`DirectorySource`]
//! serves presets and user files from local directories:
//!
//! ```text
//! <presets>/models/<model>/<file>
//! <presets>/fonts/<name>.bin
//! <presets>/emoji/<set>/<name>.{png,gif,jpg,jpeg}
//! <user>/<relative path>
//! ```

use std::path::{Path, PathBuf};

use assetpack_shared::{MAX_FONT_BYTES, MAX_IMAGE_BYTES, MAX_MODEL_FILE_BYTES, read_file_with_limit};
use pack_common::{BundleError, Result, Stage};
use walkdir::WalkDir;

/// Image extensions accepted for preset emoji, in lookup order
pub const EMOJI_EXTENSIONS: [&str; 4] = ["png", "gif", "jpg", "jpeg"];

/// An emoji image as fetched, with the extension of its encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub data: Vec<u8>,
    pub extension: String,
}

/// Provider of every external input of a build
pub trait AssetSource: Send + Sync {
    /// Names of the files a wake-word model consists of
    fn list_model_files(&self, model: &str) -> Result<Vec<String>>;

    fn fetch_model_file(&self, model: &str, file: &str) -> Result<Vec<u8>>;

    /// Prebuilt CBIN font bytes
    fn fetch_preset_font(&self, name: &str) -> Result<Vec<u8>>;

    fn fetch_preset_emoji(&self, set: &str, name: &str) -> Result<SourceImage>;

    /// A user-supplied file (font, image, charset text)
    fn read_user_file(&self, path: &str) -> Result<Vec<u8>>;
}

/// Serves presets and user files from two directories
#[derive(Debug, Clone)]
pub struct DirectorySource {
    presets: PathBuf,
    user: PathBuf,
}

impl DirectorySource {
    pub fn new(presets: impl Into<PathBuf>, user: impl Into<PathBuf>) -> Self {
        Self {
            presets: presets.into(),
            user: user.into(),
        }
    }

    fn read(path: &Path, limit: u64, stage: Stage, asset: &str) -> Result<Vec<u8>> {
        if !path.is_file() {
            return Err(BundleError::missing(
                stage,
                asset,
                format!("{} does not exist", path.display()),
            ));
        }
        read_file_with_limit(path, limit)
            .map_err(|e| BundleError::missing(stage, asset, format!("{:#}", e)))
    }
}

/// Reject path components that would escape the source root
fn check_relative(stage: Stage, value: &str) -> Result<()> {
    let path = Path::new(value);
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
    if escapes || value.is_empty() {
        return Err(BundleError::config(
            stage,
            value,
            "path must be relative and stay inside its source directory",
        ));
    }
    Ok(())
}

impl AssetSource for DirectorySource {
    fn list_model_files(&self, model: &str) -> Result<Vec<String>> {
        check_relative(Stage::WakeModels, model)?;
        let dir = self.presets.join("models").join(model);
        if !dir.is_dir() {
            return Err(BundleError::missing(
                Stage::WakeModels,
                model,
                format!("model directory {} does not exist", dir.display()),
            ));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| BundleError::missing(Stage::WakeModels, model, e.to_string()))?;
            if entry.file_type().is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    fn fetch_model_file(&self, model: &str, file: &str) -> Result<Vec<u8>> {
        check_relative(Stage::WakeModels, model)?;
        check_relative(Stage::WakeModels, file)?;
        let path = self.presets.join("models").join(model).join(file);
        Self::read(
            &path,
            MAX_MODEL_FILE_BYTES,
            Stage::WakeModels,
            &format!("{}/{}", model, file),
        )
    }

    fn fetch_preset_font(&self, name: &str) -> Result<Vec<u8>> {
        check_relative(Stage::Font, name)?;
        let path = self.presets.join("fonts").join(format!("{}.bin", name));
        Self::read(&path, MAX_FONT_BYTES, Stage::Font, name)
    }

    fn fetch_preset_emoji(&self, set: &str, name: &str) -> Result<SourceImage> {
        check_relative(Stage::Image, set)?;
        check_relative(Stage::Image, name)?;
        let dir = self.presets.join("emoji").join(set);
        for ext in EMOJI_EXTENSIONS {
            let path = dir.join(format!("{}.{}", name, ext));
            if path.is_file() {
                return Ok(SourceImage {
                    data: Self::read(&path, MAX_IMAGE_BYTES, Stage::Image, name)?,
                    extension: ext.to_string(),
                });
            }
        }
        Err(BundleError::missing(
            Stage::Image,
            name,
            format!("no image for emoji '{}' in set '{}'", name, set),
        ))
    }

    fn read_user_file(&self, path: &str) -> Result<Vec<u8>> {
        check_relative(Stage::Plan, path)?;
        let full = self.user.join(path);
        let limit = MAX_FONT_BYTES.max(MAX_IMAGE_BYTES);
        Self::read(&full, limit, Stage::Plan, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_model_listing() {
        let dir = tempdir().unwrap();
        let model = dir.path().join("models/wn9_hi");
        std::fs::create_dir_all(&model).unwrap();
        std::fs::write(model.join("wn9_index"), b"i").unwrap();
        std::fs::write(model.join("_MODEL_INFO_"), b"m").unwrap();
        std::fs::create_dir(model.join("nested")).unwrap();

        let source = DirectorySource::new(dir.path(), dir.path());
        assert_eq!(
            source.list_model_files("wn9_hi").unwrap(),
            vec!["_MODEL_INFO_".to_string(), "wn9_index".to_string()]
        );
        assert_eq!(source.fetch_model_file("wn9_hi", "wn9_index").unwrap(), b"i");
    }

    #[test]
    fn test_missing_resources() {
        let dir = tempdir().unwrap();
        let source = DirectorySource::new(dir.path(), dir.path());

        let err = source.list_model_files("wn9_none").unwrap_err();
        assert!(matches!(err, BundleError::ResourceMissing { .. }));
        let err = source.fetch_preset_font("font_none").unwrap_err();
        assert!(matches!(err, BundleError::ResourceMissing { stage: Stage::Font, .. }));
        let err = source.fetch_preset_emoji("twemoji_64", "happy").unwrap_err();
        assert!(matches!(err, BundleError::ResourceMissing { stage: Stage::Image, .. }));
    }

    #[test]
    fn test_emoji_extension_lookup() {
        let dir = tempdir().unwrap();
        let set = dir.path().join("emoji/twemoji_64");
        std::fs::create_dir_all(&set).unwrap();
        std::fs::write(set.join("happy.gif"), b"GIF89a").unwrap();

        let source = DirectorySource::new(dir.path(), dir.path());
        let image = source.fetch_preset_emoji("twemoji_64", "happy").unwrap();
        assert_eq!(image.extension, "gif");
        assert_eq!(image.data, b"GIF89a");
    }

    #[test]
    fn test_user_paths_stay_inside() {
        let dir = tempdir().unwrap();
        let source = DirectorySource::new(dir.path(), dir.path());
        let err = source.read_user_file("../secret.txt").unwrap_err();
        assert!(matches!(err, BundleError::Config { .. }));
    }
}
