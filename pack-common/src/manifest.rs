//! `index.json` manifest written as the first entry of every bundle.
//!
//! A pure value object built once per build. Keys are snake_case; optional
//! fields are omitted when absent.

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result, Stage};

/// Display configuration the assets were generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    /// Pixel format of converted images (e.g. "RGB565")
    pub color_format: String,
}

/// Colours and background for one theme
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkinTheme {
    /// `#rrggbb`
    pub text_color: String,
    /// `#rrggbb`
    pub background_color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Skin {
    pub light: SkinTheme,
    pub dark: SkinTheme,
}

/// One emoji image in the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmojiEntry {
    pub name: String,
    pub file: String,
}

/// Bundle manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub version: u32,
    pub chip_model: String,
    pub display: DisplayConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_model_file: Option<String>,
    #[serde(default)]
    pub skin: Skin,
    #[serde(default)]
    pub emojis: Vec<EmojiEntry>,
}

impl AssetManifest {
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| {
            BundleError::malformed(Stage::Manifest, "index.json", e.to_string())
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BundleError::malformed(Stage::Manifest, "index.json", e.to_string()))
    }

    /// Every file name the manifest points at
    pub fn referenced_files(&self) -> Vec<&str> {
        let mut files: Vec<&str> = Vec::new();
        files.extend(self.font_file.as_deref());
        files.extend(self.wake_model_file.as_deref());
        for theme in [&self.skin.light, &self.skin.dark] {
            files.extend(theme.background_image_file.as_deref());
        }
        files.extend(self.emojis.iter().map(|e| e.file.as_str()));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssetManifest {
        AssetManifest {
            version: 1,
            chip_model: "esp32s3".to_string(),
            display: DisplayConfig {
                width: 320,
                height: 240,
                color_format: "RGB565".to_string(),
            },
            font_file: Some("font_puhui_16_4.bin".to_string()),
            wake_model_file: None,
            skin: Skin {
                light: SkinTheme {
                    text_color: "#000000".to_string(),
                    background_color: "#ffffff".to_string(),
                    background_image_file: None,
                },
                dark: SkinTheme {
                    text_color: "#ffffff".to_string(),
                    background_color: "#121212".to_string(),
                    background_image_file: Some("background_dark.bin".to_string()),
                },
            },
            emojis: vec![EmojiEntry {
                name: "happy".to_string(),
                file: "happy.bin".to_string(),
            }],
        }
    }

    #[test]
    fn test_json_keys() {
        let json = String::from_utf8(sample().to_json_bytes().unwrap()).unwrap();
        assert!(json.contains("\"chip_model\": \"esp32s3\""));
        assert!(json.contains("\"color_format\": \"RGB565\""));
        assert!(json.contains("\"background_image_file\": \"background_dark.bin\""));
        // Absent optionals are omitted
        assert!(!json.contains("wake_model_file"));
    }

    #[test]
    fn test_json_roundtrip() {
        let manifest = sample();
        let parsed = AssetManifest::from_json(&manifest.to_json_bytes().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_referenced_files() {
        assert_eq!(
            sample().referenced_files(),
            vec!["font_puhui_16_4.bin", "background_dark.bin", "happy.bin"]
        );
    }

    #[test]
    fn test_invalid_json() {
        let err = AssetManifest::from_json(b"{").unwrap_err();
        assert!(matches!(
            err,
            BundleError::Malformed {
                stage: Stage::Manifest,
                ..
            }
        ));
    }
}
