//! Wake-word model pack format (`srmodels.bin`)
//!
//! Packs named model directories (WakeNet, MultiNet, ...) verbatim into one
//! indexed blob. Models are sorted by name, files within a model by name.
//!
//! # Layout
//! ```text
//! 0x00: model_count u32 LE
//! per model:
//!   name [u8; 32]
//!   file_count u32 LE
//!   per file: name [u8; 32], start u32 LE (absolute), length u32 LE
//! then every file's bytes, concatenated in (model, file) order
//! ```

use super::serialization::{NAME_LEN, decode_fixed_name, encode_fixed_name, read_u32};
use crate::error::{BundleError, Result, Stage};

/// Metadata file every ESP-SR style model directory carries
pub const MODEL_INFO_FILE: &str = "_MODEL_INFO_";

/// One file of a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ModelFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Model family, which determines the required file set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Wake-word detector (`wn*`)
    WakeNet,
    /// Command-word recognizer (`mn*`)
    MultiNet,
    /// Anything else; packed as-is
    Other,
}

impl ModelKind {
    pub fn of(model_name: &str) -> Self {
        if model_name.starts_with("wn") {
            ModelKind::WakeNet
        } else if model_name.starts_with("mn") {
            ModelKind::MultiNet
        } else {
            ModelKind::Other
        }
    }

    /// Exact file set a model of this kind must supply, if fixed.
    ///
    /// For `wn9_nihaoxiaozhi_tts` this is
    /// `["_MODEL_INFO_", "wn9_data", "wn9_index"]`.
    pub fn required_files(&self, model_name: &str) -> Option<Vec<String>> {
        match self {
            ModelKind::WakeNet | ModelKind::MultiNet => {
                let family = model_name.split('_').next().unwrap_or(model_name);
                Some(vec![
                    MODEL_INFO_FILE.to_string(),
                    format!("{}_data", family),
                    format!("{}_index", family),
                ])
            }
            ModelKind::Other => None,
        }
    }
}

/// A named model and its files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBundle {
    pub name: String,
    pub files: Vec<ModelFile>,
}

impl ModelBundle {
    /// Create a bundle; files are kept sorted by name and must be unique.
    pub fn new(name: impl Into<String>, mut files: Vec<ModelFile>) -> Result<Self> {
        let name = name.into();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(dup) = files.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(BundleError::config(
                Stage::WakeModels,
                &name,
                format!("duplicate model file '{}'", dup[0].name),
            ));
        }
        Ok(Self { name, files })
    }

    pub fn kind(&self) -> ModelKind {
        ModelKind::of(&self.name)
    }

    /// Check the file set against the model kind's contract.
    pub fn validate(&self) -> Result<()> {
        match self.kind().required_files(&self.name) {
            Some(required) => {
                let missing: Vec<&String> = required
                    .iter()
                    .filter(|r| !self.files.iter().any(|f| &f.name == *r))
                    .collect();
                if !missing.is_empty() {
                    return Err(BundleError::missing(
                        Stage::WakeModels,
                        &self.name,
                        format!("model is missing files: {:?}", missing),
                    ));
                }
                if let Some(extra) = self.files.iter().find(|f| !required.contains(&f.name)) {
                    return Err(BundleError::config(
                        Stage::WakeModels,
                        &self.name,
                        format!("unexpected model file '{}'", extra.name),
                    ));
                }
                Ok(())
            }
            None if self.files.is_empty() => Err(BundleError::missing(
                Stage::WakeModels,
                &self.name,
                "model has no files",
            )),
            None => Ok(()),
        }
    }
}

/// Pack models into one indexed blob.
pub fn pack_models(bundles: &[ModelBundle]) -> Result<Vec<u8>> {
    if bundles.is_empty() {
        return Err(BundleError::EmptyBundle {
            stage: Stage::WakeModels,
        });
    }

    let mut ordered: Vec<&ModelBundle> = bundles.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(dup) = ordered.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(BundleError::config(
            Stage::WakeModels,
            &dup[0].name,
            "model declared twice",
        ));
    }
    // Struct literals may carry unsorted or repeated files
    let ordered = ordered
        .into_iter()
        .map(|bundle| {
            bundle.validate()?;
            let mut files: Vec<&ModelFile> = bundle.files.iter().collect();
            files.sort_by(|a, b| a.name.cmp(&b.name));
            if let Some(dup) = files.windows(2).find(|w| w[0].name == w[1].name) {
                return Err(BundleError::config(
                    Stage::WakeModels,
                    &bundle.name,
                    format!("duplicate model file '{}'", dup[0].name),
                ));
            }
            Ok((bundle.name.as_str(), files))
        })
        .collect::<Result<Vec<_>>>()?;

    let header_len: usize = 4 + ordered
        .iter()
        .map(|(_, files)| NAME_LEN + 4 + files.len() * (NAME_LEN + 8))
        .sum::<usize>();
    let data_len: usize = ordered
        .iter()
        .flat_map(|(_, files)| files.iter())
        .map(|f| f.data.len())
        .sum();
    if header_len + data_len > u32::MAX as usize {
        return Err(BundleError::config(
            Stage::WakeModels,
            "models",
            "model pack larger than 4 GiB",
        ));
    }

    let mut out = Vec::with_capacity(header_len + data_len);
    out.extend_from_slice(&(ordered.len() as u32).to_le_bytes());

    let mut start = header_len as u32;
    for (name, files) in &ordered {
        out.extend_from_slice(&encode_fixed_name(name, Stage::WakeModels)?);
        out.extend_from_slice(&(files.len() as u32).to_le_bytes());
        for file in files {
            let len = file.data.len() as u32;
            out.extend_from_slice(&encode_fixed_name(&file.name, Stage::WakeModels)?);
            out.extend_from_slice(&start.to_le_bytes());
            out.extend_from_slice(&len.to_le_bytes());
            start += len;
        }
    }
    debug_assert_eq!(out.len(), header_len);

    for file in ordered.iter().flat_map(|(_, files)| files.iter()) {
        out.extend_from_slice(&file.data);
    }
    Ok(out)
}

/// Read a model pack back through its offset table.
pub fn unpack_models(bytes: &[u8]) -> Result<Vec<ModelBundle>> {
    let malformed = |message: String| BundleError::malformed(Stage::Inspect, "models", message);
    let mut cursor = 0usize;

    let count = read_u32(bytes, cursor).ok_or_else(|| malformed("missing model count".into()))?;
    cursor += 4;

    let mut bundles = Vec::new();
    for _ in 0..count {
        let name_bytes = bytes
            .get(cursor..cursor + NAME_LEN)
            .ok_or_else(|| malformed("truncated model name".into()))?;
        let name = decode_fixed_name(name_bytes);
        cursor += NAME_LEN;

        let file_count = read_u32(bytes, cursor)
            .ok_or_else(|| malformed(format!("truncated file count for '{}'", name)))?;
        cursor += 4;

        let mut files = Vec::new();
        for _ in 0..file_count {
            let file_name = bytes
                .get(cursor..cursor + NAME_LEN)
                .map(decode_fixed_name)
                .ok_or_else(|| malformed(format!("truncated file entry in '{}'", name)))?;
            let start = read_u32(bytes, cursor + NAME_LEN);
            let len = read_u32(bytes, cursor + NAME_LEN + 4);
            cursor += NAME_LEN + 8;

            let (start, len) = start
                .zip(len)
                .ok_or_else(|| malformed(format!("truncated file entry in '{}'", name)))?;
            let data = bytes
                .get(start as usize..start as usize + len as usize)
                .ok_or_else(|| {
                    malformed(format!(
                        "file '{}/{}' at {}+{} is out of bounds",
                        name, file_name, start, len
                    ))
                })?;
            files.push(ModelFile::new(file_name, data.to_vec()));
        }
        bundles.push(ModelBundle { name, files });
    }
    Ok(bundles)
}
