use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use memmap2::Mmap;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::AssetDir;
use crate::error::DetectError;

/// How the model asset is brought into memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStrategy {
    /// Map the asset file read-only in place.
    #[default]
    Mapped,
    /// Copy the asset to a scratch file, then map the copy.
    /// Used where assets are not directly mappable (compressed bundles).
    CachedCopy,
    /// Read the whole asset into an owned buffer.
    Buffered,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStrategy::Mapped => "mapped",
            LoadStrategy::CachedCopy => "cached_copy",
            LoadStrategy::Buffered => "buffered",
        };
        f.write_str(name)
    }
}

impl FromStr for LoadStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mapped" | "map" => Ok(LoadStrategy::Mapped),
            "cached_copy" | "cache" => Ok(LoadStrategy::CachedCopy),
            "buffered" | "buffer" => Ok(LoadStrategy::Buffered),
            other => Err(anyhow!(
                "unknown model load strategy '{}' (expected mapped, cached_copy or buffered)",
                other
            )),
        }
    }
}

enum ModelBytes {
    Mapped(Mmap),
    // Field order matters: the mapping is dropped before the scratch file is removed.
    CachedCopy { map: Mmap, scratch: NamedTempFile },
    Buffered(Vec<u8>),
}

/// Loaded model bytes.
///
/// For `CachedCopy` the scratch file lives exactly as long as this value.
pub struct ModelAsset {
    name: String,
    bytes: ModelBytes,
    digest: String,
}

impl fmt::Debug for ModelAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelAsset")
            .field("name", &self.name)
            .field("strategy", &self.strategy())
            .field("len", &self.len())
            .field("digest", &self.digest)
            .finish()
    }
}

impl ModelAsset {
    pub fn load(
        assets: &AssetDir,
        name: &str,
        strategy: LoadStrategy,
        cache_dir: Option<&Path>,
    ) -> Result<Self, DetectError> {
        let mut file = assets.open(name)?;
        let len = file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| DetectError::Load(format!("failed to stat {}: {}", name, e)))?;
        if len == 0 {
            return Err(DetectError::Load(format!("model asset {} is empty", name)));
        }

        let bytes = match strategy {
            LoadStrategy::Mapped => ModelBytes::Mapped(map_file(&file).map_err(DetectError::load)?),
            LoadStrategy::CachedCopy => {
                let scratch_dir = cache_dir
                    .map(Path::to_path_buf)
                    .unwrap_or_else(std::env::temp_dir);
                let scratch =
                    copy_to_scratch(&mut file, &scratch_dir).map_err(DetectError::load)?;
                log::debug!("model {} copied to {}", name, scratch.path().display());
                let map = map_file(scratch.as_file()).map_err(DetectError::load)?;
                ModelBytes::CachedCopy { map, scratch }
            }
            LoadStrategy::Buffered => {
                let mut buf = Vec::with_capacity(len as usize);
                file.read_to_end(&mut buf)
                    .map_err(|e| DetectError::Load(format!("failed to read {}: {}", name, e)))?;
                ModelBytes::Buffered(buf)
            }
        };

        Ok(Self::with_bytes(name, bytes))
    }

    /// Wrap bytes that are already in memory (embedded models, tests).
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_bytes(name, ModelBytes::Buffered(bytes))
    }

    fn with_bytes(name: impl Into<String>, bytes: ModelBytes) -> Self {
        let digest = {
            let slice: &[u8] = match &bytes {
                ModelBytes::Mapped(map) => &map[..],
                ModelBytes::CachedCopy { map, .. } => &map[..],
                ModelBytes::Buffered(buf) => buf.as_slice(),
            };
            hex::encode(Sha256::digest(slice))
        };
        Self {
            name: name.into(),
            bytes,
            digest,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.bytes {
            ModelBytes::Mapped(map) => &map[..],
            ModelBytes::CachedCopy { map, .. } => &map[..],
            ModelBytes::Buffered(buf) => buf.as_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Hex SHA-256 of the model bytes.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn strategy(&self) -> LoadStrategy {
        match self.bytes {
            ModelBytes::Mapped(_) => LoadStrategy::Mapped,
            ModelBytes::CachedCopy { .. } => LoadStrategy::CachedCopy,
            ModelBytes::Buffered(_) => LoadStrategy::Buffered,
        }
    }

    /// Location of the scratch copy, if one exists.
    pub fn scratch_path(&self) -> Option<PathBuf> {
        match &self.bytes {
            ModelBytes::CachedCopy { scratch, .. } => Some(scratch.path().to_path_buf()),
            _ => None,
        }
    }
}

fn map_file(file: &File) -> Result<Mmap> {
    // SAFETY: asset and scratch files are read-only for the lifetime of the
    // process; nothing in this crate writes to a file after it is mapped.
    let map = unsafe { Mmap::map(file) }.context("failed to memory-map model")?;
    Ok(map)
}

fn copy_to_scratch(src: &mut File, dir: &Path) -> Result<NamedTempFile> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create cache dir {}", dir.display()))?;
    let mut scratch = tempfile::Builder::new()
        .prefix("vest_model-")
        .suffix(".bin")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create scratch file in {}", dir.display()))?;
    std::io::copy(src, scratch.as_file_mut()).context("failed to copy model to scratch file")?;
    scratch
        .as_file_mut()
        .flush()
        .context("failed to flush scratch file")?;
    Ok(scratch)
}
