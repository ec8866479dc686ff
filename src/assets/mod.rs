//! Model store.
//!
//! Bundled assets are read-only files under a single directory:
//! - the model graph (mapped, copied to scratch then mapped, or buffered)
//! - a newline-delimited label list, index-aligned with the model output
//!
//! Both are loaded once, before any request is served. A missing asset or a
//! rejected model is fatal to initialization.

mod labels;
mod model;

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::DetectError;

pub use labels::LabelList;
pub use model::{LoadStrategy, ModelAsset};

/// Where the model and labels come from and how the model is brought into memory.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub assets_dir: PathBuf,
    pub model_file: String,
    pub labels_file: String,
    pub strategy: LoadStrategy,
    /// Scratch directory for `LoadStrategy::CachedCopy`. System temp dir when unset.
    pub cache_dir: Option<PathBuf>,
}

/// Read-only asset directory.
#[derive(Debug, Clone)]
pub struct AssetDir {
    root: PathBuf,
}

impl AssetDir {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an asset name. Names are plain file names; anything that would
    /// escape the asset directory is treated as absent.
    pub fn path(&self, name: &str) -> Result<PathBuf, DetectError> {
        let candidate = Path::new(name);
        let plain = candidate.components().count() == 1
            && candidate.file_name().is_some_and(|f| f == candidate.as_os_str());
        if !plain {
            return Err(DetectError::AssetNotFound(name.to_string()));
        }
        Ok(self.root.join(candidate))
    }

    pub fn open(&self, name: &str) -> Result<File, DetectError> {
        let path = self.path(name)?;
        File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DetectError::AssetNotFound(name.to_string()),
            _ => DetectError::Load(format!("failed to open {}: {}", path.display(), e)),
        })
    }

    pub fn read_to_string(&self, name: &str) -> Result<String, DetectError> {
        let path = self.path(name)?;
        std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DetectError::AssetNotFound(name.to_string()),
            _ => DetectError::Load(format!("failed to read {}: {}", path.display(), e)),
        })
    }
}

pub struct ModelStore;

impl ModelStore {
    /// Load the model bytes and the label list described by `settings`.
    pub fn load(settings: &ModelSettings) -> Result<(ModelAsset, LabelList), DetectError> {
        let assets = AssetDir::new(&settings.assets_dir);
        log::info!(
            "loading model {} from {} ({})",
            settings.model_file,
            assets.root().display(),
            settings.strategy
        );

        let model = ModelAsset::load(
            &assets,
            &settings.model_file,
            settings.strategy,
            settings.cache_dir.as_deref(),
        )?;
        log::info!(
            "model {} ready: {} bytes, sha256={}",
            model.name(),
            model.len(),
            model.digest()
        );

        let labels = LabelList::parse(&assets.read_to_string(&settings.labels_file)?);
        if labels.is_empty() {
            log::warn!("label file {} has no labels", settings.labels_file);
        } else {
            log::info!("labels loaded: {:?}", labels.as_slice());
        }

        Ok((model, labels))
    }
}
