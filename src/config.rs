use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{LoadStrategy, ModelSettings};
use crate::detect::{Comparison, DecisionPolicy};
use crate::preprocess::{PreprocessConfig, ResizeFilter, TensorLayout};

pub const DEFAULT_THRESHOLD: f32 = 0.75;
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_MODEL_FILE: &str = "vest_model.onnx";
const DEFAULT_LABELS_FILE: &str = "labels.txt";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize, Default)]
struct VestConfigFile {
    model: Option<ModelConfigFile>,
    preprocess: Option<PreprocessConfigFile>,
    decision: Option<DecisionConfigFile>,
    workers: Option<usize>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    assets_dir: Option<PathBuf>,
    model_file: Option<String>,
    labels_file: Option<String>,
    strategy: Option<LoadStrategy>,
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PreprocessConfigFile {
    input_size: Option<u32>,
    mean: Option<f32>,
    std: Option<f32>,
    layout: Option<TensorLayout>,
    resize_filter: Option<ResizeFilter>,
}

#[derive(Debug, Deserialize, Default)]
struct DecisionConfigFile {
    positive_index: Option<usize>,
    comparison: Option<Comparison>,
}

/// Runtime configuration for a [`crate::VestDetector`].
///
/// `Default` is pinned to the deployed vest model: 224x224 NHWC input,
/// `(byte - 127.5) / 127.5` normalization, sigmoid output with the vest class
/// at index 1, inclusive threshold comparison. The fallback threshold is
/// always [`DEFAULT_THRESHOLD`] and is not configurable.
#[derive(Debug, Clone)]
pub struct VestConfig {
    pub model: ModelSettings,
    pub preprocess: PreprocessConfig,
    pub decision: DecisionPolicy,
    pub workers: usize,
    pub request_timeout: Duration,
}

impl Default for VestConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings {
                assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
                model_file: DEFAULT_MODEL_FILE.to_string(),
                labels_file: DEFAULT_LABELS_FILE.to_string(),
                strategy: LoadStrategy::default(),
                cache_dir: None,
            },
            preprocess: PreprocessConfig::default(),
            decision: DecisionPolicy::default(),
            workers: DEFAULT_WORKERS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl VestConfig {
    /// Load from the file named by `VEST_CONFIG` (if set), then apply `VEST_*`
    /// environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEST_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Same as [`VestConfig::load`] with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VestConfigFile) -> Self {
        let defaults = Self::default();
        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            assets_dir: model_file.assets_dir.unwrap_or(defaults.model.assets_dir),
            model_file: model_file.model_file.unwrap_or(defaults.model.model_file),
            labels_file: model_file.labels_file.unwrap_or(defaults.model.labels_file),
            strategy: model_file.strategy.unwrap_or(defaults.model.strategy),
            cache_dir: model_file.cache_dir,
        };
        let pre = file.preprocess.unwrap_or_default();
        let preprocess = PreprocessConfig {
            input_size: pre.input_size.unwrap_or(defaults.preprocess.input_size),
            mean: pre.mean.unwrap_or(defaults.preprocess.mean),
            std: pre.std.unwrap_or(defaults.preprocess.std),
            layout: pre.layout.unwrap_or(defaults.preprocess.layout),
            resize_filter: pre.resize_filter.unwrap_or(defaults.preprocess.resize_filter),
        };
        let dec = file.decision.unwrap_or_default();
        let decision = DecisionPolicy {
            positive_index: dec
                .positive_index
                .unwrap_or(defaults.decision.positive_index),
            comparison: dec.comparison.unwrap_or(defaults.decision.comparison),
        };
        Self {
            model,
            preprocess,
            decision,
            workers: file.workers.unwrap_or(defaults.workers),
            request_timeout: file
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("VEST_ASSETS_DIR") {
            if !dir.trim().is_empty() {
                self.model.assets_dir = PathBuf::from(dir);
            }
        }
        if let Ok(strategy) = std::env::var("VEST_MODEL_STRATEGY") {
            if !strategy.trim().is_empty() {
                self.model.strategy = strategy.trim().parse()?;
            }
        }
        if let Ok(dir) = std::env::var("VEST_CACHE_DIR") {
            if !dir.trim().is_empty() {
                self.model.cache_dir = Some(PathBuf::from(dir));
            }
        }
        if let Ok(workers) = std::env::var("VEST_WORKERS") {
            self.workers = workers
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEST_WORKERS must be a positive integer"))?;
        }
        if let Ok(timeout) = std::env::var("VEST_REQUEST_TIMEOUT_MS") {
            let millis: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("VEST_REQUEST_TIMEOUT_MS must be an integer number of milliseconds")
            })?;
            self.request_timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        if self.model.model_file.trim().is_empty() {
            return Err(anyhow!("model file name must not be empty"));
        }
        if self.model.labels_file.trim().is_empty() {
            return Err(anyhow!("labels file name must not be empty"));
        }
        if self.workers == 0 {
            return Err(anyhow!("workers must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(anyhow!("request timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VestConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_model() {
        let cfg = VestConfig::default();
        assert_eq!(cfg.preprocess.input_size, 224);
        assert_eq!(cfg.preprocess.mean, 127.5);
        assert_eq!(cfg.preprocess.std, 127.5);
        assert_eq!(cfg.preprocess.layout, TensorLayout::Nhwc);
        assert_eq!(cfg.decision.positive_index, 1);
        assert_eq!(cfg.decision.comparison, Comparison::Inclusive);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let file: VestConfigFile = serde_json::from_str(
            r#"{ "preprocess": { "mean": 128.0, "std": 128.0 }, "workers": 4 }"#,
        )?;
        let cfg = VestConfig::from_file(file);
        assert_eq!(cfg.preprocess.mean, 128.0);
        assert_eq!(cfg.preprocess.std, 128.0);
        assert_eq!(cfg.preprocess.input_size, 224);
        assert_eq!(cfg.workers, 4);
        assert_eq!(cfg.model.model_file, DEFAULT_MODEL_FILE);
        Ok(())
    }

    #[test]
    fn rejects_zero_std() {
        let mut cfg = VestConfig::default();
        cfg.preprocess.std = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = VestConfig::default();
        cfg.workers = 0;
        assert!(cfg.validate().is_err());
    }
}
