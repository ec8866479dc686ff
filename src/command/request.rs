use serde_json::Value;

use crate::config::DEFAULT_THRESHOLD;
use crate::error::DetectError;

/// One `detectVest` call.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectRequest {
    pub image: String,
    /// Validated threshold; `None` means [`DEFAULT_THRESHOLD`].
    pub threshold: Option<f32>,
    pub debug: bool,
}

impl DetectRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            threshold: None,
            debug: false,
        }
    }

    /// Set the decision threshold. Values outside [0, 1] or non-finite are dropped.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = valid_threshold(threshold);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build a request from the host's positional arguments `[image, threshold?, debug?]`.
    ///
    /// The threshold may be a number or a numeric string; anything else falls
    /// back to the default. A missing, non-string or empty image is rejected.
    pub fn from_args(args: &[Value]) -> Result<Self, DetectError> {
        let image = match args.first() {
            Some(Value::String(image)) if !image.trim().is_empty() => image.clone(),
            _ => return Err(DetectError::InvalidInput),
        };
        let threshold = args.get(1).and_then(parse_threshold);
        let debug = matches!(args.get(2), Some(Value::Bool(true)));
        Ok(Self {
            image,
            threshold,
            debug,
        })
    }

    pub fn effective_threshold(&self) -> f32 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }
}

fn parse_threshold(value: &Value) -> Option<f32> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    valid_threshold(raw)
}

fn valid_threshold(raw: f64) -> Option<f32> {
    (raw.is_finite() && (0.0..=1.0).contains(&raw)).then_some(raw as f32)
}
