//! Safety-vest presence classifier.
//!
//! This crate exposes an on-device binary image classifier behind a single
//! `detectVest` command: a base64 photo goes in, a detection flag plus
//! per-class confidences come out.
//!
//! # Pipeline
//!
//! 1. **Decode**: strip an optional data-URI header, base64-decode, decode the image.
//! 2. **Preprocess**: resize to the model's square input and normalize to `f32`.
//! 3. **Infer**: one forward pass on the shared, read-only model.
//! 4. **Decide**: map sigmoid or class-vector output to labeled confidences and
//!    compare the positive class against the caller's threshold.
//!
//! # Module Structure
//!
//! - `assets`: Model store (model bytes via mapping/cache copy/buffer, label list)
//! - `preprocess`: Resize and normalization into an input tensor
//! - `detect`: Inference backends and the decision layer
//! - `command`: `VestDetector` lifecycle and request dispatch
//! - `worker`: Background worker pool with one-shot result handles
//! - `config`: JSON file + environment configuration

pub mod assets;
pub mod command;
pub mod config;
pub mod detect;
pub mod error;
pub mod preprocess;
pub mod worker;

pub use assets::{AssetDir, LabelList, LoadStrategy, ModelAsset, ModelSettings, ModelStore};
pub use command::{decode_image, DetectRequest, DetectResponse, PendingDetection, VestDetector};
pub use config::{VestConfig, DEFAULT_THRESHOLD};
pub use detect::{
    decide, ClassScore, ClassificationResult, Comparison, DecisionPolicy, InferenceBackend,
    RawOutput, StubBackend,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use error::DetectError;
pub use preprocess::{preprocess, InputTensor, PreprocessConfig, ResizeFilter, TensorLayout};
