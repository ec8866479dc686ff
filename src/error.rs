use thiserror::Error;

/// Caller-visible failures.
///
/// The per-request messages are part of the `detectVest` contract and are
/// returned to the host verbatim.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("failed to load model: {0}")]
    Load(String),

    #[error("Invalid base64 image provided")]
    InvalidInput,

    #[error("Failed to decode base64 image")]
    Decode,

    #[error("Model not initialized")]
    NotReady,

    #[error("Classification failed")]
    Classification,

    #[error("Error during detection: {0}")]
    Inference(String),
}

impl DetectError {
    /// Startup failures leave the detector permanently unready.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DetectError::AssetNotFound(_) | DetectError::Load(_))
    }

    pub(crate) fn load(err: anyhow::Error) -> Self {
        DetectError::Load(format!("{:#}", err))
    }

    pub(crate) fn inference(err: anyhow::Error) -> Self {
        DetectError::Inference(format!("{:#}", err))
    }
}
