use anyhow::Result;

use crate::preprocess::InputTensor;

use super::result::RawOutput;

/// Inference backend trait.
///
/// A backend owns one loaded model and is shared read-only by every worker,
/// so `run` takes `&self` and implementations must not need a lock to execute.
/// Implementations must treat the input tensor as ephemeral.
pub trait InferenceBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run one forward pass.
    fn run(&self, input: &InputTensor) -> Result<RawOutput>;

    /// Optional warm-up hook, called once after the model is loaded.
    fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}
