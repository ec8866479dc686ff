mod backend;
mod backends;
mod decision;
mod result;

pub use backend::InferenceBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use decision::{decide, Comparison, DecisionPolicy};
pub use result::{ClassScore, ClassificationResult, RawOutput};
