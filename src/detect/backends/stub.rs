use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::detect::result::RawOutput;
use crate::preprocess::InputTensor;

#[derive(Clone, Debug)]
enum StubMode {
    Fixed(RawOutput),
    /// Sigmoid output equal to the mean input value mapped from [-1, 1] to [0, 1].
    Brightness,
    Fail(String),
}

/// Stub backend for testing and for running the pipeline without a model.
pub struct StubBackend {
    mode: StubMode,
    calls: Arc<AtomicUsize>,
}

impl StubBackend {
    pub fn fixed(output: RawOutput) -> Self {
        Self::with_mode(StubMode::Fixed(output))
    }

    pub fn sigmoid(p: f32) -> Self {
        Self::fixed(RawOutput::Sigmoid(p))
    }

    pub fn brightness() -> Self {
        Self::with_mode(StubMode::Brightness)
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_mode(StubMode::Fail(message.into()))
    }

    fn with_mode(mode: StubMode) -> Self {
        Self {
            mode,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter of `run` invocations.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::brightness()
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn run(&self, input: &InputTensor) -> Result<RawOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if input.data().is_empty() {
            return Err(anyhow!("empty input tensor"));
        }

        match &self.mode {
            StubMode::Fixed(output) => Ok(output.clone()),
            StubMode::Brightness => {
                let data = input.data();
                let mean = data.iter().sum::<f32>() / data.len() as f32;
                Ok(RawOutput::Sigmoid(((mean + 1.0) / 2.0).clamp(0.0, 1.0)))
            }
            StubMode::Fail(message) => Err(anyhow!("{}", message)),
        }
    }
}
