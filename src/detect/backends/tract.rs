#![cfg(feature = "backend-tract")]

use std::fmt::Write;
use std::io::Cursor;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::assets::ModelAsset;
use crate::detect::backend::InferenceBackend;
use crate::detect::result::RawOutput;
use crate::preprocess::{InputTensor, PreprocessConfig};

type RunnableModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based backend for ONNX classifiers.
///
/// The graph is built from in-memory model bytes, so it works the same for
/// mapped, cached and buffered assets. The plan is immutable after load and
/// `run` only needs `&self`.
pub struct TractBackend {
    model: RunnableModel,
    shape: [usize; 4],
}

impl TractBackend {
    /// Parse the model bytes and prepare an optimized plan for the configured input shape.
    ///
    /// Falls back to a decluttered (unoptimized) plan when optimization fails.
    pub fn from_asset(asset: &ModelAsset, preprocess: &PreprocessConfig) -> Result<Self> {
        let shape = preprocess.shape();
        let model = match build_plan(asset, shape, true) {
            Ok(model) => model,
            Err(opt_err) => {
                let mut chain = String::new();
                for cause in opt_err.chain() {
                    let _ = writeln!(&mut chain, "  - {cause}");
                }
                log::warn!(
                    "model {} failed optimized load; falling back to decluttered graph\n{}",
                    asset.name(),
                    chain.trim_end()
                );
                build_plan(asset, shape, false).context("decluttered fallback failed")?
            }
        };
        log::debug!("tract plan ready for {} with input {:?}", asset.name(), shape);
        Ok(Self { model, shape })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor> {
        if input.shape() != self.shape {
            return Err(anyhow!(
                "input shape {:?} does not match model input {:?}",
                input.shape(),
                self.shape
            ));
        }
        Tensor::from_shape(&self.shape, input.data()).context("failed to build input tensor")
    }

    fn extract_scores(&self, outputs: TVec<TValue>) -> Result<Vec<f32>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;
        Ok(scores.to_vec())
    }
}

fn build_plan(asset: &ModelAsset, shape: [usize; 4], optimized: bool) -> Result<RunnableModel> {
    let mut reader = Cursor::new(asset.bytes());
    let model = tract_onnx::onnx()
        .model_for_read(&mut reader)
        .with_context(|| format!("failed to parse ONNX model {}", asset.name()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(f32::datum_type(), tvec!(shape[0], shape[1], shape[2], shape[3])),
        )
        .context("failed to set input fact")?;

    if optimized {
        model
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    } else {
        model
            .into_typed()
            .context("failed to type-check ONNX model")?
            .into_decluttered()
            .context("failed to declutter ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn run(&self, input: &InputTensor) -> Result<RawOutput> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        let scores = self.extract_scores(outputs)?;
        RawOutput::from_scores(scores).ok_or_else(|| anyhow!("model output tensor was empty"))
    }

    fn warm_up(&self) -> Result<()> {
        let zeros = Tensor::zero::<f32>(&self.shape)?;
        self.model
            .run(tvec!(zeros.into()))
            .context("warm-up inference failed")?;
        Ok(())
    }
}
