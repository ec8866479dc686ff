//! `detectVest` command facade.
//!
//! A [`VestDetector`] owns the loaded pipeline (model, labels, preprocessing
//! and decision settings) and a background worker pool. It has an explicit
//! lifecycle:
//!
//! - `new`: unready; every request fails with `Model not initialized`
//! - `open`: loads assets and builds the inference backend, once
//! - `close`: stops accepting work, waits for in-flight requests, releases the model
//!
//! Requests are decoded, preprocessed, classified and decided on a worker
//! thread; the caller receives a [`PendingDetection`].

mod decode;
mod request;

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use log::Level;

use crate::assets::{LabelList, ModelAsset, ModelStore};
use crate::config::VestConfig;
use crate::detect::{decide, ClassificationResult, DecisionPolicy, InferenceBackend};
use crate::error::DetectError;
use crate::preprocess::{preprocess, PreprocessConfig};
use crate::worker::{submit_detached, Pending, PendingError, WorkerPool};

pub use decode::decode_image;
pub use request::DetectRequest;

/// Success payload of `detectVest`.
pub type DetectResponse = ClassificationResult;

/// Everything a request needs, shared read-only by the workers.
struct Pipeline {
    backend: Box<dyn InferenceBackend>,
    labels: LabelList,
    preprocess: PreprocessConfig,
    decision: DecisionPolicy,
    // Held so a cached scratch copy outlives every in-flight request.
    _model: Option<ModelAsset>,
}

pub struct VestDetector {
    config: VestConfig,
    pipeline: RwLock<Option<Arc<Pipeline>>>,
    pool: Mutex<Option<WorkerPool>>,
}

impl VestDetector {
    /// Create an unready detector. Call [`VestDetector::open`] before serving requests.
    pub fn new(config: VestConfig) -> Self {
        Self {
            config,
            pipeline: RwLock::new(None),
            pool: Mutex::new(None),
        }
    }

    /// Create a ready detector around an already-loaded backend.
    pub fn with_backend<B>(
        config: VestConfig,
        backend: B,
        labels: LabelList,
    ) -> Result<Self, DetectError>
    where
        B: InferenceBackend + 'static,
    {
        let detector = Self::new(config);
        detector.install(Box::new(backend), labels, None)?;
        Ok(detector)
    }

    pub fn config(&self) -> &VestConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.current_pipeline().is_some()
    }

    /// Load the model and labels and build the inference backend.
    ///
    /// A failure is logged and leaves the detector unready; no retry is attempted.
    /// Calling `open` on a ready detector is a no-op.
    pub fn open(&self) -> Result<(), DetectError> {
        if self.is_ready() {
            return Ok(());
        }
        let result = self.load_and_install();
        if let Err(err) = &result {
            log::error!("vest detector initialization failed: {}", err);
        }
        result
    }

    fn load_and_install(&self) -> Result<(), DetectError> {
        let (model, labels) = ModelStore::load(&self.config.model)?;
        let backend = build_backend(&model, &self.config.preprocess)?;
        backend.warm_up().map_err(DetectError::load)?;
        log::info!(
            "vest detector ready: backend={} labels={} input={}x{} mean={} std={}",
            backend.name(),
            labels.len(),
            self.config.preprocess.input_size,
            self.config.preprocess.input_size,
            self.config.preprocess.mean,
            self.config.preprocess.std
        );
        self.install(backend, labels, Some(model))
    }

    fn install(
        &self,
        backend: Box<dyn InferenceBackend>,
        labels: LabelList,
        model: Option<ModelAsset>,
    ) -> Result<(), DetectError> {
        {
            let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
            if pool.is_none() {
                *pool = Some(
                    WorkerPool::new(self.config.workers, "vest-detect")
                        .map_err(DetectError::load)?,
                );
            }
        }
        let pipeline = Pipeline {
            backend,
            labels,
            preprocess: self.config.preprocess.clone(),
            decision: self.config.decision,
            _model: model,
        };
        *self
            .pipeline
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(pipeline));
        Ok(())
    }

    /// Stop serving, wait for in-flight requests, then release the model.
    ///
    /// From a completion callback the wait is skipped; requests still running
    /// keep their own reference to the model until they finish.
    pub fn close(&self) {
        let pipeline = self
            .pipeline
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let pool = self
            .pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pool) = pool {
            pool.shutdown();
        }
        if pipeline.is_some() {
            log::info!("vest detector closed");
        }
    }

    /// Dispatch a request to the worker pool.
    ///
    /// Without a pool (never opened, or closed) the request runs on the shared
    /// `rayon` pool and resolves to `Model not initialized` once decoded.
    pub fn detect_vest(&self, request: DetectRequest) -> PendingDetection {
        let timeout = self.config.request_timeout;
        let pipeline = self.current_pipeline();
        let job = move || run_request(pipeline.as_deref(), &request);
        let inner = match self.pool.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(pool) => pool.submit(job),
            None => submit_detached(job),
        };
        PendingDetection { inner, timeout }
    }

    /// Dispatch a request and invoke `on_complete` from the worker when it finishes.
    ///
    /// `on_complete` may call [`VestDetector::close`].
    pub fn detect_vest_then<F>(&self, request: DetectRequest, on_complete: F)
    where
        F: FnOnce(Result<DetectResponse, DetectError>) + Send + 'static,
    {
        let pipeline = self.current_pipeline();
        let job = move || on_complete(run_request(pipeline.as_deref(), &request));
        match self.pool.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            Some(pool) => pool.spawn(job),
            None => rayon::spawn(job),
        }
    }

    /// Run a request on the calling thread.
    pub fn detect_vest_blocking(
        &self,
        request: &DetectRequest,
    ) -> Result<DetectResponse, DetectError> {
        run_request(self.current_pipeline().as_deref(), request)
    }

    fn current_pipeline(&self) -> Option<Arc<Pipeline>> {
        self.pipeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for VestDetector {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "backend-tract")]
fn build_backend(
    model: &ModelAsset,
    preprocess: &PreprocessConfig,
) -> Result<Box<dyn InferenceBackend>, DetectError> {
    let backend =
        crate::detect::TractBackend::from_asset(model, preprocess).map_err(DetectError::load)?;
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_backend(
    _model: &ModelAsset,
    _preprocess: &PreprocessConfig,
) -> Result<Box<dyn InferenceBackend>, DetectError> {
    Err(DetectError::Load(
        "no inference backend compiled in (enable feature backend-tract)".to_string(),
    ))
}

fn run_request(
    pipeline: Option<&Pipeline>,
    request: &DetectRequest,
) -> Result<DetectResponse, DetectError> {
    let level = if request.debug {
        Level::Info
    } else {
        Level::Debug
    };
    if request.image.trim().is_empty() {
        return Err(DetectError::InvalidInput);
    }
    log::log!(level, "detectVest: payload length {}", request.image.len());

    let image = decode_image(&request.image)?;
    log::log!(level, "image decoded: {}x{}", image.width(), image.height());

    let Some(pipeline) = pipeline else {
        log::warn!("detectVest called before the model was initialized");
        return Err(DetectError::NotReady);
    };

    let tensor = preprocess(&image, &pipeline.preprocess);
    let raw = pipeline.backend.run(&tensor).map_err(|err| {
        log::error!("inference failed: {:#}", err);
        DetectError::inference(err)
    })?;
    log::log!(level, "raw output: {:?}", raw);

    let threshold = request.effective_threshold();
    let result = decide(&raw, &pipeline.labels, &pipeline.decision, threshold)?;
    log::log!(
        level,
        "detected={} confidence={:.4} threshold={}",
        result.detected,
        result.confidence,
        threshold
    );
    Ok(result)
}

/// Handle to an in-flight `detectVest` request.
#[derive(Debug)]
pub struct PendingDetection {
    inner: Pending<Result<DetectResponse, DetectError>>,
    timeout: Duration,
}

impl PendingDetection {
    /// Block until the request completes or the configured request timeout expires.
    pub fn wait(self) -> Result<DetectResponse, DetectError> {
        let timeout = self.timeout;
        self.wait_timeout(timeout)
    }

    pub fn wait_timeout(self, timeout: Duration) -> Result<DetectResponse, DetectError> {
        match self.inner.wait_timeout(timeout) {
            Ok(result) => result,
            Err(err) => Err(pending_error(err)),
        }
    }

    /// Non-blocking poll; `None` while the request is still running.
    pub fn try_take(&self) -> Option<Result<DetectResponse, DetectError>> {
        match self.inner.try_take() {
            Ok(result) => result,
            Err(err) => Some(Err(pending_error(err))),
        }
    }
}

fn pending_error(err: PendingError) -> DetectError {
    DetectError::Inference(err.to_string())
}
