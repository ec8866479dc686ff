//! Image preprocessing.
//!
//! Turns a decoded photo of any size into the fixed-shape, normalized `f32`
//! tensor the classifier was trained on. Normalization constants are part of
//! the model contract: `(byte - mean) / std` must use the exact pair the
//! model was trained with.

use anyhow::{anyhow, Result};
use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use serde::Deserialize;

/// Memory layout of the input tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, channel-last (TFLite/Keras exports).
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, channel-first.
    Nchw,
}

/// Resize interpolation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Bilinear,
    CatmullRom,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessConfig {
    /// Square input edge in pixels.
    pub input_size: u32,
    pub mean: f32,
    pub std: f32,
    pub layout: TensorLayout,
    pub resize_filter: ResizeFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            mean: 127.5,
            std: 127.5,
            layout: TensorLayout::Nhwc,
            resize_filter: ResizeFilter::Bilinear,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(anyhow!("input size must be greater than zero"));
        }
        if !self.mean.is_finite() {
            return Err(anyhow!("normalization mean must be finite"));
        }
        if !self.std.is_finite() || self.std == 0.0 {
            return Err(anyhow!("normalization std must be finite and non-zero"));
        }
        Ok(())
    }

    /// Tensor shape for a batch of one.
    pub fn shape(&self) -> [usize; 4] {
        let s = self.input_size as usize;
        match self.layout {
            TensorLayout::Nhwc => [1, s, s, 3],
            TensorLayout::Nchw => [1, 3, s, s],
        }
    }
}

/// Normalized model input. Built per request, dropped after inference.
#[derive(Clone, Debug, PartialEq)]
pub struct InputTensor {
    data: Vec<f32>,
    shape: [usize; 4],
    layout: TensorLayout,
}

impl InputTensor {
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Resize `image` to the configured square size and normalize it into a tensor.
pub fn preprocess(image: &DynamicImage, config: &PreprocessConfig) -> InputTensor {
    let size = config.input_size;
    let rgb = image.to_rgb8();
    let resized = if rgb.dimensions() == (size, size) {
        rgb
    } else {
        imageops::resize(&rgb, size, size, config.resize_filter.into())
    };
    normalize(&resized, config)
}

fn normalize(rgb: &RgbImage, config: &PreprocessConfig) -> InputTensor {
    let (width, height) = rgb.dimensions();
    let plane = width as usize * height as usize;
    let scale = |byte: u8| (byte as f32 - config.mean) / config.std;

    let data = match config.layout {
        TensorLayout::Nhwc => rgb.as_raw().iter().map(|&b| scale(b)).collect(),
        TensorLayout::Nchw => {
            let mut data = vec![0f32; plane * 3];
            for (idx, px) in rgb.pixels().enumerate() {
                for channel in 0..3 {
                    data[channel * plane + idx] = scale(px[channel]);
                }
            }
            data
        }
    };

    InputTensor {
        data,
        shape: config.shape(),
        layout: config.layout,
    }
}
