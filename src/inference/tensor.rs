//! Image tensors and preprocessing.
//!
//! Tensors are kept in NHWC order with a batch of one and three channels,
//! which is what the classifier API consumes. Backends that want CHW ask for
//! [`ImageTensor::to_chw`].

use image::{imageops::FilterType, DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::utils::error::{AdvisorError, Result};

/// Default model input edge length
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Upload size limit in bytes (10 MB)
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepted upload encodings
pub const ALLOWED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::WebP];

/// ImageNet normalization mean values (RGB)
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB)
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

const CHANNELS: usize = 3;

/// Model-specific preprocessing applied after range normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMode {
    /// `[0, 255] -> [-1, 1]`
    #[default]
    MobileNetV2,
    /// `[0, 255] -> (x / 255 - mean) / std`
    ImageNet,
    /// Leave values in `[0, 255]`
    Identity,
}

/// Float image tensor of shape `[1, height, width, 3]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
}

impl ImageTensor {
    /// Wrap raw NHWC data, checking the element count.
    pub fn new(data: Vec<f32>, height: usize, width: usize) -> Result<Self> {
        if height == 0 || width == 0 {
            return Err(AdvisorError::InvalidInput(format!(
                "tensor dimensions must be non-zero (got {}x{})",
                height, width
            )));
        }
        let expected = height
            .checked_mul(width)
            .and_then(|pixels| pixels.checked_mul(CHANNELS))
            .ok_or_else(|| {
                AdvisorError::InvalidInput(format!("tensor dimensions {}x{} overflow", height, width))
            })?;
        if data.len() != expected {
            return Err(AdvisorError::InvalidInput(format!(
                "expected {} values for a 1x{}x{}x{} tensor, got {}",
                expected,
                height,
                width,
                CHANNELS,
                data.len()
            )));
        }
        Ok(Self { data, height, width })
    }

    /// Tensor filled with a single value.
    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self {
            data: vec![value; height * width * CHANNELS],
            height,
            width,
        }
    }

    /// Resize an image to `size x size` (bicubic) and scale pixels into `[0, 1]`.
    pub fn from_image(image: &DynamicImage, size: u32) -> Self {
        let rgb = image.resize_exact(size, size, FilterType::CatmullRom).to_rgb8();
        let data = rgb
            .pixels()
            .flat_map(|pixel| pixel.0)
            .map(|value| value as f32 / 255.0)
            .collect();

        Self {
            data,
            height: size as usize,
            width: size as usize,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Shape as `[batch, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.height, self.width, CHANNELS]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Whether the values look like `[0, 1]` input.
    ///
    /// Known limitation: a genuinely `[0, 255]` image whose every pixel is at
    /// most 1 is indistinguishable from normalized input and gets rescaled.
    pub fn looks_unit_scaled(&self) -> bool {
        self.max_value() <= 1.0
    }

    /// Bring the values into `[0, 255]`.
    pub fn to_pixel_range(&self) -> ImageTensor {
        if self.looks_unit_scaled() {
            self.map(|v| v * 255.0)
        } else {
            self.clone()
        }
    }

    /// Range-normalize, then apply `mode`.
    pub fn prepared(&self, mode: PreprocessMode) -> ImageTensor {
        let pixels = self.to_pixel_range();
        match mode {
            PreprocessMode::MobileNetV2 => pixels.map(|v| v / 127.5 - 1.0),
            PreprocessMode::ImageNet => {
                let mut out = pixels;
                for chunk in out.data.chunks_exact_mut(CHANNELS) {
                    for (c, value) in chunk.iter_mut().enumerate() {
                        *value = (*value / 255.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
                    }
                }
                out
            }
            PreprocessMode::Identity => pixels,
        }
    }

    /// Data rearranged to CHW order: all R values, then all G, then all B.
    pub fn to_chw(&self) -> Vec<f32> {
        let num_pixels = self.height * self.width;
        let mut chw = vec![0.0f32; CHANNELS * num_pixels];
        for (i, pixel) in self.data.chunks_exact(CHANNELS).enumerate() {
            for (c, value) in pixel.iter().enumerate() {
                chw[c * num_pixels + i] = *value;
            }
        }
        chw
    }

    fn map(&self, f: impl Fn(f32) -> f32) -> ImageTensor {
        ImageTensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            height: self.height,
            width: self.width,
        }
    }
}

/// Decode an uploaded image after checking its size and encoding.
pub fn decode_upload(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(AdvisorError::Image("upload is empty".to_string()));
    }
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(AdvisorError::Image(format!(
            "image exceeds {} MB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let format = image::guess_format(bytes)?;
    if !ALLOWED_FORMATS.contains(&format) {
        return Err(AdvisorError::Image(format!(
            "unsupported image type {:?}; allowed: JPEG, PNG, WebP",
            format
        )));
    }

    Ok(image::load_from_memory_with_format(bytes, format)?)
}
