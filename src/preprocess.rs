//! Image-to-tensor preprocessing for network input
//!
//! Decoding and resizing live outside the explanation pipeline proper;
//! this module covers the boundary: bilinear resize to the network's
//! square input size and per-channel mean/std normalization into a
//! `(1, 3, S, S)` f32 tensor.

use anyhow::Result;
use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::DynamicImage;

use crate::error::ExplainError;

/// ImageNet per-channel normalization constants (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Resize + normalize configuration for one backend's input contract.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    size: usize,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    /// Standard ImageNet preprocessing at the given square input size.
    pub fn imagenet(size: usize) -> Result<Self> {
        Self::new(size, IMAGENET_MEAN, IMAGENET_STD)
    }

    pub fn new(size: usize, mean: [f32; 3], std: [f32; 3]) -> Result<Self> {
        if size == 0 {
            return Err(ExplainError::invalid("input size must be positive"));
        }
        Ok(Self { size, mean, std })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Convert a decoded image into the network input tensor
    /// `(1, 3, size, size)`, channels-first, normalized.
    pub fn to_input(&self, image: &DynamicImage, device: &Device) -> Result<Tensor> {
        let s = self.size;
        let rgb = image
            .resize_exact(s as u32, s as u32, FilterType::Triangle)
            .to_rgb8();

        let mut data = vec![0.0f32; 3 * s * s];
        for (x, y, pixel) in rgb.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                data[c * s * s + y * s + x] =
                    (f32::from(pixel.0[c]) / 255.0 - self.mean[c]) / self.std[c];
            }
        }

        Ok(Tensor::from_vec(data, (3, s, s), device)?.unsqueeze(0)?)
    }
}
