// src/transforms/tensor.rs
//! Bitmap → tensor conversion and tensor normalization.

use ndarray::{Array3, Axis};
use std::fmt;
use std::sync::Arc;

use crate::constants::{DEFAULT_NORMALIZE_MEAN, DEFAULT_NORMALIZE_STD};
use crate::pipeline::TransformError;
use crate::transforms::ImageData;

/// One step of the image transform chain.
pub trait ImageTransform: Send + Sync + fmt::Debug {
    fn apply(&self, image: ImageData) -> Result<ImageData, TransformError>;
}

/// HWC u8 bitmap → CHW f32 tensor scaled to `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToTensor;

impl ImageTransform for ToTensor {
    fn apply(&self, image: ImageData) -> Result<ImageData, TransformError> {
        match image {
            ImageData::Bitmap(img) => {
                let (w, h) = img.dimensions();
                let raw = img.as_raw();
                let (w, h) = (w as usize, h as usize);
                let arr = Array3::from_shape_fn((3, h, w), |(c, y, x)| {
                    raw[(y * w + x) * 3 + c] as f32 / 255.0
                });
                Ok(ImageData::Tensor(arr.into_dyn()))
            }
            ImageData::Tensor(_) => Err(TransformError::UnsupportedImageType(
                "ToTensor expects a bitmap, got a tensor".into(),
            )),
        }
    }
}

/// Per-channel `(x - mean) / std` over the channel axis of a `[.., C, H, W]` tensor.
#[derive(Debug, Clone)]
pub struct Normalize {
    mean: Vec<f32>,
    std: Vec<f32>,
}

impl Normalize {
    pub fn new(mean: &[f32], std: &[f32]) -> Result<Self, TransformError> {
        if mean.len() != std.len() || mean.is_empty() {
            return Err(TransformError::InvalidTensor(format!(
                "Normalize needs matching non-empty mean/std, got {} and {}",
                mean.len(),
                std.len()
            )));
        }
        if std.iter().any(|s| *s == 0.0) {
            return Err(TransformError::InvalidTensor("Normalize std must be non-zero".into()));
        }
        Ok(Self { mean: mean.to_vec(), std: std.to_vec() })
    }
}

impl ImageTransform for Normalize {
    fn apply(&self, image: ImageData) -> Result<ImageData, TransformError> {
        let mut t = match image {
            ImageData::Tensor(t) => t,
            ImageData::Bitmap(_) => {
                return Err(TransformError::UnsupportedImageType(
                    "Normalize expects a tensor, got a bitmap".into(),
                ));
            }
        };
        if t.ndim() < 3 {
            return Err(TransformError::InvalidTensor(format!(
                "Normalize expects a [.., C, H, W] tensor, got shape {:?}",
                t.shape()
            )));
        }
        let c_axis = Axis(t.ndim() - 3);
        if t.len_of(c_axis) != self.mean.len() {
            return Err(TransformError::InvalidTensor(format!(
                "Normalize configured for {} channels, tensor has {}",
                self.mean.len(),
                t.len_of(c_axis)
            )));
        }
        for (c, mut plane) in t.axis_iter_mut(c_axis).enumerate() {
            let (m, s) = (self.mean[c], self.std[c]);
            plane.mapv_inplace(|v| (v - m) / s);
        }
        Ok(ImageData::Tensor(t))
    }
}

/// Ordered chain of transforms. An empty chain is the identity.
#[derive(Debug, Clone, Default)]
pub struct Compose {
    steps: Vec<Arc<dyn ImageTransform>>,
}

impl Compose {
    pub fn new(steps: Vec<Arc<dyn ImageTransform>>) -> Self {
        Self { steps }
    }

    /// `ToTensor` followed by `Normalize(0.5, 0.5)`: pixels end up in `[-1, 1]`.
    pub fn diffusion_default() -> Self {
        let normalize = Normalize {
            mean: DEFAULT_NORMALIZE_MEAN.to_vec(),
            std: DEFAULT_NORMALIZE_STD.to_vec(),
        };
        Self::new(vec![Arc::new(ToTensor), Arc::new(normalize)])
    }

    pub fn identity() -> Self {
        Self::default()
    }
}

impl ImageTransform for Compose {
    fn apply(&self, image: ImageData) -> Result<ImageData, TransformError> {
        self.steps.iter().try_fold(image, |img, step| step.apply(img))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn to_tensor_is_chw_in_unit_range() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 0, 51]));
        let out = ToTensor.apply(ImageData::Bitmap(img)).unwrap();
        let t = out.as_tensor().unwrap();
        assert_eq!(t.shape(), &[3, 1, 2]);
        assert_eq!(t[[0, 0, 1]], 1.0);
        assert_eq!(t[[1, 0, 1]], 0.0);
        assert!((t[[2, 0, 1]] - 0.2).abs() < 1e-6);
        assert_eq!(t[[0, 0, 0]], 0.0);
    }

    #[test]
    fn default_chain_maps_to_minus_one_one() {
        let img = RgbImage::from_pixel(4, 3, Rgb([0, 255, 0]));
        let out = Compose::diffusion_default().apply(ImageData::Bitmap(img)).unwrap();
        let t = out.as_tensor().unwrap();
        assert_eq!(t.shape(), &[3, 3, 4]);
        assert!(t.index_axis(Axis(0), 0).iter().all(|v| (*v + 1.0).abs() < 1e-6));
        assert!(t.index_axis(Axis(0), 1).iter().all(|v| (*v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn normalize_rejects_bitmaps_and_channel_mismatch() {
        let n = Normalize::new(&[0.5], &[0.5]).unwrap();
        let bmp = ImageData::Bitmap(RgbImage::new(1, 1));
        assert!(matches!(n.apply(bmp), Err(TransformError::UnsupportedImageType(_))));

        let t = ToTensor.apply(ImageData::Bitmap(RgbImage::new(1, 1))).unwrap();
        assert!(matches!(n.apply(t), Err(TransformError::InvalidTensor(_))));
        assert!(Normalize::new(&[0.5, 0.5], &[0.5]).is_err());
    }

    #[test]
    fn identity_leaves_bitmap_alone() {
        let img = RgbImage::new(5, 7);
        let out = Compose::identity().apply(ImageData::Bitmap(img)).unwrap();
        assert_eq!(out.as_bitmap().unwrap().dimensions(), (5, 7));
    }
}
