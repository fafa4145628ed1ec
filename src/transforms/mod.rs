// src/transforms/mod.rs
//! Image representations and the transforms applied between decode and tokenization.
//!
//! An image starts as an RGB bitmap; a [`Compose`] chain usually turns it
//! into a `[C, H, W]` float tensor. Crop policies live in [`crop`] and always
//! run on the bitmap, before the chain.

pub mod crop;
pub mod tensor;

pub use crop::{CropPolicy, Cropped};
pub use tensor::{Compose, ImageTransform, Normalize, ToTensor};

use image::RgbImage;
use ndarray::ArrayD;

/// An image at some point of the pipeline.
#[derive(Debug, Clone)]
pub enum ImageData {
    /// Decoded 8-bit RGB pixels.
    Bitmap(RgbImage),
    /// Float tensor whose last two axes are `[H, W]`.
    Tensor(ArrayD<f32>),
}

impl ImageData {
    /// `(width, height)`, or `None` when a tensor has fewer than two axes.
    pub fn spatial_size(&self) -> Option<(usize, usize)> {
        match self {
            ImageData::Bitmap(img) => Some((img.width() as usize, img.height() as usize)),
            ImageData::Tensor(t) => {
                let shape = t.shape();
                if shape.len() < 2 {
                    return None;
                }
                Some((shape[shape.len() - 1], shape[shape.len() - 2]))
            }
        }
    }

    pub fn as_tensor(&self) -> Option<&ArrayD<f32>> {
        match self {
            ImageData::Tensor(t) => Some(t),
            ImageData::Bitmap(_) => None,
        }
    }

    pub fn as_bitmap(&self) -> Option<&RgbImage> {
        match self {
            ImageData::Bitmap(b) => Some(b),
            ImageData::Tensor(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn spatial_size_reads_bitmap_and_tensor() {
        let bmp = ImageData::Bitmap(RgbImage::new(40, 30));
        assert_eq!(bmp.spatial_size(), Some((40, 30)));

        let t = ImageData::Tensor(ArrayD::zeros(IxDyn(&[3, 16, 24])));
        assert_eq!(t.spatial_size(), Some((24, 16)));

        let flat = ImageData::Tensor(ArrayD::zeros(IxDyn(&[12])));
        assert_eq!(flat.spatial_size(), None);
    }
}
