// src/transforms/crop.rs
//! Crop policies.
//!
//! Every policy maps an RGB bitmap to a cropped bitmap plus the `(top, left)`
//! offset of the crop window in the resized image. Those offsets feed the
//! SDXL `crop_coords_top_left` microconditioning.

use image::RgbImage;
use image::imageops::{self, FilterType};
use rand::Rng;

use crate::constants::SDXL_ASPECT_BUCKETS;

/// Output of a crop policy.
#[derive(Debug, Clone)]
pub struct Cropped {
    pub image: RgbImage,
    pub top: u32,
    pub left: u32,
}

/// The three interchangeable crop policies.
#[derive(Debug, Clone, PartialEq)]
pub enum CropPolicy {
    /// Resize the shorter side to `size`, then take the centered `size × size` square.
    LargestCenterSquare { size: u32 },
    /// Resize the shorter side to `size`, then take a uniformly placed `size × size` square.
    RandomCropSquare { size: u32 },
    /// Pick the `(height, width)` bucket whose aspect ratio is nearest the
    /// image's, resize to cover it and take a uniformly placed crop of that size.
    RandomCropAspectRatio { buckets: Vec<(u32, u32)> },
}

impl CropPolicy {
    pub fn center_square(size: u32) -> Self {
        CropPolicy::LargestCenterSquare { size: size.max(1) }
    }

    pub fn random_square(size: u32) -> Self {
        CropPolicy::RandomCropSquare { size: size.max(1) }
    }

    /// Aspect-ratio crop over the SDXL training resolutions.
    pub fn sdxl_aspect_ratio() -> Self {
        CropPolicy::RandomCropAspectRatio { buckets: SDXL_ASPECT_BUCKETS.to_vec() }
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: RgbImage, rng: &mut R) -> Cropped {
        if image.width() == 0 || image.height() == 0 {
            return Cropped { image, top: 0, left: 0 };
        }
        match self {
            CropPolicy::LargestCenterSquare { size } => {
                let img = resize_shorter_side(image, *size);
                let top = (img.height() - size) / 2;
                let left = (img.width() - size) / 2;
                crop(&img, top, left, *size, *size)
            }
            CropPolicy::RandomCropSquare { size } => {
                let img = resize_shorter_side(image, *size);
                let top = rng.random_range(0..=img.height() - size);
                let left = rng.random_range(0..=img.width() - size);
                crop(&img, top, left, *size, *size)
            }
            CropPolicy::RandomCropAspectRatio { buckets } => {
                let nearest = nearest_bucket(buckets, image.width(), image.height());
                let Some(&(target_h, target_w)) = nearest else {
                    return Cropped { image, top: 0, left: 0 };
                };
                let img = resize_to_cover(image, target_w, target_h);
                let top = rng.random_range(0..=img.height() - target_h);
                let left = rng.random_range(0..=img.width() - target_w);
                crop(&img, top, left, target_w, target_h)
            }
        }
    }
}

fn crop(img: &RgbImage, top: u32, left: u32, width: u32, height: u32) -> Cropped {
    let image = imageops::crop_imm(img, left, top, width, height).to_image();
    Cropped { image, top, left }
}

/// Resize so the shorter side equals `size`, keeping the aspect ratio (longer side truncated).
fn resize_shorter_side(img: RgbImage, size: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let (new_w, new_h) = if w <= h {
        (size, ((size as u64 * h as u64) / w as u64) as u32)
    } else {
        (((size as u64 * w as u64) / h as u64) as u32, size)
    };
    if (new_w, new_h) == (w, h) {
        return img;
    }
    imageops::resize(&img, new_w, new_h, FilterType::Triangle)
}

/// Resize so the image covers `target_w × target_h` with one side matching exactly.
fn resize_to_cover(img: RgbImage, target_w: u32, target_h: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let orig_ar = h as f64 / w as f64;
    let target_ar = target_h as f64 / target_w as f64;
    let (new_w, new_h) = if orig_ar > target_ar {
        let scaled_h = (target_w as f64 / w as f64 * h as f64).round() as u32;
        (target_w, scaled_h.max(target_h))
    } else if orig_ar < target_ar {
        let scaled_w = (target_h as f64 / h as f64 * w as f64).round() as u32;
        (scaled_w.max(target_w), target_h)
    } else {
        (target_w, target_h)
    };
    if (new_w, new_h) == (w, h) {
        return img;
    }
    imageops::resize(&img, new_w, new_h, FilterType::Triangle)
}

fn nearest_bucket(buckets: &[(u32, u32)], w: u32, h: u32) -> Option<&(u32, u32)> {
    let orig_ar = h as f64 / w as f64;
    buckets.iter().min_by(|a, b| {
        let da = (a.0 as f64 / a.1 as f64 - orig_ar).abs();
        let db = (b.0 as f64 / b.1 as f64 - orig_ar).abs();
        da.total_cmp(&db)
    })
}
