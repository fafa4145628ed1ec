// src/pipeline.rs
//! Per-sample transform: raw record → training sample.
//!
//! The order of operations is fixed: decode, crop, transform chain,
//! microconditioning (SDXL only), caption dropout / selection, tokenization.
//! All randomness comes from the caller-supplied RNG, drawn in that same
//! order, so a seeded RNG reproduces a sample exactly.

use image::{ImageReader, RgbImage};
use ndarray::{Array1, ArrayD, Axis, stack};
use rand::Rng;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{CaptionSelection, ConfigError};
use crate::constants::{DEFAULT_CAPTION_KEY, DEFAULT_IMAGE_KEY};
use crate::record::{CaptionField, FieldValue, Record};
use crate::tokenizer::{CaptionTokenizer, TokenizerError, TokenizerOutput};
use crate::transforms::{Compose, CropPolicy, ImageData, ImageTransform};

/// Errors produced while turning one record into a sample.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unsupported image type: {0}")]
    UnsupportedImageType(String),

    #[error("invalid tensor: {0}")]
    InvalidTensor(String),

    #[error("record has no field {0:?}")]
    MissingField(String),

    #[error("field {field:?} is not usable: {reason}")]
    InvalidField { field: String, reason: String },

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

/// Immutable knobs of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Probability that the caption is replaced by the empty string.
    pub caption_drop_prob: f64,
    /// Probability, per vector, that an SDXL microconditioning vector is zeroed.
    pub microcond_drop_prob: f64,
    pub caption_selection: CaptionSelection,
    pub image_key: String,
    pub caption_key: String,
    /// Dual-tokenizer mode with microconditioning.
    pub sdxl: bool,
    /// Dropped captions get `drop_caption_mask = 0.0` instead of `1.0`.
    pub zero_dropped_captions: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            caption_drop_prob: 0.0,
            microcond_drop_prob: 0.0,
            caption_selection: CaptionSelection::First,
            image_key: DEFAULT_IMAGE_KEY.to_string(),
            caption_key: DEFAULT_CAPTION_KEY.to_string(),
            sdxl: false,
            zero_dropped_captions: false,
        }
    }
}

impl PipelineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("caption_drop_prob", self.caption_drop_prob),
            ("microcond_drop_prob", self.microcond_drop_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        if self.image_key.is_empty() || self.caption_key.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "image_key and caption_key must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

/// SDXL size/crop conditioning, each a 2-vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Microconditioning {
    /// `[top, left]`
    pub crop_coords_top_left: Array1<i64>,
    /// `[width, height]` before any crop or transform
    pub original_size: Array1<i64>,
    /// `[width, height]` after the transform chain
    pub target_size: Array1<i64>,
}

/// One training sample.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: ImageData,
    /// `[L]` for a single tokenizer, `[2, L]` for SDXL.
    pub captions: ArrayD<i64>,
    /// `[L]`
    pub attention_mask: Array1<i64>,
    pub microcond: Option<Microconditioning>,
    pub drop_caption_mask: f32,
}

/// The configured per-sample pipeline. Cheap to share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct SampleTransform {
    config: PipelineConfig,
    crop: Option<CropPolicy>,
    transform: Option<Compose>,
    tokenizer: Arc<dyn CaptionTokenizer>,
}

impl SampleTransform {
    pub fn new(
        config: PipelineConfig,
        crop: Option<CropPolicy>,
        transform: Option<Compose>,
        tokenizer: Arc<dyn CaptionTokenizer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let expected = if config.sdxl { 2 } else { 1 };
        if tokenizer.num_sequences() != expected {
            return Err(ConfigError::InvalidConfig(format!(
                "sdxl={} needs a tokenizer producing {} sequence(s), got {}",
                config.sdxl,
                expected,
                tokenizer.num_sequences()
            )));
        }
        Ok(Self { config, crop, transform, tokenizer })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn crop(&self) -> Option<&CropPolicy> {
        self.crop.as_ref()
    }

    pub fn tokenizer(&self) -> &Arc<dyn CaptionTokenizer> {
        &self.tokenizer
    }

    /// Transform one record.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        record: &Record,
        rng: &mut R,
    ) -> Result<Sample, TransformError> {
        let img = self.decode_image(record)?;
        let (orig_w, orig_h) = img.dimensions();

        let (img, crop_top, crop_left) = match &self.crop {
            Some(policy) => {
                let c = policy.apply(img, rng);
                (c.image, c.top, c.left)
            }
            None => (img, 0, 0),
        };

        let image = match &self.transform {
            Some(chain) => chain.apply(ImageData::Bitmap(img))?,
            None => ImageData::Bitmap(img),
        };

        let microcond = if self.config.sdxl {
            let (img_w, img_h) = image.spatial_size().ok_or_else(|| {
                TransformError::UnsupportedImageType(
                    "image after transforms must be a bitmap or a [.., H, W] tensor".into(),
                )
            })?;
            let mut cond = Microconditioning {
                crop_coords_top_left: Array1::from(vec![crop_top as i64, crop_left as i64]),
                original_size: Array1::from(vec![orig_w as i64, orig_h as i64]),
                target_size: Array1::from(vec![img_w as i64, img_h as i64]),
            };
            // one independent draw per vector
            let p = self.config.microcond_drop_prob;
            if rng.random::<f64>() < p {
                cond.crop_coords_top_left.fill(0);
            }
            if rng.random::<f64>() < p {
                cond.original_size.fill(0);
            }
            if rng.random::<f64>() < p {
                cond.target_size.fill(0);
            }
            Some(cond)
        } else {
            None
        };

        let (caption, drop_caption_mask) = if rng.random::<f64>() < self.config.caption_drop_prob {
            let mask = if self.config.zero_dropped_captions { 0.0 } else { 1.0 };
            (String::new(), mask)
        } else {
            (self.select_caption(record, rng)?, 1.0)
        };

        let tokens = self.tokenizer.encode(&caption)?;
        let (captions, attention_mask) = self.assemble_tokens(tokens)?;

        Ok(Sample { image, captions, attention_mask, microcond, drop_caption_mask })
    }

    fn decode_image(&self, record: &Record) -> Result<RgbImage, TransformError> {
        let key = &self.config.image_key;
        match record.get(key) {
            Some(FieldValue::Bytes(bytes)) => Ok(decode_unbounded(bytes)?.into_rgb8()),
            Some(FieldValue::Image(img)) => Ok(match img.as_rgb8() {
                Some(rgb) => rgb.clone(),
                None => img.to_rgb8(),
            }),
            Some(_) => Err(TransformError::InvalidField {
                field: key.clone(),
                reason: "expected image bytes or a decoded image".into(),
            }),
            None => Err(TransformError::MissingField(key.clone())),
        }
    }

    fn select_caption<R: Rng + ?Sized>(
        &self,
        record: &Record,
        rng: &mut R,
    ) -> Result<String, TransformError> {
        let key = &self.config.caption_key;
        let field = record.get(key).ok_or_else(|| TransformError::MissingField(key.clone()))?;
        let caption = field.as_caption().ok_or_else(|| TransformError::InvalidField {
            field: key.clone(),
            reason: "expected UTF-8 text or a list of strings".into(),
        })?;
        match caption {
            CaptionField::Single(s) => Ok(s),
            CaptionField::Candidates(mut list) => {
                if list.is_empty() {
                    return Err(TransformError::InvalidField {
                        field: key.clone(),
                        reason: "caption list is empty".into(),
                    });
                }
                let idx = match self.config.caption_selection {
                    CaptionSelection::First => 0,
                    CaptionSelection::Random => rng.random_range(0..list.len()),
                };
                Ok(list.swap_remove(idx))
            }
        }
    }

    fn assemble_tokens(
        &self,
        out: TokenizerOutput,
    ) -> Result<(ArrayD<i64>, Array1<i64>), TransformError> {
        let TokenizerOutput { input_ids, mut attention_mask } = out;
        if input_ids.len() != self.tokenizer.num_sequences()
            || attention_mask.len() != input_ids.len()
        {
            return Err(TokenizerError::ShapeMismatch(format!(
                "expected {} sequence(s), got {} ids / {} masks",
                self.tokenizer.num_sequences(),
                input_ids.len(),
                attention_mask.len()
            ))
            .into());
        }

        if !self.config.sdxl {
            let ids = input_ids.into_iter().next().unwrap_or_default();
            let mask = attention_mask.pop().unwrap_or_default();
            return Ok((ids.into_dyn(), mask));
        }

        let views: Vec<_> = input_ids.iter().map(|a| a.view()).collect();
        let captions = stack(Axis(0), &views)
            .map_err(|e| TokenizerError::ShapeMismatch(format!("cannot stack caption ids: {e}")))?;

        let (a, b) = (&attention_mask[0], &attention_mask[1]);
        if a.len() != b.len() {
            return Err(TokenizerError::ShapeMismatch(format!(
                "attention masks have lengths {} and {}",
                a.len(),
                b.len()
            ))
            .into());
        }
        // union of both padding masks, back in the mask dtype
        let mask = ndarray::Zip::from(a).and(b).map_collect(|&x, &y| i64::from(x != 0 || y != 0));

        Ok((captions.into_dyn(), mask))
    }
}

/// Decode without the reader's default allocation and dimension limits;
/// shards routinely carry very large source images.
fn decode_unbounded(bytes: &[u8]) -> Result<image::DynamicImage, image::ImageError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    reader.no_limits();
    reader.decode()
}
