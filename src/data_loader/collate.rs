// src/data_loader/collate.rs
//
// Stack a batch of samples into dense arrays with a leading batch axis.

use futures_util::StreamExt;
use ndarray::{stack, Array1, Array2, ArrayD, ArrayView1, Axis};

use crate::constants::{
    FIELD_ATTENTION_MASK, FIELD_CAPTIONS, FIELD_COND_CROPS_COORDS_TOP_LEFT,
    FIELD_COND_ORIGINAL_SIZE, FIELD_COND_TARGET_SIZE, FIELD_DROP_CAPTION_MASK, FIELD_IMAGE,
};
use crate::data_loader::dataset::{DatasetError, DynStream};
use crate::pipeline::{Microconditioning, Sample, TransformError};

/// A collated batch of `N` samples.
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[N, C, H, W]`
    pub images: ArrayD<f32>,
    /// `[N, L]`, or `[N, 2, L]` for SDXL
    pub captions: ArrayD<i64>,
    /// `[N, L]`
    pub attention_mask: Array2<i64>,
    /// `[N, 2]` each, SDXL only
    pub cond_crops_coords_top_left: Option<Array2<i64>>,
    pub cond_original_size: Option<Array2<i64>>,
    pub cond_target_size: Option<Array2<i64>>,
    /// `[N]`
    pub drop_caption_mask: Array1<f32>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.drop_caption_mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(field name, shape)` for every field present, in output-schema order.
    pub fn shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let mut out = vec![
            (FIELD_IMAGE, self.images.shape().to_vec()),
            (FIELD_CAPTIONS, self.captions.shape().to_vec()),
            (FIELD_ATTENTION_MASK, self.attention_mask.shape().to_vec()),
        ];
        for (name, cond) in [
            (FIELD_COND_CROPS_COORDS_TOP_LEFT, &self.cond_crops_coords_top_left),
            (FIELD_COND_ORIGINAL_SIZE, &self.cond_original_size),
            (FIELD_COND_TARGET_SIZE, &self.cond_target_size),
        ] {
            if let Some(c) = cond {
                out.push((name, c.shape().to_vec()));
            }
        }
        out.push((FIELD_DROP_CAPTION_MASK, self.drop_caption_mask.shape().to_vec()));
        out
    }
}

fn shape_err(field: &str, e: ndarray::ShapeError) -> TransformError {
    TransformError::InvalidTensor(format!("cannot stack {field}: {e}"))
}

fn stack_cond<'a>(
    field: &str,
    conds: &[&'a Microconditioning],
    pick: impl Fn(&'a Microconditioning) -> ArrayView1<'a, i64>,
) -> Result<Array2<i64>, TransformError> {
    let views: Vec<_> = conds.iter().map(|&c| pick(c)).collect();
    stack(Axis(0), &views).map_err(|e| shape_err(field, e))
}

/// Stack `samples` along a new leading axis.
///
/// Every image must already be a tensor and all per-field shapes must agree.
pub fn collate(samples: Vec<Sample>) -> Result<Batch, TransformError> {
    if samples.is_empty() {
        return Err(TransformError::InvalidTensor("cannot collate an empty batch".into()));
    }

    let mut images = Vec::with_capacity(samples.len());
    for s in &samples {
        let t = s.image.as_tensor().ok_or_else(|| {
            TransformError::UnsupportedImageType(
                "collate needs tensor images; configure a ToTensor transform".into(),
            )
        })?;
        images.push(t.view());
    }
    let images = stack(Axis(0), &images).map_err(|e| shape_err(FIELD_IMAGE, e))?;

    let captions: Vec<_> = samples.iter().map(|s| s.captions.view()).collect();
    let captions = stack(Axis(0), &captions).map_err(|e| shape_err(FIELD_CAPTIONS, e))?;

    let masks: Vec<_> = samples.iter().map(|s| s.attention_mask.view()).collect();
    let attention_mask = stack(Axis(0), &masks).map_err(|e| shape_err(FIELD_ATTENTION_MASK, e))?;

    let conds: Vec<_> = samples.iter().map(|s| s.microcond.as_ref()).collect();
    let (crops, originals, targets) = if conds.iter().all(Option::is_some) {
        let conds: Vec<_> = conds.into_iter().flatten().collect();
        (
            Some(stack_cond(FIELD_COND_CROPS_COORDS_TOP_LEFT, &conds, |c| {
                c.crop_coords_top_left.view()
            })?),
            Some(stack_cond(FIELD_COND_ORIGINAL_SIZE, &conds, |c| c.original_size.view())?),
            Some(stack_cond(FIELD_COND_TARGET_SIZE, &conds, |c| c.target_size.view())?),
        )
    } else if conds.iter().all(Option::is_none) {
        (None, None, None)
    } else {
        return Err(TransformError::InvalidTensor(
            "some samples carry microconditioning and some do not".into(),
        ));
    };

    let drop_caption_mask = samples.iter().map(|s| s.drop_caption_mask).collect::<Array1<f32>>();

    Ok(Batch {
        images,
        captions,
        attention_mask,
        cond_crops_coords_top_left: crops,
        cond_original_size: originals,
        cond_target_size: targets,
        drop_caption_mask,
    })
}

/// Collate every batch of a loader stream.
pub fn collated(batches: DynStream<Vec<Sample>>) -> DynStream<Batch> {
    Box::pin(batches.map(|b| b.and_then(|samples| collate(samples).map_err(DatasetError::Collate))))
}
