// src/data_loader/image_caption.rs
//
// Map-style dataset producing transformed image-caption samples.

use anyhow::anyhow;
use async_trait::async_trait;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::data_loader::sampler::epoch_seed;
use crate::data_loader::shard_source::ShardSource;
use crate::data_loader::{Dataset, DatasetError};
use crate::pipeline::{Sample, SampleTransform};
use crate::record::Record;

/// Wraps a record dataset and runs [`SampleTransform`] on every record.
///
/// Each sample gets its own ChaCha20 stream keyed by `(seed, epoch, index)`,
/// so the augmentation of a sample does not depend on fetch order or on how
/// many workers the loader runs.
pub struct StreamingImageCaptionDataset<D = ShardSource>
where
    D: Dataset<Item = Record>,
{
    source: D,
    pipeline: Arc<SampleTransform>,
    seed: u64,
    epoch: AtomicU64,
}

impl<D> StreamingImageCaptionDataset<D>
where
    D: Dataset<Item = Record>,
{
    pub fn new(source: D, pipeline: SampleTransform) -> Self {
        Self::with_seed(source, pipeline, 0)
    }

    pub fn with_seed(source: D, pipeline: SampleTransform, seed: u64) -> Self {
        Self { source, pipeline: Arc::new(pipeline), seed, epoch: AtomicU64::new(0) }
    }

    pub fn source(&self) -> &D {
        &self.source
    }

    pub fn pipeline(&self) -> &SampleTransform {
        &self.pipeline
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    fn sample_rng(&self, index: usize) -> ChaCha20Rng {
        let mut rng = ChaCha20Rng::seed_from_u64(epoch_seed(self.seed, self.epoch()));
        rng.set_stream(index as u64);
        rng
    }
}

impl<D> std::fmt::Debug for StreamingImageCaptionDataset<D>
where
    D: Dataset<Item = Record> + std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingImageCaptionDataset")
            .field("source", &self.source)
            .field("sdxl", &self.pipeline.config().sdxl)
            .field("seed", &self.seed)
            .finish()
    }
}

#[async_trait]
impl<D> Dataset for StreamingImageCaptionDataset<D>
where
    D: Dataset<Item = Record>,
{
    type Item = Sample;

    fn len(&self) -> Option<usize> {
        self.source.len()
    }

    /// Select the augmentation stream for the following reads.
    fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Relaxed);
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        let record = self.source.get(index).await?;
        let pipeline = self.pipeline.clone();
        let mut rng = self.sample_rng(index);

        // decode + resize are CPU bound
        tokio::task::spawn_blocking(move || pipeline.apply(&record, &mut rng))
            .await
            .map_err(|e| DatasetError::Backend(anyhow!("transform task failed: {e}")))?
            .map_err(|source| DatasetError::Transform { index, source })
    }
}
