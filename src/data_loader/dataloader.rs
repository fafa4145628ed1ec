//! Batching `DataLoader`.
//!
//! * Handles **map‑style** and **iterable** datasets transparently.
//! * Yields `Result<Vec<Item>, DatasetError>` where each `Vec` is a batch.
//! * Map-style datasets with a known length get shuffling, rank sharding and
//!   `num_workers` concurrent `get` calls; batches keep sampler order.
//! * `prefetch > 0` moves batch production onto a background task.

use crate::data_loader::dataset::{Dataset, DatasetError, DynStream};
use crate::data_loader::options::LoaderOptions;
use crate::data_loader::prefetch::prefetch_stream;
use crate::data_loader::sampler::{epoch_seed, Sampler, SequentialSampler, ShuffleSampler};

use async_stream::try_stream;
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// High‑level iterator that produces batched samples from a dataset.
pub struct DataLoader<D>
where
    D: Dataset,
{
    dataset: Arc<D>,
    opts: LoaderOptions,
    epoch: AtomicU64,
}

impl<D> DataLoader<D>
where
    D: Dataset,
{
    /// Create a new loader.
    pub fn new(dataset: D, opts: LoaderOptions) -> Self {
        Self::from_arc(Arc::new(dataset), opts)
    }

    /// Create a loader over a dataset that is shared elsewhere.
    pub fn from_arc(dataset: Arc<D>, opts: LoaderOptions) -> Self {
        Self { dataset, opts, epoch: AtomicU64::new(0) }
    }

    pub fn dataset(&self) -> &Arc<D> {
        &self.dataset
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.opts
    }

    /// Select the epoch for the following passes. The shuffle order and the
    /// dataset's own per-epoch randomness both follow it; every rank of a
    /// sharded job must use the same epoch.
    pub fn set_epoch(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::Relaxed);
        self.dataset.set_epoch(epoch);
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Number of batches one pass yields, when the dataset length is known.
    pub fn num_batches(&self) -> Option<usize> {
        let total = self.dataset.len()?;
        let world = self.opts.shard_world_size.max(1);
        let mine = if self.opts.shard_rank < world {
            total / world + usize::from(self.opts.shard_rank < total % world)
        } else {
            0
        };
        let bs = self.opts.batch_size.max(1);
        Some(if self.opts.drop_last { mine / bs } else { mine.div_ceil(bs) })
    }

    /// Return an **async stream** over the dataset that yields batches.
    ///
    /// The loader can be streamed repeatedly. Each call replays the epoch last
    /// passed to [`DataLoader::set_epoch`] (0 by default).
    ///
    /// ```ignore
    /// # use capdlio::{DataLoader, LoaderOptions};
    /// # async fn demo<D: capdlio::Dataset>(ds: D) -> anyhow::Result<()> {
    /// let loader = DataLoader::new(ds, LoaderOptions::default());
    /// let mut batches = loader.stream();
    /// while let Some(batch) = batches.next().await {
    ///     let data = batch?; // Vec<D::Item>
    ///     // training step ...
    /// }
    /// # Ok(()) }
    /// ```
    pub fn stream(&self) -> DynStream<Vec<D::Item>> {
        let batches = self.batches();
        if self.opts.prefetch > 0 {
            prefetch_stream(self.opts.prefetch, batches)
        } else {
            batches
        }
    }

    fn batches(&self) -> DynStream<Vec<D::Item>> {
        let ds = self.dataset.clone();
        let opts = self.opts.clone();
        let shuffle_seed = epoch_seed(opts.seed, self.epoch());

        Box::pin(try_stream! {
            let bs = opts.batch_size.max(1);
            let world = opts.shard_world_size.max(1);
            let rank = opts.shard_rank;

            // -------- Iterable dataset -----------------------------------
            if let Some(st) = ds.as_stream() {
                let mut st = st
                    .enumerate()
                    .filter(move |(pos, _)| std::future::ready(pos % world == rank))
                    .map(|(_, item)| item);
                let mut acc = Vec::with_capacity(bs);
                while let Some(item) = st.next().await {
                    acc.push(item?);
                    if acc.len() == bs {
                        yield std::mem::take(&mut acc);
                    }
                }
                if !acc.is_empty() && !opts.drop_last {
                    yield acc;
                }
                return;
            }

            // -------- Map‑style dataset -----------------------------------
            match ds.len() {
                Some(total) => {
                    let indices: Vec<usize> = if opts.shuffle {
                        drain(ShuffleSampler::new(total, shuffle_seed).shard(rank, world))
                    } else {
                        drain(SequentialSampler::new(total).shard(rank, world))
                    };

                    let fetch_ds = ds.clone();
                    let mut fetched = Box::pin(
                        stream::iter(indices)
                            .map(move |i| {
                                let ds = fetch_ds.clone();
                                async move { ds.get(i).await }
                            })
                            .buffered(opts.effective_workers()),
                    );

                    let mut batch = Vec::with_capacity(bs);
                    while let Some(item) = fetched.next().await {
                        batch.push(item?);
                        if batch.len() == bs {
                            yield std::mem::take(&mut batch);
                        }
                    }
                    if !batch.is_empty() && !opts.drop_last {
                        yield batch;
                    }
                }
                None => {
                    // Unknown length – keep reading until we hit EOF.
                    if rank >= world {
                        return;
                    }
                    let mut index = rank;
                    loop {
                        let mut batch = Vec::with_capacity(bs);
                        for _ in 0..bs {
                            match ds.get(index).await {
                                Ok(item) => batch.push(item),
                                Err(DatasetError::IndexOutOfRange(_)) => {
                                    if !batch.is_empty() && !opts.drop_last {
                                        yield batch;
                                    }
                                    return;
                                }
                                Err(e) => Err(e)?,
                            }
                            index += world;
                        }
                        yield batch;
                    }
                }
            }
        })
    }
}

fn drain<S: Sampler>(mut sampler: S) -> Vec<usize> {
    std::iter::from_fn(|| sampler.next_index()).collect()
}

impl<D> std::fmt::Debug for DataLoader<D>
where
    D: Dataset,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("batch_size", &self.opts.batch_size)
            .field("shuffle", &self.opts.shuffle)
            .field("num_workers", &self.opts.num_workers)
            .field("epoch", &self.epoch())
            .finish()
    }
}
