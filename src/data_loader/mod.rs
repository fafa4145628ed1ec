// src/data_loader/mod.rs

//! Public API surface for the capdlio data_loader layer.
/// expose the `dataloader` module (file dataloader.rs)
pub mod dataloader;

/// expose the `dataset` module (file dataset.rs)
pub mod dataset;

/// expose the `options` module (file options.rs)
pub mod options;

pub mod sampler;
pub mod prefetch;
pub mod shard_source;
pub mod image_caption;
pub mod collate;

// Re‐export the key types at this level:
pub use dataset::{Dataset, DatasetError, DynStream};
pub use dataloader::DataLoader;
pub use options::LoaderOptions;
pub use shard_source::{ShardSource, ShardStream, SourceOptions};
pub use image_caption::StreamingImageCaptionDataset;
pub use collate::{collate, collated, Batch};
