// src/lib.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
// Crate root: public re-exports.

pub mod constants;
pub mod config;
pub mod uri_utils;

// Storage backends
pub mod s3_client;
pub mod object_store;
pub mod file_store;

// Sample pipeline
pub mod record;
pub mod transforms;
pub mod tokenizer;
pub mod pipeline;

pub mod data_loader;
pub mod builder;

// ===== Public API =====
pub use config::{CaptionSelection, ConfigError, CropType, Locations};
pub use record::{CaptionField, FieldValue, Record};
pub use transforms::{Compose, CropPolicy, ImageData, ImageTransform, Normalize, ToTensor};
pub use tokenizer::{
    load_tokenizer, CaptionTokenizer, HfCaptionTokenizer, SdxlTokenizer, TokenizerError,
    TokenizerOutput,
};
pub use pipeline::{Microconditioning, PipelineConfig, Sample, SampleTransform, TransformError};
pub use object_store::{store_for_uri, ObjectStore};

pub use data_loader::{
    collate, collated, Batch, DataLoader, Dataset, DatasetError, DynStream, LoaderOptions,
    ShardSource, ShardStream, SourceOptions, StreamingImageCaptionDataset,
};
pub use builder::{
    build_streaming_image_caption_dataloader,
    build_streaming_image_caption_dataloader_with_tokenizer, BuildConfig, ImageCaptionLoader,
};
