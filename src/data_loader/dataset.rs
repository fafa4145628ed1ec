//! Core dataset abstractions for capdlio's data loader.
//!
//! A dataset is either map-style (random access through [`Dataset::get`])
//! or iterable (samples only through [`Dataset::as_stream`]). The shard
//! source and the image-caption dataset are both map-style.

use async_trait::async_trait;
use futures_core::stream::Stream;
use std::pin::Pin;
use thiserror::Error;
use anyhow::Error as AnyError;

use crate::config::ConfigError;
use crate::pipeline::TransformError;
use crate::tokenizer::TokenizerError;

/// A boxed, pinned, sendable async stream of fallible items.
pub type DynStream<T> =
    Pin<Box<dyn Stream<Item = Result<T, DatasetError>> + Send + 'static>>;

/// Item‑level error type for dataset & loader operations.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("index out of range: {0}")]
    IndexOutOfRange(usize),

    #[error("operation not supported for this dataset type")]
    Unsupported,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sample {index}: {source}")]
    Transform {
        index: usize,
        #[source]
        source: TransformError,
    },

    #[error("failed to collate batch: {0}")]
    Collate(#[source] TransformError),

    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),

    // storage / IO failures
    #[error(transparent)]
    Backend(#[from] AnyError),
}

// Mapping from string to error
impl From<String> for DatasetError {
    fn from(s: String) -> Self {
        DatasetError::Backend(AnyError::msg(s))
    }
}

impl From<&str> for DatasetError {
    fn from(s: &str) -> Self {
        DatasetError::Backend(AnyError::msg(s.to_string()))
    }
}

/// A logical collection of **samples** (records of a shard set, transformed
/// image-caption samples, ...).
#[async_trait]
pub trait Dataset: Send + Sync + 'static {
    /// Concrete type produced for each sample.
    type Item: Send + 'static;

    /// Total number of samples if known *a priori*; otherwise `None`.
    fn len(&self) -> Option<usize>;

    /// Retrieve a sample by zero‑based index.  Iterable‑only datasets may
    /// return `DatasetError::Unsupported`.
    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError>;

    /// Provide an async stream of samples if the dataset is iterable.
    /// Map‑style datasets can simply keep the default (`None`).
    fn as_stream(&self) -> Option<DynStream<Self::Item>> {
        None
    }

    /// Called by the loader before each pass. Datasets with per-epoch
    /// randomness override this; the default ignores it.
    fn set_epoch(&self, _epoch: u64) {}

    /// Convenience helper.
    fn is_empty(&self) -> bool {
        self.len().map(|n| n == 0).unwrap_or(false)
    }
}
