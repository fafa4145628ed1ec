// src/builder.rs
//
// One-call construction of a batched image-caption loader over shard streams.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{pair_locations, CaptionSelection, CropType, Locations};
use crate::constants::{
    DEFAULT_CAPTION_KEY, DEFAULT_IMAGE_KEY, DEFAULT_RESIZE_SIZE, DEFAULT_TOKENIZER, SDXL_TOKENIZER,
};
use crate::data_loader::{
    DataLoader, DatasetError, LoaderOptions, ShardSource, ShardStream, SourceOptions,
    StreamingImageCaptionDataset,
};
use crate::pipeline::{PipelineConfig, SampleTransform};
use crate::tokenizer::{load_tokenizer, CaptionTokenizer};
use crate::transforms::{Compose, CropPolicy};

/// Loader type returned by the builder.
pub type ImageCaptionLoader = DataLoader<StreamingImageCaptionDataset<ShardSource>>;

/// Everything the builder needs besides `remote`, `local` and `batch_size`.
///
/// String-typed knobs are validated when the loader is built.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub tokenizer_name_or_path: String,
    pub caption_drop_prob: f64,
    pub microcond_drop_prob: f64,
    /// Edge length for the square crops.
    pub resize_size: u32,
    /// `first` or `random`, case-insensitive.
    pub caption_selection: String,
    /// `square`, `random`, `aspect_ratio`, `none`; `None` disables cropping.
    pub crop_type: Option<String>,
    /// Image transform chain; `None` installs `ToTensor + Normalize(0.5, 0.5)`.
    pub transform: Option<Compose>,
    pub image_key: String,
    pub caption_key: String,
    pub zero_dropped_captions: bool,
    /// Force dual-tokenizer mode on or off. `None` infers it from the tokenizer name.
    pub sdxl: Option<bool>,
    /// Seed of the per-sample augmentation streams.
    pub seed: u64,
    pub source: SourceOptions,
    /// `batch_size` here is overridden by the builder argument.
    pub loader: LoaderOptions,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tokenizer_name_or_path: DEFAULT_TOKENIZER.to_string(),
            caption_drop_prob: 0.0,
            microcond_drop_prob: 0.0,
            resize_size: DEFAULT_RESIZE_SIZE,
            caption_selection: CaptionSelection::First.to_string(),
            crop_type: Some("square".to_string()),
            transform: None,
            image_key: DEFAULT_IMAGE_KEY.to_string(),
            caption_key: DEFAULT_CAPTION_KEY.to_string(),
            zero_dropped_captions: true,
            sdxl: None,
            seed: 0,
            source: SourceOptions::default(),
            loader: LoaderOptions::default(),
        }
    }
}

impl BuildConfig {
    /// Dual-tokenizer mode: the explicit override, else the SDXL checkpoint name.
    pub fn resolve_sdxl(&self) -> bool {
        self.sdxl.unwrap_or(self.tokenizer_name_or_path == SDXL_TOKENIZER)
    }

    fn crop_policy(&self) -> Result<Option<CropPolicy>, DatasetError> {
        let crop = match CropType::parse_optional(self.crop_type.as_deref())? {
            CropType::Square => Some(CropPolicy::center_square(self.resize_size)),
            CropType::Random => Some(CropPolicy::random_square(self.resize_size)),
            CropType::AspectRatio => Some(CropPolicy::sdxl_aspect_ratio()),
            CropType::None => None,
        };
        Ok(crop)
    }

    /// Validate the configuration and assemble the per-sample pipeline around `tokenizer`.
    pub fn build_pipeline(
        &self,
        tokenizer: Arc<dyn CaptionTokenizer>,
    ) -> Result<SampleTransform, DatasetError> {
        let crop = self.crop_policy()?;
        let caption_selection: CaptionSelection = self.caption_selection.parse()?;
        let transform = self.transform.clone().unwrap_or_else(Compose::diffusion_default);

        let config = PipelineConfig {
            caption_drop_prob: self.caption_drop_prob,
            microcond_drop_prob: self.microcond_drop_prob,
            caption_selection,
            image_key: self.image_key.clone(),
            caption_key: self.caption_key.clone(),
            sdxl: self.resolve_sdxl(),
            zero_dropped_captions: self.zero_dropped_captions,
        };
        Ok(SampleTransform::new(config, crop, Some(transform), tokenizer)?)
    }
}

/// Build a batched loader of image-caption samples over `(remote, local)` streams.
///
/// `remote` and `local` are both single locations or both sequences of equal
/// length. The tokenizer is loaded from `config.tokenizer_name_or_path`.
pub async fn build_streaming_image_caption_dataloader(
    remote: impl Into<Locations>,
    local: impl Into<Locations>,
    batch_size: usize,
    config: BuildConfig,
) -> Result<ImageCaptionLoader, DatasetError> {
    // reject bad knobs before touching storage or tokenizer files
    config.crop_policy()?;
    config.caption_selection.parse::<CaptionSelection>()?;
    let pairs = pair_locations(remote.into(), local.into())?;

    let sdxl = config.resolve_sdxl();
    if sdxl {
        info!("Detected SDXL tokenizer, using dual tokenizers and microconditioning.");
    }
    let tokenizer = load_tokenizer(&config.tokenizer_name_or_path, sdxl)?;
    build_from_pairs(pairs, batch_size, config, tokenizer).await
}

/// Same as [`build_streaming_image_caption_dataloader`] with a caller-supplied tokenizer.
pub async fn build_streaming_image_caption_dataloader_with_tokenizer(
    remote: impl Into<Locations>,
    local: impl Into<Locations>,
    batch_size: usize,
    config: BuildConfig,
    tokenizer: Arc<dyn CaptionTokenizer>,
) -> Result<ImageCaptionLoader, DatasetError> {
    let pairs = pair_locations(remote.into(), local.into())?;
    build_from_pairs(pairs, batch_size, config, tokenizer).await
}

async fn build_from_pairs(
    pairs: Vec<(String, String)>,
    batch_size: usize,
    config: BuildConfig,
    tokenizer: Arc<dyn CaptionTokenizer>,
) -> Result<ImageCaptionLoader, DatasetError> {
    let pipeline = config.build_pipeline(tokenizer)?;

    let streams: Vec<ShardStream> =
        pairs.into_iter().map(|(r, l)| ShardStream::new(r, l)).collect();
    info!("Building image-caption loader over {} stream(s)", streams.len());

    let mut source_opts = config.source.clone();
    if source_opts.fields.is_none() {
        source_opts = source_opts.fields([config.image_key.clone(), config.caption_key.clone()]);
    }
    let source = ShardSource::open(streams, source_opts).await?;

    let loader_opts = config.loader.clone().with_batch_size(batch_size);
    debug!("loader options: {:?}", loader_opts);

    let dataset = StreamingImageCaptionDataset::with_seed(source, pipeline, config.seed);
    Ok(DataLoader::new(dataset, loader_opts))
}
