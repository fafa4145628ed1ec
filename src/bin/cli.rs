//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! CLI supporting `inspect` and `sample`.
//!
//! Examples:
//! ```bash
//! capdlio-cli inspect s3://laion/shards/ /tmp/laion-cache -b 8 -n 2
//! capdlio-cli inspect 's3://laion/part-{0...3}/' /tmp/laion-cache --crop aspect_ratio --sdxl
//! capdlio-cli sample  /data/shards/ /tmp/cache --index 17 --tokenizer ./sd2-base
//! ```

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use futures_util::StreamExt;
use std::io::{self, ErrorKind, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

use capdlio::constants::{
    DEFAULT_CAPTION_KEY, DEFAULT_IMAGE_KEY, DEFAULT_RESIZE_SIZE, DEFAULT_TOKENIZER,
};
use capdlio::{
    build_streaming_image_caption_dataloader, collated, BuildConfig, CropPolicy, Dataset, ImageData,
    LoaderOptions, SourceOptions,
};

/// Macro to safely print with broken pipe handling
macro_rules! safe_println {
    ($($arg:tt)*) => {
        match writeln!(io::stdout(), $($arg)*) {
            Ok(_) => {},
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                // Gracefully exit on broken pipe (e.g., when piped to head/tail)
                std::process::exit(0);
            }
            Err(e) => return Err(e.into())
        }
    };
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[arg(short = 'v',
        long,
        action = ArgAction::Count,
        help = "Increase log verbosity: -v = Info, -vv = Debug",
    )]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build a loader and print the shape of the first collated batches.
    Inspect {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Batch size
        #[arg(short = 'b', long, default_value_t = 4)]
        batch_size: usize,

        /// Number of batches to print
        #[arg(short = 'n', long, default_value_t = 1)]
        batches: usize,

        /// Concurrent record fetches (0 = number of CPUs)
        #[arg(short = 'j', long, default_value_t = 0)]
        workers: usize,

        /// Shuffle record order
        #[arg(long)]
        shuffle: bool,
    },

    /// Transform a single record and print what came out.
    Sample {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Record index
        #[arg(short = 'i', long, default_value_t = 0)]
        index: usize,
    },
}

#[derive(Args)]
struct PipelineArgs {
    /// Remote shard location (s3://bucket/prefix/, file:// URI or path); `{a...b}` ranges allowed
    remote: String,

    /// Local cache directory
    local: String,

    /// Tokenizer directory, or a name under $CAPDLIO_TOKENIZER_ROOT
    #[arg(short = 't', long, default_value = DEFAULT_TOKENIZER)]
    tokenizer: String,

    /// Force dual-tokenizer (SDXL) mode
    #[arg(long)]
    sdxl: bool,

    /// square | random | aspect_ratio | none
    #[arg(long, default_value = "square")]
    crop: String,

    #[arg(long, default_value_t = DEFAULT_RESIZE_SIZE)]
    resize: u32,

    /// first | random
    #[arg(long, default_value = "first")]
    caption_selection: String,

    #[arg(long, default_value_t = 0.0)]
    caption_drop_prob: f64,

    #[arg(long, default_value_t = 0.0)]
    microcond_drop_prob: f64,

    #[arg(long, default_value = DEFAULT_IMAGE_KEY)]
    image_key: String,

    #[arg(long, default_value = DEFAULT_CAPTION_KEY)]
    caption_key: String,

    /// Seed for shuffling and augmentation
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Do not write fetched objects to the local directory
    #[arg(long)]
    no_cache: bool,
}

impl PipelineArgs {
    fn build_config(&self, loader: LoaderOptions) -> BuildConfig {
        BuildConfig {
            tokenizer_name_or_path: self.tokenizer.clone(),
            caption_drop_prob: self.caption_drop_prob,
            microcond_drop_prob: self.microcond_drop_prob,
            resize_size: self.resize,
            caption_selection: self.caption_selection.clone(),
            crop_type: Some(self.crop.clone()),
            image_key: self.image_key.clone(),
            caption_key: self.caption_key.clone(),
            sdxl: self.sdxl.then_some(true),
            seed: self.seed,
            source: SourceOptions::default().cache_to_local(!self.no_cache),
            loader,
            ..Default::default()
        }
    }
}

fn describe_image(image: &ImageData) -> String {
    match image {
        ImageData::Bitmap(b) => format!("bitmap {}x{}", b.width(), b.height()),
        ImageData::Tensor(t) => format!("tensor {:?}", t.shape()),
    }
}

fn describe_crop(policy: &CropPolicy) -> String {
    match policy {
        CropPolicy::LargestCenterSquare { size } => format!("center square {size}"),
        CropPolicy::RandomCropSquare { size } => format!("random square {size}"),
        CropPolicy::RandomCropAspectRatio { buckets } => {
            format!("aspect ratio ({} buckets)", buckets.len())
        }
    }
}

async fn inspect_cmd(
    pipeline: PipelineArgs,
    batch_size: usize,
    batches: usize,
    workers: usize,
    shuffle: bool,
) -> Result<()> {
    let loader_opts = LoaderOptions::default()
        .num_workers(workers)
        .shuffle(shuffle, pipeline.seed);
    let config = pipeline.build_config(loader_opts);
    let loader = build_streaming_image_caption_dataloader(
        pipeline.remote.as_str(),
        pipeline.local.as_str(),
        batch_size,
        config,
    )
    .await
    .context("failed to build loader")?;

    safe_println!(
        "records: {}  batches per epoch: {}",
        loader.dataset().len().unwrap_or_default(),
        loader.num_batches().unwrap_or_default()
    );

    let mut stream = collated(loader.stream()).take(batches).enumerate();
    while let Some((i, batch)) = stream.next().await {
        let batch = batch?;
        safe_println!("batch {i}:");
        for (name, shape) in batch.shapes() {
            safe_println!("  {name:<28} {shape:?}");
        }
    }
    Ok(())
}

async fn sample_cmd(pipeline: PipelineArgs, index: usize) -> Result<()> {
    let config = pipeline.build_config(LoaderOptions::default());
    let loader = build_streaming_image_caption_dataloader(
        pipeline.remote.as_str(),
        pipeline.local.as_str(),
        1,
        config,
    )
    .await
    .context("failed to build loader")?;

    let dataset = loader.dataset();
    if let Some(key) = dataset.source().record_key(index) {
        info!("record {index} is {key}");
    }
    let record = dataset.source().get(index).await?;
    let fields: Vec<&str> = record.field_names().collect();
    let sample = dataset.get(index).await?;

    safe_println!("fields:            {}", fields.join(", "));
    match dataset.pipeline().crop() {
        Some(policy) => safe_println!("crop:              {}", describe_crop(policy)),
        None => safe_println!("crop:              none"),
    }
    safe_println!("image:             {}", describe_image(&sample.image));
    safe_println!("captions:          {:?}", sample.captions.shape());
    safe_println!("  ids:             {}", sample.captions);
    safe_println!("attention_mask:    {}", sample.attention_mask);
    safe_println!("drop_caption_mask: {}", sample.drop_caption_mask);
    if let Some(cond) = &sample.microcond {
        safe_println!("crop top/left:     {}", cond.crop_coords_top_left);
        safe_println!("original size:     {}", cond.original_size);
        safe_println!("target size:       {}", cond.target_size);
    }
    Ok(())
}

/// Main CLI function
#[tokio::main]
async fn main() -> Result<()> {
    // Loads any variables from .env file that are not already set
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",        // no -v: WARN level
        1 => "info",        // -v: INFO level
        _ => "debug",       // -vv or more: DEBUG level
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match cli.cmd {
        Command::Inspect { pipeline, batch_size, batches, workers, shuffle } => {
            inspect_cmd(pipeline, batch_size, batches, workers, shuffle).await?;
        }
        Command::Sample { pipeline, index } => {
            sample_cmd(pipeline, index).await?;
        }
    }
    Ok(())
}
