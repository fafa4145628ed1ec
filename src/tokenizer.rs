// src/tokenizer.rs
//! Caption tokenization on top of HuggingFace `tokenizers`.
//!
//! Two shapes are supported:
//! * a single tokenizer (SD 1.x / 2.x) producing one id sequence, and
//! * the SDXL pair (`tokenizer/` + `tokenizer_2/`) producing two sequences.
//!
//! Every sequence is padded to a fixed length and truncated, so outputs of a
//! given tokenizer always have the same shape.

use ndarray::Array1;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use tracing::debug;

use crate::constants::{
    DEFAULT_MODEL_MAX_LENGTH, TOKENIZER_2_SUBFOLDER, TOKENIZER_ROOT_ENV, TOKENIZER_SUBFOLDER,
};

/// CLIP's end-of-text token, used as the pad token when nothing else is configured.
const CLIP_EOT_TOKEN: &str = "<|endoftext|>";

#[derive(Error, Debug)]
pub enum TokenizerError {
    #[error("tokenizer not found: {0}")]
    NotFound(String),

    #[error("failed to load tokenizer from {path}: {msg}")]
    Load { path: String, msg: String },

    #[error("tokenization failed: {0}")]
    Encode(String),

    #[error("tokenizer outputs disagree: {0}")]
    ShapeMismatch(String),
}

/// Token ids and attention masks, one entry per sub-tokenizer.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerOutput {
    pub input_ids: Vec<Array1<i64>>,
    pub attention_mask: Vec<Array1<i64>>,
}

/// Text → fixed-length ids + mask.
pub trait CaptionTokenizer: Send + Sync + fmt::Debug {
    /// Number of id sequences produced per caption (1, or 2 for SDXL).
    fn num_sequences(&self) -> usize;

    /// Padded length of the first sequence.
    fn max_length(&self) -> usize;

    fn encode(&self, text: &str) -> Result<TokenizerOutput, TokenizerError>;
}

/// One HuggingFace tokenizer with padding/truncation fixed to `max_length`.
#[derive(Clone)]
pub struct HfCaptionTokenizer {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl fmt::Debug for HfCaptionTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HfCaptionTokenizer")
            .field("max_length", &self.max_length)
            .field("vocab_size", &self.tokenizer.get_vocab_size(true))
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfigFile {
    model_max_length: Option<f64>,
    pad_token: Option<serde_json::Value>,
}

impl TokenizerConfigFile {
    fn pad_token(&self) -> Option<String> {
        match self.pad_token.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map.get("content")?.as_str().map(str::to_string),
            _ => None,
        }
    }

    fn max_length(&self) -> Option<usize> {
        // HF stores "unbounded" as a huge float
        self.model_max_length
            .filter(|n| *n >= 1.0 && *n <= 1_000_000.0)
            .map(|n| n as usize)
    }
}

impl HfCaptionTokenizer {
    /// Wrap `tokenizer`, forcing right padding to exactly `max_length` and truncation.
    ///
    /// Padding already configured in the tokenizer keeps its pad token;
    /// otherwise `pad_token` is used, then CLIP's `<|endoftext|>`, then id 0.
    pub fn new(
        mut tokenizer: Tokenizer,
        max_length: usize,
        pad_token: Option<&str>,
    ) -> Result<Self, TokenizerError> {
        let max_length = max_length.max(1);
        let (pad_id, pad_token) = match tokenizer.get_padding() {
            Some(p) => (p.pad_id, p.pad_token.clone()),
            None => {
                let token = pad_token
                    .map(str::to_string)
                    .or_else(|| {
                        tokenizer.token_to_id(CLIP_EOT_TOKEN).map(|_| CLIP_EOT_TOKEN.to_string())
                    })
                    .unwrap_or_default();
                (tokenizer.token_to_id(&token).unwrap_or(0), token)
            }
        };

        tokenizer.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::Fixed(max_length),
            pad_id,
            pad_token,
            ..Default::default()
        }));
        tokenizer
            .with_truncation(Some(TruncationParams { max_length, ..Default::default() }))
            .map_err(|e| TokenizerError::Load { path: "<in-memory>".into(), msg: e.to_string() })?;

        Ok(Self { tokenizer, max_length })
    }

    /// Load `tokenizer.json` (plus `tokenizer_config.json` if present) from `dir`.
    pub fn from_dir(dir: &Path) -> Result<Self, TokenizerError> {
        let file = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&file).map_err(|e| TokenizerError::Load {
            path: file.display().to_string(),
            msg: e.to_string(),
        })?;

        let config = read_tokenizer_config(dir)?;
        let max_length = config.max_length().unwrap_or(DEFAULT_MODEL_MAX_LENGTH);
        debug!("Loaded tokenizer from {} (max_length={})", dir.display(), max_length);
        Self::new(tokenizer, max_length, config.pad_token().as_deref())
    }

    fn encode_one(&self, text: &str) -> Result<(Array1<i64>, Array1<i64>), TokenizerError> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| TokenizerError::Encode(e.to_string()))?;
        let ids = enc.get_ids().iter().map(|&i| i as i64).collect::<Array1<i64>>();
        let mask = enc.get_attention_mask().iter().map(|&m| m as i64).collect::<Array1<i64>>();
        Ok((ids, mask))
    }
}

impl CaptionTokenizer for HfCaptionTokenizer {
    fn num_sequences(&self) -> usize {
        1
    }

    fn max_length(&self) -> usize {
        self.max_length
    }

    fn encode(&self, text: &str) -> Result<TokenizerOutput, TokenizerError> {
        let (ids, mask) = self.encode_one(text)?;
        Ok(TokenizerOutput { input_ids: vec![ids], attention_mask: vec![mask] })
    }
}

/// The SDXL tokenizer pair. Each half pads to its own max length.
#[derive(Debug, Clone)]
pub struct SdxlTokenizer {
    first: HfCaptionTokenizer,
    second: HfCaptionTokenizer,
}

impl SdxlTokenizer {
    pub fn new(first: HfCaptionTokenizer, second: HfCaptionTokenizer) -> Self {
        Self { first, second }
    }

    /// Load `tokenizer/` and `tokenizer_2/` from a checkpoint directory.
    pub fn from_dir(dir: &Path) -> Result<Self, TokenizerError> {
        let first = HfCaptionTokenizer::from_dir(&dir.join(TOKENIZER_SUBFOLDER))?;
        let second = HfCaptionTokenizer::from_dir(&dir.join(TOKENIZER_2_SUBFOLDER))?;
        Ok(Self::new(first, second))
    }
}

impl CaptionTokenizer for SdxlTokenizer {
    fn num_sequences(&self) -> usize {
        2
    }

    fn max_length(&self) -> usize {
        self.first.max_length
    }

    fn encode(&self, text: &str) -> Result<TokenizerOutput, TokenizerError> {
        let (ids_1, mask_1) = self.first.encode_one(text)?;
        let (ids_2, mask_2) = self.second.encode_one(text)?;
        Ok(TokenizerOutput {
            input_ids: vec![ids_1, ids_2],
            attention_mask: vec![mask_1, mask_2],
        })
    }
}

fn read_tokenizer_config(dir: &Path) -> Result<TokenizerConfigFile, TokenizerError> {
    let path = dir.join("tokenizer_config.json");
    if !path.exists() {
        return Ok(TokenizerConfigFile::default());
    }
    let text = std::fs::read_to_string(&path).map_err(|e| TokenizerError::Load {
        path: path.display().to_string(),
        msg: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| TokenizerError::Load {
        path: path.display().to_string(),
        msg: e.to_string(),
    })
}

/// Resolve a tokenizer identifier to a directory.
///
/// An existing path is used as is; otherwise the identifier is looked up
/// under `$CAPDLIO_TOKENIZER_ROOT`.
pub fn resolve_tokenizer_dir(name_or_path: &str) -> Result<PathBuf, TokenizerError> {
    let direct = PathBuf::from(name_or_path);
    if direct.exists() {
        return Ok(direct);
    }
    if let Ok(root) = env::var(TOKENIZER_ROOT_ENV) {
        let candidate = Path::new(&root).join(name_or_path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(TokenizerError::NotFound(format!(
        "{name_or_path} (not a path, and not found under ${TOKENIZER_ROOT_ENV})"
    )))
}

/// Load the caption tokenizer for a checkpoint identifier.
///
/// Single mode prefers the `tokenizer/` subfolder and falls back to the
/// directory itself; dual (SDXL) mode needs both subfolders.
pub fn load_tokenizer(
    name_or_path: &str,
    sdxl: bool,
) -> Result<Arc<dyn CaptionTokenizer>, TokenizerError> {
    let dir = resolve_tokenizer_dir(name_or_path)?;
    if sdxl {
        return Ok(Arc::new(SdxlTokenizer::from_dir(&dir)?));
    }
    let sub = dir.join(TOKENIZER_SUBFOLDER);
    let dir = if sub.join("tokenizer.json").exists() { sub } else { dir };
    Ok(Arc::new(HfCaptionTokenizer::from_dir(&dir)?))
}
