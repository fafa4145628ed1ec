// tests/common/mod.rs
//
// Fixtures shared by the integration tests: a tiny word-level tokenizer,
// PNG-encoded images and on-disk shard directories.
#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

use capdlio::HfCaptionTokenizer;
use tokenizers::Tokenizer;

pub const PAD: i64 = 0;
pub const BOS: i64 = 1;
pub const EOS: i64 = 2;
pub const A: i64 = 4;
pub const DOG: i64 = 5;

/// Lowercasing, whitespace-split word-level tokenizer wrapping sequences in `<bos> .. <eos>`.
pub fn tokenizer_json() -> String {
    r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [
    {"id": 0, "content": "<pad>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 1, "content": "<bos>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 2, "content": "<eos>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
    {"id": 3, "content": "<unk>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
  ],
  "normalizer": {"type": "Lowercase"},
  "pre_tokenizer": {"type": "Whitespace"},
  "post_processor": {"type": "BertProcessing", "sep": ["<eos>", 2], "cls": ["<bos>", 1]},
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": {
      "<pad>": 0, "<bos>": 1, "<eos>": 2, "<unk>": 3,
      "a": 4, "dog": 5, "puppy": 6, "on": 7, "the": 8, "beach": 9,
      "cat": 10, "photo": 11, "of": 12
    },
    "unk_token": "<unk>"
  }
}"#
    .to_string()
}

pub fn raw_tokenizer() -> Tokenizer {
    tokenizer_json().parse().expect("fixture tokenizer parses")
}

pub fn word_tokenizer(max_length: usize) -> HfCaptionTokenizer {
    HfCaptionTokenizer::new(raw_tokenizer(), max_length, Some("<pad>")).expect("tokenizer wraps")
}

/// Write `tokenizer.json` + `tokenizer_config.json` into `dir`.
pub fn write_tokenizer(dir: &Path, max_length: usize) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("tokenizer.json"), tokenizer_json()).unwrap();
    let config = format!(r#"{{"model_max_length": {max_length}, "pad_token": "<pad>"}}"#);
    std::fs::write(dir.join("tokenizer_config.json"), config).unwrap();
}

/// Checkpoint layout with `tokenizer/` and `tokenizer_2/`.
pub fn write_sdxl_tokenizer(dir: &Path, max_length: usize) {
    write_tokenizer(&dir.join("tokenizer"), max_length);
    write_tokenizer(&dir.join("tokenizer_2"), max_length);
}

pub fn gradient(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
}

pub fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(gradient(w, h))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// One record per entry: `<stem>.image` (PNG) and `<stem>.caption` (text).
pub fn write_shard_dir(dir: &Path, records: &[(&str, u32, u32, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (stem, w, h, caption) in records {
        std::fs::write(dir.join(format!("{stem}.image")), png_bytes(*w, *h)).unwrap();
        std::fs::write(dir.join(format!("{stem}.caption")), caption).unwrap();
    }
}
