// src/constants.rs
//
// Centralized constants for capdlio to avoid hardcoded values throughout the codebase

/// Tokenizer used when the caller does not name one.
pub const DEFAULT_TOKENIZER: &str = "stabilityai/stable-diffusion-2-base";

/// Identifier that switches the builder into dual-tokenizer (SDXL) mode.
pub const SDXL_TOKENIZER: &str = "stabilityai/stable-diffusion-xl-base-1.0";

/// Environment variable naming a directory under which tokenizer identifiers are resolved
pub const TOKENIZER_ROOT_ENV: &str = "CAPDLIO_TOKENIZER_ROOT";

/// Subfolders holding the first and second tokenizer of a diffusion checkpoint
pub const TOKENIZER_SUBFOLDER: &str = "tokenizer";
pub const TOKENIZER_2_SUBFOLDER: &str = "tokenizer_2";

/// Fallback sequence length when `tokenizer_config.json` has no `model_max_length` (CLIP: 77)
pub const DEFAULT_MODEL_MAX_LENGTH: usize = 77;

/// Default side length for the square crop policies (pixels)
pub const DEFAULT_RESIZE_SIZE: u32 = 256;

/// Default record field names
pub const DEFAULT_IMAGE_KEY: &str = "image";
pub const DEFAULT_CAPTION_KEY: &str = "caption";

/// Default mean / std used by the default `Normalize` transform (maps [0,1] to [-1,1])
pub const DEFAULT_NORMALIZE_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const DEFAULT_NORMALIZE_STD: [f32; 3] = [0.5, 0.5, 0.5];

// ============================================================================
// Output sample field names
// ============================================================================

pub const FIELD_IMAGE: &str = "image";
pub const FIELD_CAPTIONS: &str = "captions";
pub const FIELD_ATTENTION_MASK: &str = "attention_mask";
pub const FIELD_COND_CROPS_COORDS_TOP_LEFT: &str = "cond_crops_coords_top_left";
pub const FIELD_COND_ORIGINAL_SIZE: &str = "cond_original_size";
pub const FIELD_COND_TARGET_SIZE: &str = "cond_target_size";
pub const FIELD_DROP_CAPTION_MASK: &str = "drop_caption_mask";

// ============================================================================
// SDXL aspect-ratio buckets
// ============================================================================
//
// (height, width) training resolutions used by the random aspect-ratio crop.
// Ordered from widest (h/w = 0.25) to tallest (h/w = 4.0).

pub const SDXL_ASPECT_BUCKETS: [(u32, u32); 40] = [
    (512, 2048), (512, 1984), (512, 1920), (512, 1856),
    (576, 1792), (576, 1728), (576, 1664), (640, 1600),
    (640, 1536), (704, 1472), (704, 1408), (704, 1344),
    (768, 1344), (768, 1280), (832, 1216), (832, 1152),
    (896, 1152), (896, 1088), (960, 1088), (960, 1024),
    (1024, 1024), (1024, 960), (1088, 960), (1088, 896),
    (1152, 896), (1152, 832), (1216, 832), (1280, 768),
    (1344, 768), (1408, 704), (1472, 704), (1536, 640),
    (1600, 640), (1664, 576), (1728, 576), (1792, 576),
    (1856, 512), (1920, 512), (1984, 512), (2048, 512),
];
