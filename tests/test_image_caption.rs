//! Sample-pipeline behaviour against a real (tiny) tokenizer.

mod common;

use std::sync::Arc;

use bytes::Bytes;
use capdlio::{
    CaptionSelection, CaptionTokenizer, Compose, ConfigError, CropPolicy, FieldValue,
    HfCaptionTokenizer, PipelineConfig, Record, SampleTransform, SdxlTokenizer,
};
use common::{png_bytes, raw_tokenizer, tokenizer_json, word_tokenizer, A, BOS, DOG, EOS, PAD};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

const L: usize = 8;

fn dog_record(w: u32, h: u32) -> Record {
    Record::new()
        .with_field("image", FieldValue::Bytes(Bytes::from(png_bytes(w, h))))
        .with_field("caption", FieldValue::TextList(vec!["a dog".into(), "a puppy".into()]))
}

/// Second half of the pair has no `<bos>`/`<eos>`, so its mask is shorter.
fn sdxl_tokenizer() -> Arc<SdxlTokenizer> {
    let bert =
        r#""post_processor": {"type": "BertProcessing", "sep": ["<eos>", 2], "cls": ["<bos>", 1]}"#;
    let bare: tokenizers::Tokenizer = tokenizer_json()
        .replace(bert, r#""post_processor": null"#)
        .parse()
        .unwrap();
    let second = HfCaptionTokenizer::new(bare, L, Some("<pad>")).unwrap();
    Arc::new(SdxlTokenizer::new(word_tokenizer(L), second))
}

fn single(config: PipelineConfig) -> SampleTransform {
    let tok = Arc::new(word_tokenizer(L));
    SampleTransform::new(config, None, Some(Compose::diffusion_default()), tok).unwrap()
}

fn sdxl(config: PipelineConfig) -> SampleTransform {
    let config = PipelineConfig { sdxl: true, ..config };
    let tok = sdxl_tokenizer();
    SampleTransform::new(config, None, Some(Compose::diffusion_default()), tok).unwrap()
}

fn ids(sample: &capdlio::Sample) -> Vec<i64> {
    sample.captions.iter().copied().collect()
}

#[test]
fn caption_selection_names() {
    for ok in ["first", "random", "FIRST", "Random"] {
        assert!(ok.parse::<CaptionSelection>().is_ok());
    }
    for bad in ["", "last", "firsts"] {
        assert!(matches!(bad.parse::<CaptionSelection>(), Err(ConfigError::InvalidConfig(_))));
    }
}

#[test]
fn always_dropped_captions_tokenize_as_empty() {
    let empty = word_tokenizer(L).encode("").unwrap().input_ids[0].to_vec();
    assert_eq!(empty, vec![BOS, EOS, PAD, PAD, PAD, PAD, PAD, PAD]);

    for zero in [true, false] {
        let pipe = single(PipelineConfig {
            caption_drop_prob: 1.0,
            zero_dropped_captions: zero,
            ..Default::default()
        });
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for _ in 0..8 {
            let s = pipe.apply(&dog_record(16, 16), &mut rng).unwrap();
            assert_eq!(ids(&s), empty);
            assert_eq!(s.drop_caption_mask, if zero { 0.0 } else { 1.0 });
        }
    }
}

#[test]
fn never_dropped_captions_keep_the_selected_text() {
    let pipe = single(PipelineConfig { zero_dropped_captions: true, ..Default::default() });
    let mut rng = ChaCha20Rng::seed_from_u64(9);
    for _ in 0..8 {
        let s = pipe.apply(&dog_record(16, 16), &mut rng).unwrap();
        assert_eq!(s.drop_caption_mask, 1.0);
        assert_eq!(ids(&s), vec![BOS, A, DOG, EOS, PAD, PAD, PAD, PAD]);
        assert_eq!(s.attention_mask.to_vec(), vec![1, 1, 1, 1, 0, 0, 0, 0]);
    }
}

#[test]
fn microconditioning_is_zero_at_full_drop_probability() {
    let pipe = sdxl(PipelineConfig { microcond_drop_prob: 1.0, ..Default::default() });
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    for _ in 0..8 {
        let cond = pipe.apply(&dog_record(24, 12), &mut rng).unwrap().microcond.unwrap();
        assert!(cond.crop_coords_top_left.iter().all(|v| *v == 0));
        assert!(cond.original_size.iter().all(|v| *v == 0));
        assert!(cond.target_size.iter().all(|v| *v == 0));
    }
}

#[test]
fn microconditioning_vectors_are_dropped_independently() {
    let pipe = sdxl(PipelineConfig { microcond_drop_prob: 0.5, ..Default::default() });
    let mut rng = ChaCha20Rng::seed_from_u64(17);
    let (mut orig_zeroed, mut target_zeroed, mut split) = (0, 0, 0);
    for _ in 0..64 {
        let cond = pipe.apply(&dog_record(24, 12), &mut rng).unwrap().microcond.unwrap();
        let orig = cond.original_size.iter().all(|v| *v == 0);
        let target = cond.target_size.iter().all(|v| *v == 0);
        if !orig {
            assert_eq!(cond.original_size.to_vec(), vec![24, 12]);
        }
        if !target {
            assert_eq!(cond.target_size.to_vec(), vec![24, 12]);
        }
        orig_zeroed += usize::from(orig);
        target_zeroed += usize::from(target);
        split += usize::from(orig != target);
    }
    assert!((8..=56).contains(&orig_zeroed), "original_size zeroed {orig_zeroed}/64");
    assert!((8..=56).contains(&target_zeroed), "target_size zeroed {target_zeroed}/64");
    // a single shared draw would never zero one vector and keep the other
    assert!(split > 0, "vectors were always dropped together");
}

#[test]
fn sdxl_mask_is_or_of_sub_masks() {
    let tok = sdxl_tokenizer();
    let pipe =
        sdxl(PipelineConfig { caption_selection: CaptionSelection::Random, ..Default::default() });
    let mut rng = ChaCha20Rng::seed_from_u64(21);
    for _ in 0..8 {
        let s = pipe.apply(&dog_record(16, 16), &mut rng).unwrap();
        assert_eq!(s.captions.shape(), &[2, L]);
        let text = raw_tokenizer()
            .decode(&s.captions.iter().take(L).map(|&i| i as u32).collect::<Vec<_>>(), true)
            .unwrap();
        let sub = tok.encode(&text).unwrap();
        for i in 0..L {
            let either = sub.attention_mask[0][i] != 0 || sub.attention_mask[1][i] != 0;
            let expected = i64::from(either);
            assert_eq!(s.attention_mask[i], expected, "position {i}");
        }
    }
}

#[test]
fn sizes_round_trip_without_crop() {
    let pipe = sdxl(PipelineConfig::default());
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let s = pipe.apply(&dog_record(40, 30), &mut rng).unwrap();
    let cond = s.microcond.unwrap();
    assert_eq!(cond.original_size.to_vec(), vec![40, 30]);
    assert_eq!(cond.target_size.to_vec(), vec![40, 30]);
    assert_eq!(cond.crop_coords_top_left.to_vec(), vec![0, 0]);
    assert_eq!(s.image.as_tensor().unwrap().shape(), &[3, 30, 40]);
}

#[test]
fn target_size_follows_the_crop() {
    let config = PipelineConfig { sdxl: true, ..Default::default() };
    let pipe = SampleTransform::new(
        config,
        Some(CropPolicy::center_square(16)),
        Some(Compose::diffusion_default()),
        sdxl_tokenizer(),
    )
    .unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let s = pipe.apply(&dog_record(64, 32), &mut rng).unwrap();
    let cond = s.microcond.unwrap();
    assert_eq!(cond.original_size.to_vec(), vec![64, 32]);
    assert_eq!(cond.target_size.to_vec(), vec![16, 16]);
    // 64x32 -> 32x16, centered 16x16 window starts at x = 8
    assert_eq!(cond.crop_coords_top_left.to_vec(), vec![0, 8]);
}

#[test]
fn end_to_end_first_caption_identity_transform() {
    let pipe = SampleTransform::new(
        PipelineConfig::default(),
        None,
        Some(Compose::identity()),
        Arc::new(word_tokenizer(L)),
    )
    .unwrap();
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let s = pipe.apply(&dog_record(256, 256), &mut rng).unwrap();

    let ids: Vec<u32> = s.captions.iter().map(|&i| i as u32).collect();
    assert_eq!(raw_tokenizer().decode(&ids, true).unwrap(), "a dog");
    assert_eq!(s.drop_caption_mask, 1.0);
    assert!(s.microcond.is_none());
    assert_eq!(s.image.as_bitmap().unwrap().dimensions(), (256, 256));
}

#[test]
fn long_captions_are_truncated_to_max_length() {
    let pipe = single(PipelineConfig::default());
    let record = Record::new()
        .with_field("image", FieldValue::Bytes(Bytes::from(png_bytes(8, 8))))
        .with_field(
            "caption",
            FieldValue::Bytes(Bytes::from_static(b"a photo of a dog on the beach with a cat")),
        );
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    let s = pipe.apply(&record, &mut rng).unwrap();
    assert_eq!(s.captions.shape(), &[L]);
    assert_eq!(s.attention_mask.iter().sum::<i64>(), L as i64);
}
