//! Shard source and builder tests over local shard directories.

mod common;

use capdlio::{
    build_streaming_image_caption_dataloader, collated, BuildConfig, ConfigError, Dataset,
    DatasetError, FieldValue, LoaderOptions, ShardSource, ShardStream, SourceOptions,
};
use common::{write_sdxl_tokenizer, write_shard_dir, write_tokenizer};
use futures_util::StreamExt;
use tempfile::TempDir;

fn caption_text(field: Option<&FieldValue>) -> String {
    match field {
        Some(FieldValue::Bytes(b)) => String::from_utf8(b.to_vec()).unwrap(),
        other => panic!("unexpected caption field {other:?}"),
    }
}

#[tokio::test]
async fn groups_objects_into_records_across_streams() {
    let tmp = TempDir::new().unwrap();
    let a = tmp.path().join("remote-a");
    let b = tmp.path().join("remote-b");
    write_shard_dir(&a, &[("000001", 8, 8, "a cat"), ("000000", 8, 8, "a dog")]);
    write_shard_dir(&b, &[("000000", 4, 4, "the beach")]);
    std::fs::write(a.join("README"), b"not a record").unwrap();

    let streams = vec![
        ShardStream::new(a.to_str().unwrap(), tmp.path().join("cache-a").to_str().unwrap()),
        ShardStream::new(
            format!("file://{}", b.display()),
            tmp.path().join("cache-b").to_str().unwrap(),
        ),
    ];
    let opts = SourceOptions::default().cache_to_local(false);
    let source = ShardSource::open(streams, opts).await.unwrap();

    assert_eq!(source.len(), Some(3));
    assert_eq!(source.num_streams(), 2);
    assert_eq!(source.record_key(0), Some("000000"));

    let first = source.get(0).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(caption_text(first.get("caption")), "a dog");
    assert_eq!(caption_text(source.get(2).await.unwrap().get("caption")), "the beach");

    assert!(matches!(source.get(3).await, Err(DatasetError::IndexOutOfRange(3))));
    assert!(!tmp.path().join("cache-a").exists());
}

#[tokio::test]
async fn fetched_objects_are_cached_and_served_locally() {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("remote");
    let local = tmp.path().join("local");
    write_shard_dir(&remote, &[("000007", 8, 8, "a dog")]);

    let streams = vec![ShardStream::new(remote.to_str().unwrap(), local.to_str().unwrap())];
    let source = ShardSource::open(streams, SourceOptions::default()).await.unwrap();
    source.get(0).await.unwrap();

    let cached = local.join("000007.caption");
    assert_eq!(std::fs::read_to_string(&cached).unwrap(), "a dog");
    assert!(local.join("000007.image").exists());

    // the local copy wins over the remote object from now on
    std::fs::write(&cached, "a puppy").unwrap();
    std::fs::remove_file(remote.join("000007.caption")).unwrap();
    assert_eq!(caption_text(source.get(0).await.unwrap().get("caption")), "a puppy");
}

#[tokio::test]
async fn missing_remote_fails_to_open() {
    let tmp = TempDir::new().unwrap();
    let streams = vec![ShardStream::new(
        tmp.path().join("absent").to_str().unwrap(),
        tmp.path().join("cache").to_str().unwrap(),
    )];
    assert!(matches!(
        ShardSource::open(streams, SourceOptions::default()).await,
        Err(DatasetError::Backend(_))
    ));
}

#[tokio::test]
async fn builder_end_to_end_batches() {
    let tmp = TempDir::new().unwrap();
    let tok = tmp.path().join("tok");
    write_tokenizer(&tok, 8);
    let remote = tmp.path().join("shards");
    write_shard_dir(
        &remote,
        &[
            ("000000", 40, 30, "a dog"),
            ("000001", 30, 40, r#"["a puppy", "a dog"]"#),
            ("000002", 64, 64, "a cat on the beach"),
        ],
    );
    // objects of other fields are not part of the records
    std::fs::write(remote.join("000000.json"), b"{}").unwrap();

    let config = BuildConfig {
        tokenizer_name_or_path: tok.to_str().unwrap().to_string(),
        resize_size: 16,
        loader: LoaderOptions::default().num_workers(2),
        ..Default::default()
    };
    let loader = build_streaming_image_caption_dataloader(
        remote.to_str().unwrap(),
        tmp.path().join("cache").to_str().unwrap(),
        2,
        config,
    )
    .await
    .unwrap();
    assert_eq!(loader.num_batches(), Some(2));

    let batches: Vec<_> = collated(loader.stream()).collect().await;
    let first = batches[0].as_ref().unwrap();
    assert_eq!(first.images.shape(), &[2, 3, 16, 16]);
    assert_eq!(first.captions.shape(), &[2, 8]);
    assert_eq!(first.attention_mask.shape(), &[2, 8]);
    assert!(first.cond_original_size.is_none());
    assert_eq!(first.drop_caption_mask.to_vec(), vec![1.0, 1.0]);

    let last = batches[1].as_ref().unwrap();
    assert_eq!(last.len(), 1);
    assert!(!tmp.path().join("cache").join("000000.json").exists());
}

#[tokio::test]
async fn builder_detects_sdxl_from_override_and_emits_microconditioning() {
    let tmp = TempDir::new().unwrap();
    let tok = tmp.path().join("xl");
    write_sdxl_tokenizer(&tok, 8);
    let remote = tmp.path().join("shards");
    write_shard_dir(&remote, &[("a", 50, 20, "a dog"), ("b", 20, 50, "a cat")]);

    let config = BuildConfig {
        tokenizer_name_or_path: tok.to_str().unwrap().to_string(),
        sdxl: Some(true),
        crop_type: None,
        ..Default::default()
    };
    let loader = build_streaming_image_caption_dataloader(
        remote.to_str().unwrap(),
        tmp.path().join("cache").to_str().unwrap(),
        1,
        config,
    )
    .await
    .unwrap();

    let sample = loader.dataset().get(0).await.unwrap();
    assert_eq!(sample.captions.shape(), &[2, 8]);
    let cond = sample.microcond.unwrap();
    assert_eq!(cond.original_size.to_vec(), vec![50, 20]);
    assert_eq!(cond.target_size.to_vec(), vec![50, 20]);
}

#[tokio::test]
async fn builder_rejects_unknown_crop_type() {
    let config = BuildConfig { crop_type: Some("diagonal".into()), ..Default::default() };
    let err = build_streaming_image_caption_dataloader("/nowhere", "/nowhere", 2, config)
        .await
        .unwrap_err();
    assert!(matches!(err, DatasetError::Config(ConfigError::InvalidConfig(_))));
}

#[tokio::test]
async fn builder_reports_missing_tokenizer() {
    let tmp = TempDir::new().unwrap();
    let remote = tmp.path().join("shards");
    write_shard_dir(&remote, &[("a", 8, 8, "a dog")]);
    let config = BuildConfig {
        tokenizer_name_or_path: tmp.path().join("no-tokenizer").to_str().unwrap().to_string(),
        ..Default::default()
    };
    let err = build_streaming_image_caption_dataloader(
        remote.to_str().unwrap(),
        tmp.path().join("cache").to_str().unwrap(),
        1,
        config,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DatasetError::Tokenizer(_)));
}
