// src/s3_client.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Global S3 client plus the two calls the shard source needs: a whole-object
//! GET and a paginated listing.
//!
//! Region and credentials come from the default AWS provider chain. Set
//! `AWS_ENDPOINT_URL` to talk to a non-AWS endpoint (MinIO, Ceph, ...); the
//! client then switches to path-style addressing.

use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::{Client, config::Region};
use bytes::Bytes;
use std::env;
use tokio::sync::OnceCell;
use tracing::debug;

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------
pub const DEFAULT_REGION: &str = "us-east-1";

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Return the process-wide S3 client, building it on first use.
pub async fn client() -> Result<&'static Client> {
    CLIENT
        .get_or_try_init(|| async {
            let region =
                RegionProviderChain::default_provider().or_else(Region::new(DEFAULT_REGION));
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;

            let mut builder = aws_sdk_s3::config::Builder::from(&shared);
            if let Ok(endpoint) = env::var("AWS_ENDPOINT_URL") {
                debug!("Using custom S3 endpoint {}", endpoint);
                builder = builder.endpoint_url(endpoint).force_path_style(true);
            }
            Ok::<_, anyhow::Error>(Client::from_conf(builder.build()))
        })
        .await
}

/// Fetch a whole object into memory.
pub async fn get_object(bucket: &str, key: &str) -> Result<Bytes> {
    let client = client().await?;
    let resp = client
        .get_object()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .with_context(|| format!("get_object failed for s3://{}/{}", bucket, key))?;
    let data = resp
        .body
        .collect()
        .await
        .with_context(|| format!("reading body of s3://{}/{}", bucket, key))?;
    Ok(data.into_bytes())
}

/// List every key under `prefix`, following continuation tokens.
pub async fn list_objects(bucket: &str, prefix: &str) -> Result<Vec<String>> {
    let client = client().await?;
    let mut keys = Vec::new();
    let mut cont: Option<String> = None;
    loop {
        let mut req = client.list_objects_v2().bucket(bucket).prefix(prefix);
        if let Some(token) = &cont {
            req = req.continuation_token(token);
        }
        let resp = req.send().await.context("list_objects_v2 failed")?;
        for obj in resp.contents() {
            if let Some(k) = obj.key() {
                keys.push(k.to_owned());
            }
        }
        match resp.next_continuation_token() {
            Some(token) => cont = Some(token.to_string()),
            None => break,
        }
    }
    debug!("Listed {} keys under s3://{}/{}", keys.len(), bucket, prefix);
    Ok(keys)
}
