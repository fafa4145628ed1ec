// src/object_store.rs
//
// Pluggable object-store abstraction with consistent URI schemes.
// Supported schemes: s3://, file://

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;

use crate::s3_client;
use crate::uri_utils::parse_s3_uri;

/// A minimal scheme enum so we can route URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    S3,
    File,
    Unknown,
}

/// Best-effort scheme inference from a URI.
pub fn infer_scheme(uri: &str) -> Scheme {
    if uri.starts_with("s3://") { Scheme::S3 }
    else if uri.starts_with("file://") { Scheme::File }
    else { Scheme::Unknown }
}

/// Read-only object store used by the shard source.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get entire object into memory.
    async fn get(&self, uri: &str) -> Result<Bytes>;

    /// List objects under a prefix, recursively. Returns full URIs.
    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>>;
}

/// S3 adapter over the global client in [`crate::s3_client`].
///
/// The trait stays URI-based so consumers don't split bucket/key; the
/// adapter does the parse.
pub struct S3ObjectStore;

impl S3ObjectStore {
    pub fn new() -> Self { Self }
}

impl Default for S3ObjectStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, uri: &str) -> Result<Bytes> {
        if !uri.starts_with("s3://") { bail!("S3ObjectStore expected s3:// URI"); }
        let (bucket, key) = parse_s3_uri(uri)?;
        s3_client::get_object(&bucket, &key).await
    }

    async fn list(&self, uri_prefix: &str) -> Result<Vec<String>> {
        let (bucket, mut key_prefix) = parse_s3_uri(uri_prefix)?;
        // Ensure trailing "/" so sibling prefixes (part-1 vs part-10) don't leak in
        if !key_prefix.is_empty() && !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }
        let keys = s3_client::list_objects(&bucket, &key_prefix).await?;
        // normalize to full URIs
        Ok(keys.into_iter().map(|k| format!("s3://{}/{}", bucket, k)).collect())
    }
}

/// Convenience factory that picks a backend from a URI.
pub fn store_for_uri(uri: &str) -> Result<Box<dyn ObjectStore>> {
    match infer_scheme(uri) {
        Scheme::S3 => Ok(Box::new(S3ObjectStore::new())),
        Scheme::File => Ok(Box::new(crate::file_store::FileSystemObjectStore::new())),
        Scheme::Unknown => {
            bail!("Unable to infer backend from URI: {uri}. Supported schemes: s3://, file://")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_schemes() {
        assert_eq!(infer_scheme("s3://b/k"), Scheme::S3);
        assert_eq!(infer_scheme("file:///tmp"), Scheme::File);
        assert_eq!(infer_scheme("gs://b/k"), Scheme::Unknown);
        assert!(store_for_uri("gs://b/k").is_err());
    }
}
