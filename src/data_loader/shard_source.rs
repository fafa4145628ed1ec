// src/data_loader/shard_source.rs
//
// Record-level dataset over one or more shard locations.
//
// Objects are grouped into records by name: everything before the first `.`
// of the file name is the record stem, the rest is the field name
// (`000017.jpg` + `000017.caption` -> one record with fields `jpg`, `caption`).

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::data_loader::{Dataset, DatasetError};
use crate::object_store::{store_for_uri, ObjectStore};
use crate::record::{FieldValue, Record};
use crate::uri_utils::{
    expand_uri_template, file_uri_to_path, normalize_location, split_record_name,
};

/// One `(remote, local)` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStream {
    pub remote: String,
    pub local: String,
}

impl ShardStream {
    pub fn new(remote: impl Into<String>, local: impl Into<String>) -> Self {
        Self { remote: remote.into(), local: local.into() }
    }

    /// Expand `{a...b}` ranges in `remote`.
    ///
    /// When `local` expands to the same number of locations the two lists are
    /// zipped; otherwise each expanded remote caches under `local/<i>`.
    pub fn expand(&self) -> anyhow::Result<Vec<ShardStream>> {
        let remotes = expand_uri_template(&self.remote)?;
        if remotes.len() == 1 {
            return Ok(vec![self.clone()]);
        }
        let locals = expand_uri_template(&self.local)?;
        if locals.len() == remotes.len() {
            return Ok(remotes
                .into_iter()
                .zip(locals)
                .map(|(r, l)| ShardStream::new(r, l))
                .collect());
        }
        let base = self.local.trim_end_matches('/');
        Ok(remotes
            .into_iter()
            .enumerate()
            .map(|(i, r)| ShardStream::new(r, format!("{base}/{i}")))
            .collect())
    }
}

/// Knobs for the shard source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Write fetched objects under the stream's local directory.
    pub cache_to_local: bool,
    /// Only these field names are kept; `None` keeps every field.
    pub fields: Option<Vec<String>>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self { cache_to_local: true, fields: None }
    }
}

impl SourceOptions {
    pub fn cache_to_local(mut self, on: bool) -> Self {
        self.cache_to_local = on;
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

struct BoundStream {
    store: Arc<dyn ObjectStore>,
    local_dir: PathBuf,
}

#[derive(Debug, Clone)]
struct RecordEntry {
    stream: usize,
    /// Path of the record relative to its stream, without the field suffix.
    key: String,
    /// `(field name, object URI)`, sorted by field name.
    fields: Vec<(String, String)>,
}

/// Map-style dataset of raw records, `Item = Record` with `FieldValue::Bytes` fields.
pub struct ShardSource {
    streams: Vec<BoundStream>,
    records: Vec<RecordEntry>,
    opts: SourceOptions,
}

impl std::fmt::Debug for ShardSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSource")
            .field("streams", &self.streams.len())
            .field("records", &self.records.len())
            .field("opts", &self.opts)
            .finish()
    }
}

impl ShardSource {
    /// List every stream and index its records.
    ///
    /// Records are ordered by stream, then by key within a stream.
    pub async fn open(
        streams: Vec<ShardStream>,
        opts: SourceOptions,
    ) -> Result<Self, DatasetError> {
        let mut expanded = Vec::new();
        for s in &streams {
            expanded.extend(s.expand()?);
        }

        let mut bound = Vec::with_capacity(expanded.len());
        let mut records = Vec::new();
        for (idx, s) in expanded.iter().enumerate() {
            let remote = normalize_location(&s.remote);
            let local_dir = file_uri_to_path(&normalize_location(&s.local))
                .with_context(|| {
                    format!("local cache location {:?} must be a filesystem path", s.local)
                })?;
            let store: Arc<dyn ObjectStore> = Arc::from(store_for_uri(&remote)?);

            let uris = store
                .list(&remote)
                .await
                .with_context(|| format!("failed to list shard location {remote}"))?;
            let before = records.len();
            records.extend(group_records(idx, &remote, uris, opts.fields.as_deref()));
            debug!("Indexed {} records under {}", records.len() - before, remote);

            bound.push(BoundStream { store, local_dir });
        }

        info!("Shard source ready: {} stream(s), {} record(s)", bound.len(), records.len());
        Ok(Self { streams: bound, records, opts })
    }

    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Stream-relative key of record `index`, e.g. `part-0/000017`.
    pub fn record_key(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(|r| r.key.as_str())
    }

    async fn fetch_field(
        &self,
        entry: &RecordEntry,
        field: &str,
        uri: &str,
    ) -> Result<Bytes, DatasetError> {
        let stream = &self.streams[entry.stream];
        let cached = stream.local_dir.join(format!("{}.{}", entry.key, field));

        if fs::try_exists(&cached).await.unwrap_or(false) {
            debug!("cache hit {}", cached.display());
            let data = fs::read(&cached)
                .await
                .with_context(|| format!("failed to read cached object {}", cached.display()))?;
            return Ok(Bytes::from(data));
        }

        debug!("fetching {}", uri);
        let data = stream.store.get(uri).await?;

        if self.opts.cache_to_local {
            if let Err(e) = write_cache(&cached, &data).await {
                warn!("failed to cache {} at {}: {:#}", uri, cached.display(), e);
            }
        }
        Ok(data)
    }
}

async fn write_cache(path: &std::path::Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    // write-then-rename so readers never see a partial object
    let tmp = path.with_extension(format!(
        "{}.partial",
        path.extension().and_then(|e| e.to_str()).unwrap_or_default()
    ));
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn group_records(
    stream: usize,
    remote: &str,
    uris: Vec<String>,
    keep: Option<&[String]>,
) -> Vec<RecordEntry> {
    let mut grouped: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for uri in uris {
        let Some((stem, field)) = split_record_name(&uri) else {
            continue;
        };
        if let Some(keep) = keep {
            if !keep.iter().any(|k| k == field) {
                continue;
            }
        }
        let name_len = stem.len() + 1 + field.len();
        let rel = uri.strip_prefix(remote).unwrap_or(&uri[uri.len() - name_len..]);
        let rel = rel.trim_start_matches('/');
        let dir = &rel[..rel.len().saturating_sub(name_len)];
        let key = format!("{dir}{stem}");
        let field = field.to_string();
        grouped.entry(key).or_default().push((field, uri));
    }

    grouped
        .into_iter()
        .map(|(key, mut fields)| {
            fields.sort();
            RecordEntry { stream, key, fields }
        })
        .collect()
}

#[async_trait]
impl Dataset for ShardSource {
    type Item = Record;

    fn len(&self) -> Option<usize> {
        Some(self.records.len())
    }

    async fn get(&self, index: usize) -> Result<Self::Item, DatasetError> {
        let entry = self.records.get(index).ok_or(DatasetError::IndexOutOfRange(index))?;
        let mut record = Record::new();
        for (field, uri) in &entry.fields {
            let data = self.fetch_field(entry, field, uri).await?;
            record.insert(field.clone(), FieldValue::Bytes(data));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_stem_and_keeps_subdirectories() {
        let uris = vec![
            "s3://b/p/000001.caption".to_string(),
            "s3://b/p/000001.jpg".to_string(),
            "s3://b/p/000000.jpg".to_string(),
            "s3://b/p/sub/000001.jpg".to_string(),
            "s3://b/p/README".to_string(),
        ];
        let recs = group_records(0, "s3://b/p/", uris, None);
        let keys: Vec<_> = recs.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["000000", "000001", "sub/000001"]);
        assert_eq!(recs[1].fields.len(), 2);
        assert_eq!(recs[1].fields[0].0, "caption");
    }

    #[test]
    fn field_filter_drops_other_objects() {
        let uris = vec!["file:///d/1.jpg".to_string(), "file:///d/1.json".to_string()];
        let keep = vec!["jpg".to_string()];
        let recs = group_records(0, "file:///d", uris, Some(&keep));
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].fields, vec![("jpg".to_string(), "file:///d/1.jpg".to_string())]);
    }

    #[test]
    fn templates_expand_with_per_index_cache_dirs() {
        let s = ShardStream::new("s3://b/part-{0...2}/", "/tmp/cache/");
        let out = s.expand().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], ShardStream::new("s3://b/part-2/", "/tmp/cache/2"));

        let paired = ShardStream::new("s3://b/p{1...2}", "/c/p{1...2}").expand().unwrap();
        assert_eq!(paired[1], ShardStream::new("s3://b/p2", "/c/p2"));
    }
}
