// src/uri_utils.rs
//! URI helpers for shard locations.
//!
//! Remote locations are written as URIs (`s3://bucket/prefix/`,
//! `file:///data/shards/`) or plain filesystem paths. A location may contain
//! `{start...end}` ranges, which expand into one location per value so that a
//! single argument can name many shard directories.

use anyhow::{Context, Result, bail};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;

static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{(\d+)\.\.\.(\d+)\}").expect("static regex"));

/// Expand a location template containing `{start...end}` range patterns
///
/// # Examples
///
/// ```
/// use capdlio::uri_utils::expand_uri_template;
///
/// let uris = expand_uri_template("s3://laion/part-{1...3}/").unwrap();
/// assert_eq!(uris, vec!["s3://laion/part-1/", "s3://laion/part-2/", "s3://laion/part-3/"]);
/// ```
pub fn expand_uri_template(template: &str) -> Result<Vec<String>> {
    let mut ranges = Vec::new();
    for cap in RANGE_RE.captures_iter(template) {
        let start: u64 = cap[1].parse().context("Invalid range start number")?;
        let end: u64 = cap[2].parse().context("Invalid range end number")?;
        if start > end {
            bail!("Invalid range: start ({}) > end ({})", start, end);
        }
        ranges.push((start, end, cap[0].to_string()));
    }

    // Expand all ranges (cartesian product for multiple ranges)
    let mut results = vec![template.to_string()];
    for (start, end, pattern) in ranges {
        let pattern = &pattern;
        results = results
            .iter()
            .flat_map(|current| {
                (start..=end).map(move |i| current.replacen(pattern, &i.to_string(), 1))
            })
            .collect();
    }
    Ok(results)
}

/// Turn a bare path into a `file://` URI; URIs pass through unchanged.
pub fn normalize_location(location: &str) -> String {
    if location.contains("://") {
        location.to_string()
    } else {
        format!("file://{}", location)
    }
}

/// Map a `file://` URI to a local path.
pub fn file_uri_to_path(uri: &str) -> Result<PathBuf> {
    let path = uri
        .strip_prefix("file://")
        .with_context(|| format!("Expected file:// scheme, got: {}", uri))?;
    if path.is_empty() {
        bail!("Empty path in file URI");
    }
    Ok(PathBuf::from(path))
}

/// Split an `s3://bucket/key` URI into `(bucket, key)`.
pub fn parse_s3_uri(uri: &str) -> Result<(String, String)> {
    let trimmed = uri
        .strip_prefix("s3://")
        .context("URI must start with s3://")?;
    match trimmed.split_once('/') {
        Some((bucket, key)) => Ok((bucket.to_owned(), key.to_owned())),
        None => Ok((trimmed.to_owned(), String::new())),
    }
}

/// Split an object name into `(stem, field)` at the first `.` of its last path component.
///
/// `shards/000017.caption` → `("000017", "caption")`. Names without a dot, or
/// hidden files, carry no field and return `None`.
pub fn split_record_name(uri: &str) -> Option<(&str, &str)> {
    let name = uri.rsplit('/').next()?;
    let (stem, field) = name.split_once('.')?;
    if stem.is_empty() || field.is_empty() {
        return None;
    }
    Some((stem, field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_simple_range() {
        let result = expand_uri_template("s3://bucket-{1...3}/").unwrap();
        assert_eq!(result, vec!["s3://bucket-1/", "s3://bucket-2/", "s3://bucket-3/"]);
    }

    #[test]
    fn test_expand_multiple_ranges() {
        let result = expand_uri_template("file:///mnt/d{1...2}/shard-{10...11}/").unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.contains(&"file:///mnt/d2/shard-10/".to_string()));
    }

    #[test]
    fn test_expand_invalid_range() {
        let result = expand_uri_template("s3://bucket-{5...3}/");
        assert!(result.unwrap_err().to_string().contains("Invalid range"));
    }

    #[test]
    fn test_expand_no_range() {
        assert_eq!(expand_uri_template("s3://bucket/path/").unwrap(), vec!["s3://bucket/path/"]);
    }

    #[test]
    fn test_normalize_and_map_paths() {
        assert_eq!(normalize_location("/data/shards"), "file:///data/shards");
        assert_eq!(normalize_location("s3://b/p/"), "s3://b/p/");
        assert_eq!(file_uri_to_path("file:///data/x").unwrap(), PathBuf::from("/data/x"));
        assert!(file_uri_to_path("s3://b/x").is_err());
    }

    #[test]
    fn test_parse_s3_uri() {
        assert_eq!(parse_s3_uri("s3://b/p/q").unwrap(), ("b".into(), "p/q".into()));
        assert_eq!(parse_s3_uri("s3://b").unwrap(), ("b".into(), "".into()));
    }

    #[test]
    fn test_split_record_name() {
        assert_eq!(split_record_name("s3://b/p/000017.caption"), Some(("000017", "caption")));
        assert_eq!(split_record_name("/d/0001.image.jpg"), Some(("0001", "image.jpg")));
        assert_eq!(split_record_name("/d/README"), None);
        assert_eq!(split_record_name("/d/.hidden"), None);
    }
}
