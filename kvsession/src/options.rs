//! Per-call options and the rules that normalize them.
//!
//! Every option struct enumerates its recognized keys with a documented
//! default. Deserialized configuration uses camelCase names and rejects any
//! key outside that set with [`Error::InvalidOption`].

use std::ops::Bound;
use std::path::PathBuf;

use bytes::Bytes;
use common::{BytesRange, OpenOptions};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::codec::{self, Data};
use crate::error::{Error, Result};
use crate::snapshot::Snapshot;

/// Options for point reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ReadOptions {
    /// Verify checksums of everything read from persistent storage.
    /// Default: false.
    pub verify_checksums: bool,
    /// Let blocks read for this call populate the engine's cache.
    /// Default: true.
    pub fill_cache: bool,
    /// Return raw bytes instead of decoding values as UTF-8 text.
    /// Default: false.
    pub return_bytes: bool,
    /// Read through this snapshot instead of the latest state.
    #[serde(skip)]
    pub snapshot: Option<Snapshot>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            return_bytes: false,
            snapshot: None,
        }
    }
}

impl ReadOptions {
    /// Default options that return raw bytes.
    pub fn bytes() -> Self {
        Self {
            return_bytes: true,
            ..Self::default()
        }
    }

    /// Pins reads to `snapshot`.
    pub fn with_snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.snapshot = Some(snapshot.clone());
        self
    }
}

/// Options for writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct WriteOptions {
    /// Do not complete until the write is durable past the engine's
    /// write-ahead log. Default: false.
    pub sync: bool,
}

impl WriteOptions {
    pub fn sync() -> Self {
        Self { sync: true }
    }
}

/// Options for iterators.
///
/// The read-path fields behave exactly as in [`ReadOptions`]. The optional
/// bounds restrict traversal to `[lower_bound, upper_bound)`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct IteratorOptions {
    /// Default: false.
    pub verify_checksums: bool,
    /// Default: true.
    pub fill_cache: bool,
    /// Default: false.
    pub return_bytes: bool,
    /// Iterate over this snapshot instead of the state at creation.
    #[serde(skip)]
    pub snapshot: Option<Snapshot>,
    /// Inclusive lower bound. In JSON, a string or an array of bytes.
    #[serde(deserialize_with = "deserialize_bound")]
    pub lower_bound: Option<Bytes>,
    /// Exclusive upper bound. In JSON, a string or an array of bytes.
    #[serde(deserialize_with = "deserialize_bound")]
    pub upper_bound: Option<Bytes>,
}

impl Default for IteratorOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
            return_bytes: false,
            snapshot: None,
            lower_bound: None,
            upper_bound: None,
        }
    }
}

impl IteratorOptions {
    /// Default options that return raw bytes.
    pub fn bytes() -> Self {
        Self {
            return_bytes: true,
            ..Self::default()
        }
    }

    /// Restricts traversal to keys starting with `prefix`.
    pub fn prefix(prefix: impl Into<Data>) -> Self {
        let range = BytesRange::prefix(codec::encode(prefix));
        Self {
            lower_bound: bound_key(&range.start),
            upper_bound: bound_key(&range.end),
            ..Self::default()
        }
    }

    /// Restricts traversal to `[lower, upper)`.
    pub fn range(lower: impl Into<Data>, upper: impl Into<Data>) -> Self {
        let range = BytesRange::half_open(codec::encode(lower), codec::encode(upper));
        Self {
            lower_bound: bound_key(&range.start),
            upper_bound: bound_key(&range.end),
            ..Self::default()
        }
    }

    /// Pins the iterator to `snapshot`.
    pub fn with_snapshot(mut self, snapshot: &Snapshot) -> Self {
        self.snapshot = Some(snapshot.clone());
        self
    }

    /// The keys `[lower_bound, upper_bound)` admits.
    pub fn key_range(&self) -> BytesRange {
        BytesRange::new(
            self.lower_bound.clone().map_or(Bound::Unbounded, Bound::Included),
            self.upper_bound.clone().map_or(Bound::Unbounded, Bound::Excluded),
        )
    }
}

/// The key a bound sits on, if it is bounded at all.
pub(crate) fn bound_key(bound: &Bound<Bytes>) -> Option<Bytes> {
    match bound {
        Bound::Included(key) | Bound::Excluded(key) => Some(key.clone()),
        Bound::Unbounded => None,
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoundKey {
    Text(String),
    Bytes(Vec<u8>),
}

fn deserialize_bound<'de, D>(deserializer: D) -> std::result::Result<Option<Bytes>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let key = Option::<BoundKey>::deserialize(deserializer)?;
    Ok(key.map(|key| match key {
        BoundKey::Text(text) => Bytes::from(text),
        BoundKey::Bytes(bytes) => Bytes::from(bytes),
    }))
}

/// Describes a store to open.
///
/// ```json
/// { "path": "/data/users", "options": { "createIfMissing": true } }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Location of the store.
    pub path: PathBuf,
    /// Open-time options; missing keys take their defaults.
    #[serde(default)]
    pub options: OpenOptions,
}

impl Config {
    pub fn new(path: impl Into<PathBuf>, options: OpenOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        from_json(json)
    }
}

/// Parses an options object from JSON.
///
/// Unknown keys and ill-typed values fail with [`Error::InvalidOption`].
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::InvalidOption(e.to_string()))
}

/// Checks open-time options for values no engine can honor.
pub fn validate_open(options: &OpenOptions) -> Result<()> {
    let sizes = [
        ("writeBufferSize", options.write_buffer_size),
        ("maxOpenFiles", options.max_open_files),
        ("blockSize", options.block_size),
        ("blockRestartInterval", options.block_restart_interval),
    ];
    for (name, value) in sizes {
        if value == 0 {
            return Err(Error::InvalidOption(format!("{} must be positive", name)));
        }
    }
    Ok(())
}

/// Lowers the read-path fields to the engine's read options.
pub(crate) fn engine_read_options(verify_checksums: bool, fill_cache: bool) -> common::ReadOptions {
    common::ReadOptions {
        verify_checksums,
        fill_cache,
    }
}

pub(crate) fn engine_write_options(options: WriteOptions) -> common::WriteOptions {
    common::WriteOptions { sync: options.sync }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn should_default_open_options() {
        let options = OpenOptions::default();

        assert!(!options.create_if_missing);
        assert!(!options.error_if_exists);
        assert!(!options.paranoid_checks);
        assert_eq!(options.write_buffer_size, 4 * 1024 * 1024);
        assert_eq!(options.max_open_files, 1000);
        assert_eq!(options.block_size, 4096);
        assert_eq!(options.block_restart_interval, 16);
        assert!(options.compression);
    }

    #[test]
    fn should_default_read_options() {
        let options = ReadOptions::default();

        assert!(!options.verify_checksums);
        assert!(options.fill_cache);
        assert!(!options.return_bytes);
        assert!(options.snapshot.is_none());
    }

    #[test]
    fn should_parse_camel_case_open_options_with_defaults() {
        // when
        let options: OpenOptions =
            from_json(r#"{"createIfMissing": true, "blockSize": 8192}"#).unwrap();

        // then
        assert!(options.create_if_missing);
        assert_eq!(options.block_size, 8192);
        assert_eq!(options.max_open_files, 1000);
    }

    #[test]
    fn should_parse_read_and_write_options() {
        let read: ReadOptions =
            from_json(r#"{"verifyChecksums": true, "fillCache": false, "returnBytes": true}"#)
                .unwrap();
        let write: WriteOptions = from_json(r#"{"sync": true}"#).unwrap();

        assert!(read.verify_checksums);
        assert!(!read.fill_cache);
        assert!(read.return_bytes);
        assert_eq!(write, WriteOptions::sync());
    }

    #[rstest]
    #[case(r#"{"createIfMising": true}"#)]
    #[case(r#"{"cacheSize": 1024}"#)]
    #[case(r#"{"compression": "snappy"}"#)]
    #[case(r#""yes""#)]
    fn should_reject_unrecognized_open_options(#[case] json: &str) {
        let result = from_json::<OpenOptions>(json);
        assert!(matches!(result, Err(Error::InvalidOption(_))), "{:?}", result);
    }

    #[rstest]
    #[case(r#"{"snapshot": 1}"#)]
    #[case(r#"{"asBuffer": true}"#)]
    fn should_reject_unrecognized_read_options(#[case] json: &str) {
        let result = from_json::<ReadOptions>(json);
        assert!(matches!(result, Err(Error::InvalidOption(_))));
    }

    #[rstest]
    #[case(OpenOptions { write_buffer_size: 0, ..OpenOptions::default() })]
    #[case(OpenOptions { max_open_files: 0, ..OpenOptions::default() })]
    #[case(OpenOptions { block_size: 0, ..OpenOptions::default() })]
    #[case(OpenOptions { block_restart_interval: 0, ..OpenOptions::default() })]
    fn should_reject_zero_sized_open_options(#[case] options: OpenOptions) {
        assert!(matches!(
            validate_open(&options),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn should_accept_default_open_options() {
        assert!(validate_open(&OpenOptions::default()).is_ok());
        assert!(validate_open(&OpenOptions::create()).is_ok());
    }

    #[test]
    fn should_parse_config() {
        // when
        let config =
            Config::from_json(r#"{"path": "/data/users", "options": {"createIfMissing": true}}"#)
                .unwrap();

        // then
        assert_eq!(config.path, PathBuf::from("/data/users"));
        assert!(config.options.create_if_missing);
    }

    #[test]
    fn should_bound_prefix_iteration() {
        // when
        let options = IteratorOptions::prefix("user:");

        // then
        let range = options.key_range();
        assert_eq!(options.lower_bound, Some(Bytes::from("user:")));
        assert_eq!(options.upper_bound, Some(Bytes::from("user;")));
        assert!(range.contains(b"user:1"));
        assert!(!range.contains(b"user;"));
        assert!(!range.contains(b"use"));
    }

    #[test]
    fn should_leave_all_ff_prefix_unbounded_above() {
        let options = IteratorOptions::prefix(vec![0xFF]);

        assert_eq!(options.upper_bound, None);
        assert!(options.key_range().contains(&[0xFF, 0xFF]));
    }

    #[test]
    fn should_contain_everything_without_bounds() {
        let range = IteratorOptions::default().key_range();

        assert!(range.contains(b""));
        assert!(range.contains(&[0xFF; 8]));
        assert_eq!(range, BytesRange::new(Bound::Unbounded, Bound::Unbounded));
    }

    #[test]
    fn should_exclude_upper_bound_of_range() {
        let range = IteratorOptions::range("b", "d").key_range();

        assert_eq!(range, BytesRange::half_open(Bytes::from("b"), Bytes::from("d")));
        assert!(range.contains(b"b"));
        assert!(!range.contains(b"d"));
    }

    #[test]
    fn should_parse_iterator_bounds_as_text_or_bytes() {
        // when
        let text: IteratorOptions =
            from_json(r#"{"lowerBound": "user:", "upperBound": "user;", "returnBytes": true}"#)
                .unwrap();
        let raw: IteratorOptions = from_json(r#"{"lowerBound": [0, 255]}"#).unwrap();
        let unbounded: IteratorOptions = from_json(r#"{"upperBound": null}"#).unwrap();

        // then
        assert_eq!(text.lower_bound, Some(Bytes::from("user:")));
        assert_eq!(text.upper_bound, Some(Bytes::from("user;")));
        assert!(text.return_bytes);
        assert_eq!(raw.lower_bound, Some(Bytes::from_static(&[0x00, 0xFF])));
        assert_eq!(raw.upper_bound, None);
        assert_eq!(unbounded.upper_bound, None);
    }

    #[rstest]
    #[case(r#"{"lowerBound": 7}"#)]
    #[case(r#"{"upperBound": [256]}"#)]
    #[case(r#"{"prefix": "user:"}"#)]
    fn should_reject_malformed_iterator_options(#[case] json: &str) {
        let result = from_json::<IteratorOptions>(json);
        assert!(matches!(result, Err(Error::InvalidOption(_))));
    }
}
