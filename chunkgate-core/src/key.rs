//! Chunk key handling.
//!
//! Chunk ids embed `:` as a field separator, which several object stores treat
//! as a control character. Every key is rewritten at the storage boundary, so
//! the rewrite reuses a caller-owned scratch buffer instead of allocating.

use crate::{GateError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::str::FromStr;

/// Initial capacity for per-worker scratch buffers. Canonical chunk ids fit.
pub const SCRATCH_CAPACITY: usize = 64;

const RESERVED: char = ':';
const SUBSTITUTE: char = '_';

/// Rewrites `key` so it contains no reserved separator.
///
/// Keys without a separator are returned as-is. Otherwise the rewritten key
/// is built inside `scratch`, which only grows when its capacity is smaller
/// than `key.len()`.
pub fn normalize_key<'a>(key: &'a str, scratch: &'a mut String) -> &'a str {
    if !key.contains(RESERVED) {
        return key;
    }

    scratch.clear();
    scratch.reserve(key.len());
    for (index, part) in key.split(RESERVED).enumerate() {
        if index > 0 {
            scratch.push(SUBSTITUTE);
        }
        scratch.push_str(part);
    }

    scratch.as_str()
}

/// Same rewrite as [`normalize_key`] without a caller buffer.
pub fn format_key(key: &str) -> Cow<'_, str> {
    if key.contains(RESERVED) {
        Cow::Owned(key.replace(RESERVED, "_"))
    } else {
        Cow::Borrowed(key)
    }
}

/// Parsed form of `<user>/<fingerprint>:<from>:<through>:<checksum>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkId {
    pub id: String,
    pub user_id: String,
    pub fingerprint: u64,
    pub from: DateTime<Utc>,
    pub through: DateTime<Utc>,
    pub checksum: u32,
}

impl ChunkId {
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = || GateError::InvalidChunkId(key.to_string());

        let (user_id, rest) = key.split_once('/').ok_or_else(invalid)?;
        if rest.contains('/') {
            return Err(invalid());
        }

        let fields: Vec<&str> = rest.split(RESERVED).collect();
        let [fingerprint, from, through, checksum] = fields.as_slice() else {
            return Err(invalid());
        };

        let fingerprint = u64::from_str_radix(fingerprint, 16).map_err(|_| invalid())?;
        let from = i64::from_str_radix(from, 16).map_err(|_| invalid())?;
        let through = i64::from_str_radix(through, 16).map_err(|_| invalid())?;
        let checksum = u32::from_str_radix(checksum, 16).map_err(|_| invalid())?;

        Ok(Self {
            id: key.to_string(),
            user_id: user_id.to_string(),
            fingerprint,
            from: DateTime::from_timestamp_nanos(from),
            through: DateTime::from_timestamp_nanos(through),
            checksum,
        })
    }
}

impl FromStr for ChunkId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW_ID: &str = "fake/a70ecbaeaa65a26a:17ab9b3875f:17ab9b3889b:d8c9fe60";
    const STORED_ID: &str = "fake/a70ecbaeaa65a26a_17ab9b3875f_17ab9b3889b_d8c9fe60";

    #[test]
    fn test_normalize_replaces_every_separator() {
        let mut scratch = String::with_capacity(SCRATCH_CAPACITY);
        let normalized = normalize_key("a:b:c", &mut scratch);
        assert_eq!(normalized, "a_b_c");
        assert_eq!(normalized.len(), "a:b:c".len());
    }

    #[test]
    fn test_normalize_without_separator_borrows_input() {
        let key = "abc";
        let mut scratch = String::with_capacity(SCRATCH_CAPACITY);
        let normalized = normalize_key(key, &mut scratch);
        assert!(std::ptr::eq(normalized.as_ptr(), key.as_ptr()));
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_normalize_reuses_scratch_capacity() {
        let mut scratch = String::with_capacity(SCRATCH_CAPACITY);
        let capacity = scratch.capacity();

        assert_eq!(normalize_key(RAW_ID, &mut scratch), STORED_ID);
        assert_eq!(scratch.capacity(), capacity);

        // a second key overwrites the previous contents
        assert_eq!(normalize_key("x:y", &mut scratch), "x_y");
        assert_eq!(scratch.capacity(), capacity);
    }

    #[test]
    fn test_normalize_grows_small_scratch() {
        let mut scratch = String::new();
        assert_eq!(normalize_key(RAW_ID, &mut scratch), STORED_ID);
        assert!(scratch.capacity() >= RAW_ID.len());
    }

    #[test]
    fn test_normalize_edge_separators() {
        let mut scratch = String::new();
        assert_eq!(normalize_key(":", &mut scratch), "_");
        assert_eq!(normalize_key("::a::", &mut scratch), "__a__");
        assert_eq!(normalize_key("", &mut scratch), "");
    }

    #[test]
    fn test_format_key() {
        assert_eq!(format_key(RAW_ID), STORED_ID);
        assert!(matches!(format_key("plain/key"), Cow::Borrowed("plain/key")));
    }

    #[test]
    fn test_parse_chunk_id() {
        let id = ChunkId::parse(RAW_ID).unwrap();
        assert_eq!(id.id, RAW_ID);
        assert_eq!(id.user_id, "fake");
        assert_eq!(id.fingerprint, 0xa70ecbaeaa65a26a);
        assert_eq!(id.from.timestamp_nanos_opt(), Some(0x17ab9b3875f));
        assert_eq!(id.through.timestamp_nanos_opt(), Some(0x17ab9b3889b));
        assert_eq!(id.checksum, 0xd8c9fe60);

        let parsed: ChunkId = RAW_ID.parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_chunk_id_serializes_with_rfc3339_bounds() {
        let id = ChunkId::parse(RAW_ID).unwrap();
        let value = serde_json::to_value(&id).unwrap();
        assert_eq!(value["user_id"], "fake");
        assert_eq!(value["checksum"], 0xd8c9fe60u32);
        assert!(value["from"].as_str().unwrap().starts_with("1970-01-01T00:27:"));
    }

    #[test]
    fn test_parse_chunk_id_rejects_malformed() {
        for key in [
            "no-slash",
            "a/b/c:1:2:3",
            "user/1:2:3",
            "user/1:2:3:4:5",
            "user/zz:1:2:3",
            "user/1:2:3:100000000",
            "u1/fp:1:2:3",
        ] {
            assert!(
                matches!(ChunkId::parse(key), Err(GateError::InvalidChunkId(_))),
                "{key} should be rejected"
            );
        }
    }
}
