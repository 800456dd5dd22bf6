//! Cache entry envelopes.
//!
//! ```text
//! [MAGIC: 4 bytes] [SCHEMA VERSION: 4 bytes LE] [POSTCARD BODY]
//! ```
//!
//! The body records the tag stamps the payload was computed under. The
//! payload itself is opaque bytes (already-serialized JSON), so a cache hit
//! is returned without re-serializing.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const CACHE_MAGIC: [u8; 4] = *b"BKSH";

/// Bump when [`CachedItem`] changes shape; older entries then read as misses.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Stamp of one tag at the time an entry was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStamp {
    pub tag: String,
    pub stamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedItem {
    pub tags: Vec<TagStamp>,
    pub payload: Vec<u8>,
}

pub fn serialize_for_cache(item: &CachedItem) -> Result<Vec<u8>> {
    let body = postcard::to_allocvec(item).map_err(|e| Error::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&CACHE_MAGIC);
    bytes.extend_from_slice(&CACHE_SCHEMA_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// # Errors
///
/// - `Error::InvalidCacheEntry`: truncated header or wrong magic
/// - `Error::VersionMismatch`: written by another schema version
/// - `Error::DeserializationError`: corrupted body
pub fn deserialize_from_cache(bytes: &[u8]) -> Result<CachedItem> {
    if bytes.len() < HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "entry too short: {} bytes",
            bytes.len()
        )));
    }

    let (header, body) = bytes.split_at(HEADER_LEN);
    if header[..4] != CACHE_MAGIC {
        return Err(Error::InvalidCacheEntry("bad magic".to_string()));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&header[4..]);
    let found = u32::from_le_bytes(version);
    if found != CACHE_SCHEMA_VERSION {
        return Err(Error::VersionMismatch {
            expected: CACHE_SCHEMA_VERSION,
            found,
        });
    }

    postcard::from_bytes(body).map_err(|e| Error::DeserializationError(e.to_string()))
}

pub fn encode_stamp(stamp: u64) -> Vec<u8> {
    stamp.to_le_bytes().to_vec()
}

pub fn decode_stamp(bytes: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CachedItem {
        CachedItem {
            tags: vec![TagStamp {
                tag: "booksCache".to_string(),
                stamp: 42,
            }],
            payload: br#"[{"id":1}]"#.to_vec(),
        }
    }

    #[test]
    fn test_envelope_header() {
        let bytes = serialize_for_cache(&item()).expect("Failed to serialize");
        assert_eq!(&bytes[..4], b"BKSH");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(
            deserialize_from_cache(&bytes).expect("Failed to deserialize"),
            item()
        );
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            deserialize_from_cache(b"abc"),
            Err(Error::InvalidCacheEntry(_))
        ));
        assert!(matches!(
            deserialize_from_cache(b"CKIT\x01\x00\x00\x00rest"),
            Err(Error::InvalidCacheEntry(_))
        ));
    }

    #[test]
    fn test_rejects_other_schema_version() {
        let mut bytes = serialize_for_cache(&item()).expect("Failed to serialize");
        bytes[4..8].copy_from_slice(&7u32.to_le_bytes());

        match deserialize_from_cache(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CACHE_SCHEMA_VERSION);
                assert_eq!(found, 7);
            }
            other => panic!("Expected version mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_body() {
        let mut bytes = serialize_for_cache(&item()).expect("Failed to serialize");
        bytes.truncate(HEADER_LEN + 2);
        assert!(matches!(
            deserialize_from_cache(&bytes),
            Err(Error::DeserializationError(_))
        ));
    }

    #[test]
    fn test_stamp_codec() {
        assert_eq!(decode_stamp(&encode_stamp(u64::MAX)), Some(u64::MAX));
        assert_eq!(decode_stamp(b"short"), None);
    }
}
