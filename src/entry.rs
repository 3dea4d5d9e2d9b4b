//! The stored cache record and the opaque body handle it points at.

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::SystemTime,
};

use http::{Method, StatusCode, Version};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// An opaque body carrier. The reference implementation only ever produces
/// the heap-backed variant; external collaborators (disk, remote KV) attach
/// their own storage by implementing [`ResourceFactory`] and wrapping bytes
/// obtained from [`Resource::get`] however they see fit.
#[derive(Clone)]
pub struct Resource {
    bytes: Arc<[u8]>,
}

impl Resource {
    /// Build a resource directly from bytes already in memory.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into() }
    }

    /// Length in bytes.
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    /// The full byte content. Cheap: clones the underlying `Arc`.
    pub fn get(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Release this handle. The reference implementation is `Arc`-backed so
    /// the bytes stay alive as long as any other clone (e.g. an in-flight
    /// response body) still holds one; this only drops our reference.
    pub fn dispose(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource").field("len", &self.bytes.len()).finish()
    }
}

impl Serialize for Resource {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes_as_slice(&self.bytes, serializer)
    }
}

impl<'de> Deserialize<'de> for Resource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        Ok(Self { bytes: Arc::from(bytes.into_boxed_slice()) })
    }
}

fn serde_bytes_as_slice<S>(
    bytes: &[u8],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bytes(bytes)
}

/// Generates and copies [`Resource`] instances. Disk, remote-KV, or other
/// persistent backends implement this to give a [`Resource`] a durable
/// identity; the durable name contract (when a backend needs one) is
/// `base64url(sha-256(bytes))@percent-encoded(key)`, so two requests for the
/// same bytes under the same key collide on the same file rather than
/// duplicating storage.
pub trait ResourceFactory: Send + Sync {
    /// Produce a resource for `key` holding `bytes`.
    fn generate(&self, key: &str, bytes: Arc<[u8]>) -> Result<Resource>;

    /// Copy an existing resource, e.g. when promoting a reconstructed body
    /// that was read directly off the wire into cache storage.
    fn copy(&self, key: &str, resource: &Resource) -> Result<Resource> {
        self.generate(key, resource.get())
    }
}

/// The reference [`ResourceFactory`]: everything lives in process memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeapResourceFactory;

impl ResourceFactory for HeapResourceFactory {
    fn generate(&self, _key: &str, bytes: Arc<[u8]>) -> Result<Resource> {
        Ok(Resource::from_bytes(bytes))
    }
}

/// A single stored header, order-preserving so duplicates round-trip.
pub type StoredHeader = (String, String);

/// An immutable cache record. Replacement, never in-place mutation, is how
/// [`crate::update::CacheUpdateHandler`] keeps concurrent readers safe: a
/// reader either observes the old `Arc<CacheEntry>` or the new one, never a
/// half-merged value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Wall-clock instant the request was sent to the origin.
    pub request_instant: SystemTime,
    /// Wall-clock instant the response was fully received.
    pub response_instant: SystemTime,
    /// Status code of the stored response.
    #[serde(with = "status_code_serde")]
    pub status: StatusCode,
    /// Stored headers in origin order; duplicates are preserved.
    pub headers: Vec<StoredHeader>,
    /// The stored body, absent for entries that are pure variant directories.
    pub resource: Option<Resource>,
    /// `variant key -> child storage key`, non-empty only on a root entry
    /// for a resource that varies.
    pub variant_map: BTreeMap<String, String>,
    /// Method of the request that produced this entry (`GET` or `HEAD`).
    #[serde(with = "method_serde")]
    pub request_method: Method,
    /// Request URI this entry was stored under, used to rebuild conditional
    /// requests and to resolve relative `Content-Location`/`Location`.
    pub request_uri: String,
    /// HTTP version of the request that produced this entry, needed to gate
    /// heuristic freshness for HTTP/1.0 requests to query-string URIs
    /// (RFC 7234 §4.2.2).
    #[serde(with = "version_serde")]
    pub request_version: Version,
}

impl CacheEntry {
    /// Look up the first stored value for `name`, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All stored values for `name`, case-insensitively, in origin order.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers.iter().filter(move |(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// True if this entry is a variant directory rather than a leaf.
    pub fn is_variant_root(&self) -> bool {
        !self.variant_map.is_empty()
    }
}

mod status_code_serde {
    use http::StatusCode;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &StatusCode, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u16(status.as_u16())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<StatusCode, D::Error> {
        let code = u16::deserialize(d)?;
        StatusCode::from_u16(code).map_err(serde::de::Error::custom)
    }
}

mod method_serde {
    use http::Method;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Method, D::Error> {
        let raw = String::deserialize(d)?;
        Method::from_bytes(raw.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod version_serde {
    use http::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &Version, s: S) -> Result<S::Ok, S::Error> {
        let code: u8 = match *version {
            Version::HTTP_09 => 9,
            Version::HTTP_10 => 10,
            Version::HTTP_2 => 20,
            Version::HTTP_3 => 30,
            _ => 11,
        };
        s.serialize_u8(code)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Version, D::Error> {
        let code = u8::deserialize(d)?;
        Ok(match code {
            9 => Version::HTTP_09,
            10 => Version::HTTP_10,
            20 => Version::HTTP_2,
            30 => Version::HTTP_3,
            _ => Version::HTTP_11,
        })
    }
}

/// Serialize an entry with `postcard`, the reference wire format for entry
/// persistence (`bincode` is avoided per RUSTSEC-2025-0141).
pub fn serialize_entry(entry: &CacheEntry) -> Result<Vec<u8>> {
    postcard::to_allocvec(entry).map_err(CacheError::from)
}

/// Deserialize an entry produced by [`serialize_entry`].
pub fn deserialize_entry(bytes: &[u8]) -> Result<CacheEntry> {
    postcard::from_bytes(bytes).map_err(CacheError::from)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            request_instant: SystemTime::UNIX_EPOCH,
            response_instant: SystemTime::UNIX_EPOCH,
            status: StatusCode::OK,
            headers: vec![
                ("Content-Type".into(), "text/plain".into()),
                ("ETag".into(), "\"v1\"".into()),
            ],
            resource: Some(Resource::from_bytes(b"hello".to_vec().into_boxed_slice())),
            variant_map: BTreeMap::new(),
            request_method: Method::GET,
            request_uri: "http://example.com/".into(),
            request_version: Version::HTTP_11,
        }
    }

    #[test]
    fn round_trips_through_postcard() {
        let entry = sample_entry();
        let bytes = serialize_entry(&entry).unwrap();
        let restored = deserialize_entry(&bytes).unwrap();
        assert_eq!(restored.status, entry.status);
        assert_eq!(restored.headers, entry.headers);
        assert_eq!(restored.request_method, entry.request_method);
        assert_eq!(
            restored.resource.unwrap().get(),
            entry.resource.unwrap().get()
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let entry = sample_entry();
        assert_eq!(entry.header("content-type"), Some("text/plain"));
        assert_eq!(entry.header("ETAG"), Some("\"v1\""));
        assert_eq!(entry.header("missing"), None);
    }
}
