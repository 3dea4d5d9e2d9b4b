//! The origin transport as an extension point. The core depends only on
//! this trait; wiring up an actual HTTP client (reqwest, hyper, ...) is an
//! external collaborator's job.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Uri, Version};
use http_body_util::{combinators::BoxBody, BodyExt, Full};

use crate::body::BodyError;
use crate::error::Result;

/// A request the core hands to the origin, already stripped to what the
/// policy/conditional-request logic needs.
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
}

impl CacheRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self { method, uri, version: Version::HTTP_11, headers: HeaderMap::new() }
    }
}

/// The origin response body, boxed so the transport can hand back either an
/// already-buffered body or a genuinely streaming one. [`crate::exec::CachingExec`]
/// drives this through [`crate::size_limited_reader`] itself; callers never
/// need to pre-capture it.
pub type OriginBody = BoxBody<Bytes, BodyError>;

/// Box `bytes` up as an [`OriginBody`] for a transport (or test double) that
/// already has the whole response in memory.
pub fn boxed_bytes_body(bytes: Bytes) -> OriginBody {
    Full::new(bytes).map_err(|err: std::convert::Infallible| err.into()).boxed()
}

/// A response the origin hands back to the core.
pub struct CacheResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: OriginBody,
}

impl CacheResponse {
    /// Build a response from a fully-buffered body, for origins that never
    /// stream.
    pub fn from_bytes(status: StatusCode, version: Version, headers: HeaderMap, body: Bytes) -> Self {
        Self { status, version, headers, body: boxed_bytes_body(body) }
    }
}

impl std::fmt::Debug for CacheResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// The out-of-scope transport collaborator: sends a [`CacheRequest`] to the
/// real origin and returns its [`CacheResponse`]. Test doubles implement
/// this directly; production crates adapt their HTTP client of choice.
#[async_trait]
pub trait OriginExecutor: Send + Sync {
    async fn execute(&self, request: CacheRequest) -> Result<CacheResponse>;
}
