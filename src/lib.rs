#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![allow(clippy::doc_lazy_continuation)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! An RFC 7234 compliant HTTP caching decision engine.
//!
//! This crate implements the *core* of an HTTP cache: request admission,
//! freshness evaluation (including `Vary`-keyed variants), conditional
//! revalidation and 304 merging, size-limited response capture, cache
//! invalidation on unsafe methods and `Location`/`Content-Location`, and
//! asynchronous background revalidation with single-flight request
//! collapsing and exponential back-off.
//!
//! It is deliberately backend-agnostic: the transport, HTTP parsing,
//! connection pooling, and persistent storage backend are all external
//! collaborators consumed through the [`storage::CacheStorage`],
//! [`origin::OriginExecutor`], and [`entry::ResourceFactory`] traits. A
//! caller wires up a concrete transport and storage backend and drives
//! requests through [`exec::CachingExec`].
//!
//! ## Basic usage
//!
//! ```rust
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use http_cache_core::{
//!     config::CacheConfig,
//!     entry::HeapResourceFactory,
//!     exec::CachingExec,
//!     origin::{CacheRequest, CacheResponse, OriginExecutor},
//!     storage::InternalCacheStorage,
//! };
//! use async_trait::async_trait;
//!
//! struct EchoOrigin;
//!
//! #[async_trait]
//! impl OriginExecutor for EchoOrigin {
//!     async fn execute(&self, _request: CacheRequest) -> http_cache_core::error::Result<CacheResponse> {
//!         Ok(CacheResponse::from_bytes(
//!             http::StatusCode::OK,
//!             http::Version::HTTP_11,
//!             http::HeaderMap::new(),
//!             bytes::Bytes::from_static(b"hello"),
//!         ))
//!     }
//! }
//!
//! # async fn run() {
//! let storage = Arc::new(InternalCacheStorage::new(NonZeroUsize::new(1024).unwrap()));
//! let exec = CachingExec::new(storage, Arc::new(EchoOrigin), Arc::new(HeapResourceFactory), CacheConfig::default());
//! let request = CacheRequest::new(http::Method::GET, "http://example.com/".parse().unwrap());
//! let result = exec.run(request).await.unwrap();
//! # }
//! ```

pub mod body;
pub mod cache_control;
pub mod compliance;
pub mod config;
pub mod entry;
pub mod error;
pub mod exec;
pub mod generator;
pub mod invalidator;
pub mod key;
pub mod origin;
pub mod request_policy;
pub mod response_policy;
pub mod revalidation;
pub mod size_limited_reader;
pub mod storage;
pub mod suitability;
pub mod update;
pub mod validity;

pub use crate::config::CacheConfig;
pub use crate::entry::{CacheEntry, HeapResourceFactory, Resource, ResourceFactory};
pub use crate::error::{CacheError, Result};
pub use crate::exec::{CacheOutcome, CacheResult, CachingExec};
pub use crate::origin::{CacheRequest, CacheResponse, OriginExecutor};
pub use crate::storage::{CacheStorage, InternalCacheStorage};
