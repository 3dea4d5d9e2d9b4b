use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type
pub type Result<T> = std::result::Result<T, CacheError>;

/// A generic "error" for the caching core
#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    /// A general error used as a catch all for collaborator errors (storage
    /// backends, resource factories, origin executors) via anyhow
    #[error(transparent)]
    #[diagnostic(code(http_cache::general))]
    General(#[from] anyhow::Error),
    /// Error from http
    #[error(transparent)]
    #[diagnostic(code(http_cache::http))]
    Http(#[from] http::Error),
    /// There was an error parsing the HTTP status code
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_status_code))]
    InvalidStatusCode(#[from] http::status::InvalidStatusCode),
    /// There was an error converting the header to a string
    #[error(transparent)]
    #[diagnostic(code(http_cache::header_to_str))]
    HeaderToStr(#[from] http::header::ToStrError),
    /// There was an error parsing the HTTP method
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_method))]
    InvalidMethod(#[from] http::method::InvalidMethod),
    /// There was an error parsing the URI
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_uri))]
    InvalidUri(#[from] http::uri::InvalidUri),
    /// There was an error parsing the URL
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_url))]
    InvalidUrl(#[from] url::ParseError),
    /// There was an error parsing an HTTP header value
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_header_value))]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// There was an error parsing an HTTP header name
    #[error(transparent)]
    #[diagnostic(code(http_cache::invalid_header_name))]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// Error (de)serializing a cache entry
    #[error(transparent)]
    #[diagnostic(code(http_cache::postcard))]
    Postcard(#[from] postcard::Error),
    /// There was an error parsing the HTTP request version
    #[error("Unknown HTTP version")]
    #[diagnostic(code(http_cache::bad_version))]
    BadVersion,
    /// There was an error parsing an HTTP header value
    #[error("Error parsing header value")]
    #[diagnostic(code(http_cache::bad_header))]
    BadHeader,
    /// A `CacheStorage` read or write failed
    #[error("cache storage operation failed: {0}")]
    #[diagnostic(code(http_cache::storage_fault))]
    StorageFault(String),
    /// A `ResourceFactory` body copy failed
    #[error("resource factory operation failed: {0}")]
    #[diagnostic(code(http_cache::resource_fault))]
    ResourceFault(String),
    /// The origin violated the protocol in a way the cache cannot tolerate
    #[error("origin response violated protocol expectations: {0}")]
    #[diagnostic(code(http_cache::protocol_violation))]
    ProtocolViolation(String),
    /// Revalidation against the origin failed and no stale-if-error window
    /// covered the failure
    #[error("revalidation failed: {0}")]
    #[diagnostic(code(http_cache::revalidation_failure))]
    RevalidationFailure(String),
    /// `CacheUpdateHandler::update_cache_entry` was asked to merge a
    /// response that was not a 304
    #[error(
        "cannot merge a non-304 response into an existing cache entry"
    )]
    #[diagnostic(code(http_cache::cache_update_invariant_violation))]
    CacheUpdateInvariantViolation,
    /// The scheduling strategy's executor rejected a revalidation job
    #[error("background revalidation scheduling was rejected")]
    #[diagnostic(code(http_cache::rejected_scheduling))]
    RejectedScheduling,
}
