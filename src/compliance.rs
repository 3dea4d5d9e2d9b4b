//! Sanitize an origin response before it enters the caching pipeline.

use http::{HeaderMap, Method, Request, StatusCode};

use crate::error::{CacheError, Result};

/// Entity headers stripped from a 304 that strongly validates the stored
/// representation: the 304 describes metadata, never a re-encoding.
pub const ENTITY_HEADERS_EXCLUDED_ON_304: &[&str] =
    &["content-encoding", "content-language", "content-length", "content-md5", "content-type"];

/// Statuses that never carry a meaningful entity body.
fn bodyless_status(status: StatusCode) -> bool {
    status.is_informational() || matches!(status.as_u16(), 204 | 205 | 304)
}

/// Check whether the origin response is compliant enough to process. Body
/// draining itself is left to the transport collaborator (out of scope
/// here); this only validates headers/status-line invariants the core
/// depends on.
pub fn check<T>(request: &Request<T>, status: StatusCode, request_had_range: bool) -> Result<()> {
    if status == StatusCode::PARTIAL_CONTENT && !request_had_range {
        return Err(CacheError::ProtocolViolation(
            "received 206 Partial Content for a request without a Range header".into(),
        ));
    }
    if *request.method() == Method::HEAD && !bodyless_status(status) {
        // A body may still be present on the wire; transports must drain it,
        // but the cache itself must never store it as the entity.
    }
    Ok(())
}

/// Whether an entity body from this response should be treated as absent
/// for caching purposes (informational, 204/205/304, or answering `HEAD`).
pub fn suppresses_entity(method: &Method, status: StatusCode) -> bool {
    bodyless_status(status) || *method == Method::HEAD
}

/// Strip the entity headers a 304 is not allowed to use to overwrite a
/// strongly-validated stored representation.
pub fn strip_entity_headers_for_304(headers: &mut HeaderMap) {
    for name in ENTITY_HEADERS_EXCLUDED_ON_304 {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use http::Request;

    #[test]
    fn unsolicited_partial_content_is_rejected() {
        let request = Request::builder().method(Method::GET).body(()).unwrap();
        assert!(check(&request, StatusCode::PARTIAL_CONTENT, false).is_err());
    }

    #[test]
    fn solicited_partial_content_is_accepted() {
        let request = Request::builder().method(Method::GET).body(()).unwrap();
        assert!(check(&request, StatusCode::PARTIAL_CONTENT, true).is_ok());
    }

    #[test]
    fn head_and_304_suppress_entity() {
        assert!(suppresses_entity(&Method::HEAD, StatusCode::OK));
        assert!(suppresses_entity(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(!suppresses_entity(&Method::GET, StatusCode::OK));
    }
}
