//! Whether an origin response may be stored at all.

use http::{Method, StatusCode};

use crate::cache_control::ResponseCacheControl;

const STATUS_CODE_CACHEABLE_BY_DEFAULT: &[u16] =
    &[200, 203, 204, 300, 301, 308, 404, 405, 410, 414, 501];

/// Response caching eligibility per RFC 7234 §3.
pub fn is_response_cacheable(
    request_method: &Method,
    status: StatusCode,
    response_cc: &ResponseCacheControl,
    request_has_authorization: bool,
    shared_cache: bool,
) -> bool {
    if response_cc.no_store {
        return false;
    }

    let explicitly_cacheable =
        response_cc.public || response_cc.max_age.is_some() || response_cc.s_maxage.is_some();

    let method_ok = matches!(*request_method, Method::GET | Method::HEAD) || explicitly_cacheable;
    if !method_ok {
        return false;
    }

    // 206 is deliberately excluded even when the response carries an explicit
    // cache directive: byte-range responses are out of scope here and must
    // never be stored as if they were the full representation.
    let status_ok = STATUS_CODE_CACHEABLE_BY_DEFAULT.contains(&status.as_u16())
        || (status != StatusCode::PARTIAL_CONTENT && explicitly_cacheable);
    if !status_ok {
        return false;
    }

    if shared_cache {
        if response_cc.private {
            return false;
        }
        if request_has_authorization
            && !(response_cc.public || response_cc.s_maxage.is_some() || response_cc.must_revalidate)
        {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_cacheable_status_with_get_is_storable() {
        let cc = ResponseCacheControl::default();
        assert!(is_response_cacheable(&Method::GET, StatusCode::OK, &cc, false, false));
    }

    #[test]
    fn no_store_always_wins() {
        let cc = ResponseCacheControl { no_store: true, public: true, ..Default::default() };
        assert!(!is_response_cacheable(&Method::GET, StatusCode::OK, &cc, false, false));
    }

    #[test]
    fn post_is_storable_only_when_explicitly_cacheable() {
        let cc = ResponseCacheControl::default();
        assert!(!is_response_cacheable(&Method::POST, StatusCode::OK, &cc, false, false));
        let cc = ResponseCacheControl { public: true, ..Default::default() };
        assert!(is_response_cacheable(&Method::POST, StatusCode::OK, &cc, false, false));
    }

    #[test]
    fn shared_cache_requires_explicit_permission_for_authorized_requests() {
        let cc = ResponseCacheControl::default();
        assert!(!is_response_cacheable(&Method::GET, StatusCode::OK, &cc, true, true));
        let cc = ResponseCacheControl { public: true, ..Default::default() };
        assert!(is_response_cacheable(&Method::GET, StatusCode::OK, &cc, true, true));
    }

    #[test]
    fn shared_cache_rejects_private() {
        let cc = ResponseCacheControl { private: true, ..Default::default() };
        assert!(!is_response_cacheable(&Method::GET, StatusCode::OK, &cc, false, true));
    }

    #[test]
    fn partial_content_is_never_cacheable_even_with_explicit_directives() {
        let cc = ResponseCacheControl { public: true, max_age: Some(60), ..Default::default() };
        assert!(!is_response_cacheable(&Method::GET, StatusCode::PARTIAL_CONTENT, &cc, false, false));
    }
}
