//! Whether an outgoing request may be served from cache at all.

use http::Method;

use crate::cache_control::RequestCacheControl;

/// A request can be served from cache iff it is `GET`/`HEAD`, does not carry
/// `Cache-Control: no-store`/`no-cache`, and (HTTP/1.0 compatibility) does
/// not carry `Pragma: no-cache`.
pub fn is_request_cacheable(method: &Method, request_cc: &RequestCacheControl, pragma_no_cache: bool) -> bool {
    if method != Method::GET && method != Method::HEAD {
        return false;
    }
    if request_cc.no_store || request_cc.no_cache {
        return false;
    }
    if pragma_no_cache {
        return false;
    }
    true
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_unsafe_methods() {
        let cc = RequestCacheControl::default();
        assert!(!is_request_cacheable(&Method::POST, &cc, false));
    }

    #[test]
    fn rejects_no_store_and_pragma() {
        let cc = RequestCacheControl { no_store: true, ..Default::default() };
        assert!(!is_request_cacheable(&Method::GET, &cc, false));
        assert!(!is_request_cacheable(&Method::GET, &RequestCacheControl::default(), true));
    }

    #[test]
    fn allows_plain_get() {
        let cc = RequestCacheControl::default();
        assert!(is_request_cacheable(&Method::GET, &cc, false));
        assert!(is_request_cacheable(&Method::HEAD, &cc, false));
    }
}
