//! Merge a 304 response into an existing entry, and register new variants.

use std::time::SystemTime;

use http::{HeaderMap, StatusCode};

use crate::cache_control::{is_one_shot_warning, parse_http_date};
use crate::compliance::strip_entity_headers_for_304;
use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};

/// Merge a 304 response's headers into `entry`, producing a fresh entry
/// (never mutating `entry` in place).
///
/// If the 304's `Date` is older than the stored entry's, the stored headers
/// win outright and only the request/response instants are refreshed —
/// an out-of-order response must not roll back metadata.
pub fn merge_304(
    entry: &CacheEntry,
    status: StatusCode,
    response_headers: &HeaderMap,
    request_instant: SystemTime,
    response_instant: SystemTime,
) -> Result<CacheEntry> {
    if status != StatusCode::NOT_MODIFIED {
        return Err(CacheError::CacheUpdateInvariantViolation);
    }

    let mut merged = entry.clone();
    merged.request_instant = request_instant;
    merged.response_instant = response_instant;

    let stored_date = entry.header("date").and_then(parse_http_date);
    let response_date =
        response_headers.get("date").and_then(|v| v.to_str().ok()).and_then(parse_http_date);

    let response_is_newer = match (stored_date, response_date) {
        (Some(sd), Some(rd)) => rd >= sd,
        _ => true,
    };

    if !response_is_newer {
        return Ok(merged);
    }

    let mut sanitized_304 = HeaderMap::new();
    for (name, value) in response_headers {
        sanitized_304.append(name.clone(), value.clone());
    }
    strip_entity_headers_for_304(&mut sanitized_304);

    let incoming_names: std::collections::HashSet<String> =
        sanitized_304.keys().map(|n| n.as_str().to_ascii_lowercase()).collect();

    let mut new_headers: Vec<(String, String)> = merged
        .headers
        .into_iter()
        .filter(|(name, _)| {
            let lower = name.to_ascii_lowercase();
            if incoming_names.contains(&lower) {
                return false;
            }
            if lower == "warning" {
                return false;
            }
            true
        })
        .collect();

    for (name, value) in &sanitized_304 {
        let value_str = value.to_str().unwrap_or_default();
        new_headers.push((name.as_str().to_string(), value_str.to_string()));
    }

    for (name, value) in entry.headers.iter().filter(|(n, _)| n.eq_ignore_ascii_case("warning")) {
        if !is_one_shot_warning(value) {
            new_headers.push((name.clone(), value.clone()));
        }
    }

    merged.headers = new_headers;
    Ok(merged)
}

/// Register a new variant under a root entry's `variantMap`. Returns the
/// replacement root entry; callers install it with
/// [`crate::storage::CacheStorage::update`] so concurrent variant
/// registrations retry against the latest root rather than clobbering one
/// another.
pub fn update_parent_entry(parent: &CacheEntry, variant_key: &str, variant_storage_key: &str) -> CacheEntry {
    let mut updated = parent.clone();
    updated.variant_map.insert(variant_key.to_string(), variant_storage_key.to_string());
    updated
}

#[cfg(test)]
mod test {
    use super::*;
    use http::{HeaderValue, Method, Version};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn base_entry() -> CacheEntry {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        CacheEntry {
            request_instant: now,
            response_instant: now,
            status: StatusCode::OK,
            headers: vec![
                ("date".into(), crate::cache_control::format_http_date(now)),
                ("etag".into(), "\"v1\"".into()),
                ("content-type".into(), "text/plain".into()),
                ("content-encoding".into(), "gzip".into()),
            ],
            resource: Some(crate::entry::Resource::from_bytes(b"payload".to_vec().into_boxed_slice())),
            variant_map: BTreeMap::new(),
            request_method: Method::GET,
            request_uri: "http://example.com/".into(),
            request_version: Version::HTTP_11,
        }
    }

    #[test]
    fn rejects_non_304() {
        let entry = base_entry();
        let err = merge_304(&entry, StatusCode::OK, &HeaderMap::new(), SystemTime::now(), SystemTime::now());
        assert!(err.is_err());
    }

    #[test]
    fn preserves_resource_and_content_encoding() {
        let entry = base_entry();
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(2_000);
        let mut headers = HeaderMap::new();
        headers.insert("date", HeaderValue::from_str(&crate::cache_control::format_http_date(now)).unwrap());
        headers.insert("etag", HeaderValue::from_static("\"v1\""));
        headers.insert("cache-control", HeaderValue::from_static("max-age=120"));

        let merged = merge_304(&entry, StatusCode::NOT_MODIFIED, &headers, now, now).unwrap();
        assert_eq!(merged.resource.as_ref().unwrap().get(), entry.resource.as_ref().unwrap().get());
        assert_eq!(merged.header("content-encoding"), Some("gzip"));
        assert_eq!(merged.header("cache-control"), Some("max-age=120"));
    }

    #[test]
    fn out_of_order_304_does_not_roll_back_metadata() {
        let entry = base_entry();
        let earlier = SystemTime::UNIX_EPOCH;
        let mut headers = HeaderMap::new();
        headers
            .insert("date", HeaderValue::from_str(&crate::cache_control::format_http_date(earlier)).unwrap());
        headers.insert("cache-control", HeaderValue::from_static("max-age=9999"));

        let merged = merge_304(&entry, StatusCode::NOT_MODIFIED, &headers, earlier, earlier).unwrap();
        assert_eq!(merged.header("cache-control"), None);
    }

    #[test]
    fn strips_one_shot_warnings_on_merge() {
        let mut entry = base_entry();
        entry.headers.push(("warning".into(), "110 - \"stale\"".into()));
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(2_000);
        let mut headers = HeaderMap::new();
        headers.insert("date", HeaderValue::from_str(&crate::cache_control::format_http_date(now)).unwrap());
        let merged = merge_304(&entry, StatusCode::NOT_MODIFIED, &headers, now, now).unwrap();
        assert_eq!(merged.header("warning"), None);
    }

    #[test]
    fn registers_variant_on_parent() {
        let parent = base_entry();
        let updated = update_parent_entry(&parent, "{accept-encoding=gzip}", "{accept-encoding=gzip}key");
        assert_eq!(updated.variant_map.get("{accept-encoding=gzip}"), Some(&"{accept-encoding=gzip}key".to_string()));
    }
}
