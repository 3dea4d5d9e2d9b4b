//! Decide whether a stored entry can satisfy a request outright, needs
//! revalidation, or cannot be used at all.

use std::time::SystemTime;

use crate::cache_control::{RequestCacheControl, ResponseCacheControl};
use crate::entry::CacheEntry;
use crate::validity::{
    current_age, freshness_lifetime, seconds_stale, within_stale_if_error, within_stale_while_revalidate,
    HeuristicOptions,
};

/// The outcome of checking a stored entry against an incoming request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suitability {
    /// Serve directly from the entry.
    Fresh,
    /// Serve directly, but the entry is stale and within a grace window;
    /// attach `Warning: 110`.
    StaleButUsable,
    /// Stale, but still within `stale-while-revalidate`: serve now and
    /// schedule a background revalidation.
    StaleWhileRevalidate,
    /// A conditional request to the origin is required before serving.
    NeedsRevalidation,
    /// The entry cannot be used for this request at all.
    Unsuitable,
}

/// Whether the entry carries a validator usable for a conditional request.
pub fn has_validator(entry: &CacheEntry) -> bool {
    entry.header("etag").is_some() || entry.header("last-modified").is_some()
}

/// Determine suitability of `entry` for `request_cc`, given the entry's own
/// response-side `Cache-Control`.
pub fn check(
    entry: &CacheEntry,
    request_cc: &RequestCacheControl,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
    now: SystemTime,
) -> Suitability {
    if request_cc.no_cache {
        return Suitability::NeedsRevalidation;
    }

    let Some(lifetime) = freshness_lifetime(entry, response_cc, shared_cache, heuristics) else {
        return if has_validator(entry) { Suitability::NeedsRevalidation } else { Suitability::Unsuitable };
    };

    let age = current_age(entry, now);

    if let Some(min_fresh) = request_cc.min_fresh {
        if lifetime < age + min_fresh as u64 {
            return suitable_if_revalidatable(entry, request_cc, response_cc, shared_cache, heuristics, now);
        }
    }
    if let Some(max_age) = request_cc.max_age {
        if age > max_age as u64 {
            return suitable_if_revalidatable(entry, request_cc, response_cc, shared_cache, heuristics, now);
        }
    }

    if age < lifetime {
        return Suitability::Fresh;
    }

    suitable_if_revalidatable(entry, request_cc, response_cc, shared_cache, heuristics, now)
}

fn suitable_if_revalidatable(
    entry: &CacheEntry,
    request_cc: &RequestCacheControl,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
    now: SystemTime,
) -> Suitability {
    let Some(stale_for) = seconds_stale(entry, response_cc, shared_cache, heuristics, now) else {
        return Suitability::Fresh;
    };

    if let Some(max_stale) = request_cc.max_stale {
        let within = match max_stale {
            Some(secs) => stale_for <= secs as i64,
            None => true,
        };
        if within {
            return Suitability::StaleButUsable;
        }
    }

    if within_stale_while_revalidate(stale_for, response_cc.stale_while_revalidate) {
        return Suitability::StaleWhileRevalidate;
    }

    if !has_validator(entry) {
        return Suitability::Unsuitable;
    }

    Suitability::NeedsRevalidation
}

/// Whether, given revalidation failed (origin error), the entry may still
/// be served stale under `stale-if-error`.
pub fn allows_stale_if_error(
    entry: &CacheEntry,
    request_cc: &RequestCacheControl,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
    now: SystemTime,
) -> bool {
    let Some(stale_for) = seconds_stale(entry, response_cc, shared_cache, heuristics, now) else {
        return true;
    };
    within_stale_if_error(stale_for, request_cc.stale_if_error)
        || within_stale_if_error(stale_for, response_cc.stale_if_error)
}

#[cfg(test)]
mod test {
    use super::*;
    use http::{Method, StatusCode, Version};
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn entry_aged(age_secs: u64, extra_headers: Vec<(&str, &str)>) -> CacheEntry {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        let mut headers: Vec<(String, String)> =
            extra_headers.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        headers.push(("date".into(), crate::cache_control::format_http_date(now - Duration::from_secs(age_secs))));
        CacheEntry {
            request_instant: now - Duration::from_secs(age_secs),
            response_instant: now - Duration::from_secs(age_secs),
            status: StatusCode::OK,
            headers,
            resource: None,
            variant_map: BTreeMap::new(),
            request_method: Method::GET,
            request_uri: "http://example.com/".into(),
            request_version: Version::HTTP_11,
        }
    }

    #[test]
    fn fresh_entry_is_fresh() {
        let entry = entry_aged(10, vec![]);
        let cc = ResponseCacheControl { max_age: Some(60), ..Default::default() };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            check(&entry, &RequestCacheControl::default(), &cc, false, HeuristicOptions::default(), now),
            Suitability::Fresh
        );
    }

    #[test]
    fn stale_with_validator_needs_revalidation() {
        let entry = entry_aged(100, vec![("etag", "\"v1\"")]);
        let cc = ResponseCacheControl { max_age: Some(60), ..Default::default() };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            check(&entry, &RequestCacheControl::default(), &cc, false, HeuristicOptions::default(), now),
            Suitability::NeedsRevalidation
        );
    }

    #[test]
    fn stale_without_validator_is_unsuitable() {
        let entry = entry_aged(100, vec![]);
        let cc = ResponseCacheControl { max_age: Some(60), ..Default::default() };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            check(&entry, &RequestCacheControl::default(), &cc, false, HeuristicOptions::default(), now),
            Suitability::Unsuitable
        );
    }

    #[test]
    fn max_stale_permits_serving_stale() {
        let entry = entry_aged(70, vec![("etag", "\"v1\"")]);
        let cc = ResponseCacheControl { max_age: Some(60), ..Default::default() };
        let request_cc = RequestCacheControl { max_stale: Some(Some(30)), ..Default::default() };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            check(&entry, &request_cc, &cc, false, HeuristicOptions::default(), now),
            Suitability::StaleButUsable
        );
    }

    #[test]
    fn stale_while_revalidate_window_is_honored() {
        let entry = entry_aged(70, vec![("etag", "\"v1\"")]);
        let cc = ResponseCacheControl { max_age: Some(60), stale_while_revalidate: Some(30), ..Default::default() };
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);
        assert_eq!(
            check(&entry, &RequestCacheControl::default(), &cc, false, HeuristicOptions::default(), now),
            Suitability::StaleWhileRevalidate
        );
    }
}
