//! Freshness lifetime and current-age computation (RFC 7234 §4.2).

use std::time::{Duration, SystemTime};

use http::{Uri, Version};

use crate::cache_control::{parse_http_date, ResponseCacheControl};
use crate::entry::CacheEntry;

/// `Age` values are capped at this many seconds (RFC 7234 §4.2.3, 2^31).
pub const MAX_AGE: u64 = 2_147_483_648;

fn secs_between(later: SystemTime, earlier: SystemTime) -> i64 {
    match later.duration_since(earlier) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// The origin `Date` header, or the response instant if absent/unparseable.
fn entry_date(entry: &CacheEntry) -> SystemTime {
    entry.header("date").and_then(parse_http_date).unwrap_or(entry.response_instant)
}

/// The stored `Age` header value, if present, in seconds.
fn stored_age(entry: &CacheEntry) -> u64 {
    entry.header("age").and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(0)
}

/// `apparentAge = max(0, responseInstant - Date)`.
pub fn apparent_age(entry: &CacheEntry) -> u64 {
    secs_between(entry.response_instant, entry_date(entry)).max(0) as u64
}

/// `responseDelay = responseInstant - requestInstant`.
pub fn response_delay(entry: &CacheEntry) -> u64 {
    secs_between(entry.response_instant, entry.request_instant).max(0) as u64
}

/// `correctedInitialAge = max(apparentAge, Age) + responseDelay`.
pub fn corrected_initial_age(entry: &CacheEntry) -> u64 {
    apparent_age(entry).max(stored_age(entry)) + response_delay(entry)
}

/// `residentTime = now - responseInstant`.
pub fn resident_time(entry: &CacheEntry, now: SystemTime) -> u64 {
    secs_between(now, entry.response_instant).max(0) as u64
}

/// `currentAge = correctedInitialAge + residentTime`, capped at [`MAX_AGE`].
pub fn current_age(entry: &CacheEntry, now: SystemTime) -> u64 {
    (corrected_initial_age(entry) + resident_time(entry, now)).min(MAX_AGE)
}

/// Parameters governing heuristic freshness (RFC 7234 §4.2.2).
#[derive(Debug, Clone, Copy)]
pub struct HeuristicOptions {
    pub enabled: bool,
    pub coefficient: f64,
    pub default_lifetime: Duration,
    /// Refuse heuristic freshness for an HTTP/1.0 request to a query-string
    /// URI absent an explicit `Expires`/`Cache-Control` freshness signal.
    pub never_cache_http10_responses_with_query_string: bool,
}

impl Default for HeuristicOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            coefficient: 0.1,
            default_lifetime: Duration::from_secs(0),
            never_cache_http10_responses_with_query_string: true,
        }
    }
}

/// Whether `entry` is an HTTP/1.0 request to a URI carrying a query
/// component, the case RFC 7234 §4.2.2 says heuristic freshness must not
/// cover without an explicit freshness signal.
fn is_http10_request_with_query_string(entry: &CacheEntry) -> bool {
    entry.request_version == Version::HTTP_10
        && entry.request_uri.parse::<Uri>().is_ok_and(|uri| uri.query().is_some())
}

const STATUS_CODE_CACHEABLE_BY_DEFAULT: &[u16] =
    &[200, 203, 204, 206, 300, 301, 308, 404, 405, 410, 414, 501];

fn cacheable_by_default(entry: &CacheEntry) -> bool {
    STATUS_CODE_CACHEABLE_BY_DEFAULT.contains(&entry.status.as_u16())
}

/// Freshness lifetime per RFC 7234 §4.2.1: `s-maxage` (shared caches only),
/// else `max-age`, else `Expires - Date`, else a heuristic estimate.
pub fn freshness_lifetime(
    entry: &CacheEntry,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
) -> Option<u64> {
    if shared_cache {
        if let Some(s) = response_cc.s_maxage {
            return Some(s as u64);
        }
    }
    if let Some(max_age) = response_cc.max_age {
        return Some(max_age as u64);
    }
    if let Some(expires) = entry.header("expires").and_then(parse_http_date) {
        let date = entry_date(entry);
        return Some(secs_between(expires, date).max(0) as u64);
    }
    if heuristics.enabled && cacheable_by_default(entry) {
        if heuristics.never_cache_http10_responses_with_query_string && is_http10_request_with_query_string(entry) {
            return None;
        }
        if let Some(last_modified) = entry.header("last-modified").and_then(parse_http_date) {
            let date = entry_date(entry);
            let delta = secs_between(date, last_modified).max(0) as u64;
            return Some(((delta as f64) * heuristics.coefficient) as u64);
        }
        return Some(heuristics.default_lifetime.as_secs());
    }
    None
}

/// `currentAge < freshnessLifetime`.
pub fn is_fresh(
    entry: &CacheEntry,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
    now: SystemTime,
) -> bool {
    match freshness_lifetime(entry, response_cc, shared_cache, heuristics) {
        Some(lifetime) => current_age(entry, now) < lifetime,
        None => false,
    }
}

/// Seconds of staleness remaining before `stale-while-revalidate` /
/// `stale-if-error` windows (if any) also run out. `None` if still fresh.
pub fn seconds_stale(
    entry: &CacheEntry,
    response_cc: &ResponseCacheControl,
    shared_cache: bool,
    heuristics: HeuristicOptions,
    now: SystemTime,
) -> Option<i64> {
    let lifetime = freshness_lifetime(entry, response_cc, shared_cache, heuristics)? as i64;
    let age = current_age(entry, now) as i64;
    if age >= lifetime {
        Some(age - lifetime)
    } else {
        None
    }
}

/// Whether a `stale-while-revalidate` window (request or response supplied)
/// still covers the given staleness.
pub fn within_stale_while_revalidate(stale_for: i64, window_secs: Option<u32>) -> bool {
    window_secs.is_some_and(|w| stale_for <= w as i64)
}

/// Whether a `stale-if-error` window (request or response supplied) still
/// covers the given staleness.
pub fn within_stale_if_error(stale_for: i64, window_secs: Option<u32>) -> bool {
    window_secs.is_some_and(|w| stale_for <= w as i64)
}
