//! Cache invalidation on unsafe methods and on `Content-Location`/`Location`.

use http::{HeaderMap, Method, Uri};

use crate::cache_control::parse_http_date;
use crate::entry::CacheEntry;
use crate::error::Result;
use crate::key::{cache_key, resolve_location, same_origin};
use crate::storage::CacheStorage;

/// Flush every entry an unsafe-method request would invalidate: the
/// request's own key, all of its variants, and same-origin
/// `Content-Location`/`Location` targets.
pub async fn flush_invalidated_on_request(
    storage: &dyn CacheStorage,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<()> {
    if matches!(*method, Method::GET | Method::HEAD) {
        return Ok(());
    }
    let root_key = cache_key(uri);
    log::info!("{method} {uri} invalidates {root_key}");
    remove_with_variants(storage, &root_key).await?;

    for name in ["content-location", "location"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            if let Some(target) = resolve_location(uri, value) {
                if same_origin(uri, &target) {
                    let key = cache_key(&target);
                    log::info!("{method} {uri} invalidates {name} target {key}");
                    remove_with_variants(storage, &key).await?;
                }
            }
        }
    }
    Ok(())
}

/// Flush the entry at `uri` when a successful, same-origin
/// `Content-Location`/`Location` response indicates the representation
/// changed: the existing rule is to flush unless both sides have usable
/// dates, a matching `ETag`, and the response is not newer.
pub async fn flush_invalidated_on_response(
    storage: &dyn CacheStorage,
    request_uri: &Uri,
    status: http::StatusCode,
    response_headers: &HeaderMap,
) -> Result<()> {
    if !matches!(status.as_u16(), 200..=299 | 301 | 308) {
        return Ok(());
    }
    for name in ["content-location", "location"] {
        let Some(value) = response_headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let Some(target) = resolve_location(request_uri, value) else { continue };
        if !same_origin(request_uri, &target) {
            continue;
        }
        let key = cache_key(&target);
        let Some(existing) = storage.get(&key).await? else { continue };
        if should_flush_for_response(&existing, status, response_headers) {
            log::info!("response to {request_uri} invalidates {name} target {key}");
            remove_with_variants(storage, &key).await?;
        }
    }
    Ok(())
}

/// A `GET` arriving for a URI whose stored entry was created from a `HEAD`
/// is never suitable for that `GET`; flush it so a real body gets fetched.
pub async fn flush_head_only_entry_on_get(storage: &dyn CacheStorage, uri: &Uri) -> Result<()> {
    let key = cache_key(uri);
    if let Some(entry) = storage.get(&key).await? {
        if entry.request_method == Method::HEAD {
            log::debug!("GET {uri} flushes HEAD-only entry {key}");
            remove_with_variants(storage, &key).await?;
        }
    }
    Ok(())
}

fn should_flush_for_response(
    existing: &CacheEntry,
    status: http::StatusCode,
    response_headers: &HeaderMap,
) -> bool {
    let existing_etag = existing.header("etag");
    let response_etag = response_headers.get("etag").and_then(|v| v.to_str().ok());
    match (existing_etag, response_etag) {
        (Some(a), Some(b)) if a == b => {
            let existing_date = existing.header("date").and_then(parse_http_date);
            let response_date =
                response_headers.get("date").and_then(|v| v.to_str().ok()).and_then(parse_http_date);
            match (existing_date, response_date) {
                (Some(ed), Some(rd)) => rd > ed,
                _ => true,
            }
        }
        _ => {
            let _ = status;
            true
        }
    }
}

async fn remove_with_variants(storage: &dyn CacheStorage, key: &str) -> Result<()> {
    if let Some(entry) = storage.get(key).await? {
        for variant_key in entry.variant_map.values() {
            storage.remove(variant_key).await?;
        }
    }
    storage.remove(key).await
}
