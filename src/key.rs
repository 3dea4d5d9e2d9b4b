//! Canonical storage keys and `Vary`-derived variant keys.

use http::{HeaderMap, Uri};

/// Compute the canonical storage key for a request target.
///
/// Lowercases scheme and host, makes the port explicit (so `http://Host`
/// and `http://host:80` collide on one entry), and keeps path + query as-is.
pub fn cache_key(uri: &Uri) -> String {
    let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
    let host = uri.host().unwrap_or_default().to_ascii_lowercase();
    let port = uri.port_u16().unwrap_or(match scheme.as_str() {
        "https" => 443,
        _ => 80,
    });
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let key = format!("{scheme}://{host}:{port}{path_and_query}");
    log::trace!("cache key for {uri} -> {key}");
    key
}

/// Build the variant key for a request given the `Vary` field list of the
/// entry it is being matched against. Returns `None` when `Vary: *` is
/// present: such a resource never produces a stable variant key and must be
/// treated as immediately stale/uncacheable for lookup purposes.
pub fn variant_key(vary: &str, request_headers: &HeaderMap) -> Option<String> {
    if vary.split(',').any(|f| f.trim() == "*") {
        return None;
    }
    let mut fields: Vec<String> =
        vary.split(',').map(|f| f.trim().to_ascii_lowercase()).filter(|f| !f.is_empty()).collect();
    fields.sort();
    fields.dedup();
    let mut parts = Vec::with_capacity(fields.len());
    for field in fields {
        let value = request_headers
            .get(field.as_str())
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        parts.push(format!("{field}={}", percent_encode(value)));
    }
    let key = format!("{{{}}}", parts.join("&"));
    log::trace!("variant key for Vary: {vary} -> {key}");
    Some(key)
}

/// Prefix a root key with a variant key, or return the root key unchanged
/// for resources that do not vary.
pub fn variant_storage_key(root_key: &str, variant_key: Option<&str>) -> String {
    match variant_key {
        Some(vk) => format!("{vk}{root_key}"),
        None => root_key.to_string(),
    }
}

/// Resolve a (possibly relative) `Location`/`Content-Location` value
/// against the URI the request/response concerns, for invalidation.
pub fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    if let Ok(absolute) = location.parse::<Uri>() {
        if absolute.scheme().is_some() {
            return Some(absolute);
        }
    }
    let mut parts = base.clone().into_parts();
    let path_and_query = if location.starts_with('/') {
        location.to_string()
    } else {
        let base_path = base.path();
        let dir = &base_path[..base_path.rfind('/').map(|i| i + 1).unwrap_or(0)];
        format!("{dir}{location}")
    };
    parts.path_and_query = path_and_query.parse().ok();
    Uri::from_parts(parts).ok()
}

/// Same-origin check (host + port) used to decide whether a
/// `Location`/`Content-Location` is eligible to drive invalidation.
pub fn same_origin(a: &Uri, b: &Uri) -> bool {
    let host_eq = a.host().map(|h| h.to_ascii_lowercase()) == b.host().map(|h| h.to_ascii_lowercase());
    let port_eq = a.port_u16().unwrap_or(default_port(a)) == b.port_u16().unwrap_or(default_port(b));
    host_eq && port_eq
}

fn default_port(uri: &Uri) -> u16 {
    match uri.scheme_str() {
        Some("https") => 443,
        _ => 80,
    }
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
