//! `Cache-Control` parsing/formatting, `delta-seconds`, `Warning`, and
//! HTTP-date helpers shared by the freshness and policy modules.

use std::time::SystemTime;

/// Parsed `Cache-Control` directives sent on a request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestCacheControl {
    pub max_age: Option<u32>,
    pub max_stale: Option<Option<u32>>,
    pub min_fresh: Option<u32>,
    pub no_cache: bool,
    pub no_store: bool,
    pub only_if_cached: bool,
    pub stale_if_error: Option<u32>,
}

/// Parsed `Cache-Control` directives sent on a response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResponseCacheControl {
    pub public: bool,
    pub private: bool,
    pub private_fields: Vec<String>,
    pub no_cache: bool,
    pub no_cache_fields: Vec<String>,
    pub no_store: bool,
    pub no_transform: bool,
    pub must_revalidate: bool,
    pub proxy_revalidate: bool,
    pub max_age: Option<u32>,
    pub s_maxage: Option<u32>,
    pub stale_while_revalidate: Option<u32>,
    pub stale_if_error: Option<u32>,
}

fn directives(value: &str) -> impl Iterator<Item = (String, Option<String>)> + '_ {
    value.split(',').filter_map(|raw| {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.split_once('=') {
            Some((name, val)) => {
                let val = val.trim().trim_matches('"').to_string();
                Some((name.trim().to_ascii_lowercase(), Some(val)))
            }
            None => Some((raw.to_ascii_lowercase(), None)),
        }
    })
}

fn parse_delta_seconds(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.parse::<u32>().ok())
}

/// Parse every `Cache-Control` header value present on a request.
pub fn parse_request_cache_control<'a>(values: impl Iterator<Item = &'a str>) -> RequestCacheControl {
    let mut cc = RequestCacheControl::default();
    for value in values {
        for (name, val) in directives(value) {
            match name.as_str() {
                "max-age" => cc.max_age = parse_delta_seconds(val.as_deref()),
                "max-stale" => cc.max_stale = Some(parse_delta_seconds(val.as_deref())),
                "min-fresh" => cc.min_fresh = parse_delta_seconds(val.as_deref()),
                "no-cache" => cc.no_cache = true,
                "no-store" => cc.no_store = true,
                "only-if-cached" => cc.only_if_cached = true,
                "stale-if-error" => cc.stale_if_error = parse_delta_seconds(val.as_deref()),
                _ => {}
            }
        }
    }
    cc
}

/// Parse every `Cache-Control` header value present on a response.
pub fn parse_response_cache_control<'a>(values: impl Iterator<Item = &'a str>) -> ResponseCacheControl {
    let mut cc = ResponseCacheControl::default();
    for value in values {
        for (name, val) in directives(value) {
            match name.as_str() {
                "public" => cc.public = true,
                "private" => {
                    cc.private = true;
                    if let Some(v) = &val {
                        cc.private_fields.extend(v.split(' ').filter(|s| !s.is_empty()).map(str::to_string));
                    }
                }
                "no-cache" => {
                    cc.no_cache = true;
                    if let Some(v) = &val {
                        cc.no_cache_fields.extend(v.split(' ').filter(|s| !s.is_empty()).map(str::to_string));
                    }
                }
                "no-store" => cc.no_store = true,
                "no-transform" => cc.no_transform = true,
                "must-revalidate" => cc.must_revalidate = true,
                "proxy-revalidate" => cc.proxy_revalidate = true,
                "max-age" => cc.max_age = parse_delta_seconds(val.as_deref()),
                "s-maxage" => cc.s_maxage = parse_delta_seconds(val.as_deref()),
                "stale-while-revalidate" => cc.stale_while_revalidate = parse_delta_seconds(val.as_deref()),
                "stale-if-error" => cc.stale_if_error = parse_delta_seconds(val.as_deref()),
                _ => {}
            }
        }
    }
    cc
}

/// Render a response's `Cache-Control` back into canonical header-token
/// order; directives absent (negative/`None`) are omitted.
pub fn format_response_cache_control(cc: &ResponseCacheControl) -> String {
    let mut tokens = Vec::new();
    if cc.public {
        tokens.push("public".to_string());
    }
    if cc.private {
        tokens.push(private_like_token("private", &cc.private_fields));
    }
    if cc.no_cache {
        tokens.push(private_like_token("no-cache", &cc.no_cache_fields));
    }
    if cc.no_store {
        tokens.push("no-store".to_string());
    }
    if cc.no_transform {
        tokens.push("no-transform".to_string());
    }
    if cc.must_revalidate {
        tokens.push("must-revalidate".to_string());
    }
    if cc.proxy_revalidate {
        tokens.push("proxy-revalidate".to_string());
    }
    if let Some(age) = cc.max_age {
        tokens.push(format!("max-age={age}"));
    }
    if let Some(age) = cc.s_maxage {
        tokens.push(format!("s-maxage={age}"));
    }
    if let Some(secs) = cc.stale_while_revalidate {
        tokens.push(format!("stale-while-revalidate={secs}"));
    }
    if let Some(secs) = cc.stale_if_error {
        tokens.push(format!("stale-if-error={secs}"));
    }
    tokens.join(", ")
}

fn private_like_token(name: &str, fields: &[String]) -> String {
    if fields.is_empty() {
        name.to_string()
    } else {
        format!("{name}=\"{}\"", fields.join(" "))
    }
}

/// Parse an HTTP-date (`Date`, `Expires`, `Last-Modified`, `If-Modified-Since`).
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}

/// Format a `SystemTime` as an HTTP-date for `Date`/`Expires`/`If-Modified-Since`.
pub fn format_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// The warn-code of a single `Warning` header value, e.g. `110` out of
/// `110 anderson/1.3.37 "Response is stale"`.
pub fn warning_code(value: &str) -> Option<u16> {
    value.trim().split(' ').next()?.parse().ok()
}

/// True for `Warning` values with a `1xx` warn-code: these are one-shot and
/// must be stripped whenever an entry is refreshed.
pub fn is_one_shot_warning(value: &str) -> bool {
    warning_code(value).is_some_and(|code| (100..200).contains(&code))
}
