//! Synthesize a client-facing response from a stored entry.

use std::time::SystemTime;

use http::{HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode, Version};

use crate::body::CacheBody;
use crate::entry::CacheEntry;
use crate::validity::{current_age, MAX_AGE};

/// Build a response for `request_method` out of `entry`, adding `Age` and
/// `Via`, and omitting the entity body for `HEAD`.
pub fn generate<B>(
    entry: &CacheEntry,
    request_method: &Method,
    now: SystemTime,
    agent: &str,
) -> Response<CacheBody<B>> {
    let mut builder = Response::builder().status(entry.status).version(Version::HTTP_11);

    let mut has_transfer_encoding = false;
    {
        let headers = builder.headers_mut().expect("builder headers always present before body");
        for (name, value) in &entry.headers {
            if name.eq_ignore_ascii_case("transfer-encoding") {
                has_transfer_encoding = true;
            }
            if let (Ok(name), Ok(value)) =
                (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str()))
            {
                headers.append(name, value);
            }
        }
        let age = current_age(entry, now).min(MAX_AGE);
        if age > 0 {
            headers.insert("age", HeaderValue::from_str(&age.to_string()).unwrap());
        }
        headers.insert(
            "via",
            HeaderValue::from_str(&format!("1.1 localhost ({agent} (cache))")).unwrap(),
        );
        if !has_transfer_encoding {
            if let Some(resource) = &entry.resource {
                headers.insert(
                    "content-length",
                    HeaderValue::from_str(&resource.length().to_string()).unwrap(),
                );
            }
        }
    }

    let body = if *request_method == Method::HEAD {
        CacheBody::buffered(bytes::Bytes::new())
    } else {
        match &entry.resource {
            Some(resource) => CacheBody::buffered(bytes::Bytes::copy_from_slice(&resource.get())),
            None => CacheBody::buffered(bytes::Bytes::new()),
        }
    };

    builder.body(body).expect("status/headers built above are always valid")
}

/// Add a `Warning` header with the given code and text, per RFC 7234 §5.5.
pub fn add_warning(headers: &mut HeaderMap, code: u16, agent: &str, text: &str) {
    let value = format!("{code} {agent} \"{text}\"");
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.append("warning", value);
    }
}

/// Synthesize a `504 Gateway Timeout` for `only-if-cached` misses.
pub fn gateway_timeout<B: Default>() -> Response<CacheBody<B>> {
    Response::builder()
        .status(StatusCode::GATEWAY_TIMEOUT)
        .body(CacheBody::buffered(bytes::Bytes::new()))
        .expect("status is always valid")
}
