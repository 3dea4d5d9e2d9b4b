use std::collections::{HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, Version};
use http_body_util::BodyExt;

use http_cache_core::config::CacheConfig;
use http_cache_core::entry::HeapResourceFactory;
use http_cache_core::exec::{CacheOutcome, CachingExec};
use http_cache_core::origin::{CacheRequest, CacheResponse, OriginExecutor};
use http_cache_core::storage::InternalCacheStorage;

/// Drain a response body to owned bytes for assertions.
async fn body_bytes(response: CacheResponse) -> Bytes {
    response.body.collect().await.unwrap().to_bytes()
}

/// An origin stub that serves canned responses keyed by path and counts
/// how many times each path was actually hit, so tests can assert on
/// cache-vs-origin traffic.
struct StubOrigin {
    hits: AtomicUsize,
    responses: Mutex<HashMap<String, VecDeque<CacheResponse>>>,
}

impl StubOrigin {
    fn new() -> Self {
        Self { hits: AtomicUsize::new(0), responses: Mutex::new(HashMap::new()) }
    }

    fn queue(&self, path: &str, response: CacheResponse) {
        self.responses.lock().unwrap().entry(path.to_string()).or_default().push_back(response);
    }

    fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OriginExecutor for StubOrigin {
    async fn execute(&self, request: CacheRequest) -> http_cache_core::error::Result<CacheResponse> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let path = request.uri.path().to_string();
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(&path).expect("unexpected origin call");
        Ok(queue.pop_front().expect("origin queue exhausted"))
    }
}

fn ok_response(headers: &[(&str, &str)], body: &[u8]) -> CacheResponse {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(HeaderName::from_bytes(name.as_bytes()).unwrap(), HeaderValue::from_str(value).unwrap());
    }
    CacheResponse::from_bytes(StatusCode::OK, Version::HTTP_11, map, Bytes::copy_from_slice(body))
}

fn exec(origin: Arc<StubOrigin>) -> CachingExec {
    let storage = Arc::new(InternalCacheStorage::new(NonZeroUsize::new(64).unwrap()));
    let config = CacheConfig { asynchronous_workers: 0, ..CacheConfig::default() };
    CachingExec::new(storage, origin, Arc::new(HeapResourceFactory), config)
}

fn exec_with_background_revalidation(origin: Arc<StubOrigin>) -> CachingExec {
    let storage = Arc::new(InternalCacheStorage::new(NonZeroUsize::new(64).unwrap()));
    let config = CacheConfig { asynchronous_workers: 1, ..CacheConfig::default() };
    CachingExec::new(storage, origin, Arc::new(HeapResourceFactory), config)
}

fn get(uri: &str) -> CacheRequest {
    CacheRequest::new(Method::GET, uri.parse::<Uri>().unwrap())
}

#[tokio::test]
async fn cold_miss_then_fresh_hit() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60")], b"hello"));
    let exec = exec(Arc::clone(&origin));

    let first = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(first.outcome, CacheOutcome::CacheMiss);

    let second = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(second.outcome, CacheOutcome::CacheHit);
    assert_eq!(origin.hit_count(), 1);
}

#[tokio::test]
async fn concurrent_requests_collapse_into_one_origin_call() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60")], b"hello"));
    let exec = Arc::new(exec(Arc::clone(&origin)));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let exec = Arc::clone(&exec);
        handles.push(tokio::spawn(async move { exec.run(get("http://example.com/a")).await.unwrap() }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(origin.hit_count(), 1);
}

#[tokio::test]
async fn vary_header_stores_independent_variants() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60"), ("vary", "accept-language")], b"english"));
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60"), ("vary", "accept-language")], b"french"));
    let exec = exec(Arc::clone(&origin));

    let mut en = get("http://example.com/a");
    en.headers.insert("accept-language", HeaderValue::from_static("en"));
    let en_result = exec.run(en.clone()).await.unwrap();
    assert_eq!(en_result.outcome, CacheOutcome::CacheMiss);
    assert_eq!(&body_bytes(en_result.response).await[..], b"english");

    let mut fr = get("http://example.com/a");
    fr.headers.insert("accept-language", HeaderValue::from_static("fr"));
    let fr_result = exec.run(fr.clone()).await.unwrap();
    assert_eq!(fr_result.outcome, CacheOutcome::CacheMiss);
    assert_eq!(&body_bytes(fr_result.response).await[..], b"french");

    let en_again = exec.run(en).await.unwrap();
    assert_eq!(en_again.outcome, CacheOutcome::CacheHit);
    assert_eq!(&body_bytes(en_again.response).await[..], b"english");

    assert_eq!(origin.hit_count(), 2);
}

#[tokio::test]
async fn stale_entry_revalidates_and_merges_304() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue("/a", ok_response(&[("cache-control", "max-age=0"), ("etag", "\"v1\"")], b"hello"));
    origin.queue(
        "/a",
        CacheResponse::from_bytes(
            StatusCode::NOT_MODIFIED,
            Version::HTTP_11,
            {
                let mut map = HeaderMap::new();
                map.insert("etag", HeaderValue::from_static("\"v1\""));
                map.insert("cache-control", HeaderValue::from_static("max-age=60"));
                map
            },
            Bytes::new(),
        ),
    );
    let exec = exec(Arc::clone(&origin));

    let first = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(first.outcome, CacheOutcome::CacheMiss);

    let second = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(second.outcome, CacheOutcome::Validated);
    assert_eq!(&body_bytes(second.response).await[..], b"hello");
    assert_eq!(origin.hit_count(), 2);

    // Now fresh again; a third request should be a straight hit.
    let third = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(third.outcome, CacheOutcome::CacheHit);
    assert_eq!(origin.hit_count(), 2);
}

#[tokio::test]
async fn background_revalidation_stores_a_changed_representation() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue(
        "/a",
        ok_response(&[("cache-control", "max-age=0, stale-while-revalidate=30")], b"hello"),
    );
    origin.queue(
        "/a",
        ok_response(&[("cache-control", "max-age=60, stale-while-revalidate=30")], b"updated"),
    );
    let exec = exec_with_background_revalidation(Arc::clone(&origin));

    let first = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(first.outcome, CacheOutcome::CacheMiss);

    // Immediately stale, so this is served from cache while a background
    // revalidation is scheduled.
    let second = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(second.outcome, CacheOutcome::CacheHit);
    assert_eq!(&body_bytes(second.response).await[..], b"hello");

    // Give the spawned background task a chance to run and re-store.
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        if origin.hit_count() == 2 {
            break;
        }
    }
    assert_eq!(origin.hit_count(), 2);

    // Now fresh again from the re-stored origin response; no further origin hit.
    let third = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(third.outcome, CacheOutcome::CacheHit);
    assert_eq!(&body_bytes(third.response).await[..], b"updated");
    assert_eq!(origin.hit_count(), 2);
}

#[tokio::test]
async fn unsafe_method_invalidates_content_location_target() {
    let origin = Arc::new(StubOrigin::new());
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60")], b"hello"));
    origin.queue("/a", ok_response(&[("content-location", "/a")], b"updated"));
    let exec = exec(Arc::clone(&origin));

    let first = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(first.outcome, CacheOutcome::CacheMiss);

    let put = CacheRequest::new(Method::PUT, "http://example.com/a".parse().unwrap());
    let put_result = exec.run(put).await.unwrap();
    assert_eq!(put_result.outcome, CacheOutcome::Bypass);

    // The GET entry was flushed by the PUT's Content-Location; next GET is a miss again.
    origin.queue("/a", ok_response(&[("cache-control", "max-age=60")], b"hello-again"));
    let third = exec.run(get("http://example.com/a")).await.unwrap();
    assert_eq!(third.outcome, CacheOutcome::CacheMiss);
    assert_eq!(&body_bytes(third.response).await[..], b"hello-again");
}
