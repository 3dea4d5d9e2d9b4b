//! The request/response decision pipeline: cache lookup, freshness,
//! conditional revalidation, storage, and single-flight collapsing on miss.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::Notify;

use crate::cache_control::{parse_request_cache_control, parse_response_cache_control};
use crate::compliance;
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, ResourceFactory};
use crate::error::Result;
use crate::generator;
use crate::invalidator;
use crate::key::{cache_key, variant_key, variant_storage_key};
use crate::origin::{boxed_bytes_body, CacheRequest, CacheResponse, OriginExecutor};
use crate::request_policy::is_request_cacheable;
use crate::response_policy::is_response_cacheable;
use crate::revalidation::AsynchronousValidator;
use crate::size_limited_reader::{self, CaptureOutcome};
use crate::storage::CacheStorage;
use crate::suitability::{self, Suitability};
use crate::update;

/// How a request was ultimately satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a stored entry without contacting the origin.
    CacheHit,
    /// The origin was contacted and its response stored fresh.
    CacheMiss,
    /// A conditional request to the origin returned 304 and the stored
    /// entry was refreshed.
    Validated,
    /// A cache-synthesized response (e.g. 504 for `only-if-cached`).
    CacheModuleResponse,
    /// The request bypassed caching entirely (unsafe method, `no-store`, …).
    Bypass,
}

/// A response produced by the pipeline, tagged with how it was produced.
#[derive(Debug)]
pub struct CacheResult {
    pub response: CacheResponse,
    pub outcome: CacheOutcome,
}

/// Orchestrates the caching decision pipeline over pluggable storage, an
/// origin transport, and a resource factory.
impl std::fmt::Debug for CachingExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingExec").finish()
    }
}

pub struct CachingExec {
    storage: Arc<dyn CacheStorage>,
    origin: Arc<dyn OriginExecutor>,
    resources: Arc<dyn ResourceFactory>,
    validator: Option<Arc<AsynchronousValidator>>,
    config: CacheConfig,
    inflight: DashMap<String, Arc<Notify>>,
}

impl CachingExec {
    pub fn new(
        storage: Arc<dyn CacheStorage>,
        origin: Arc<dyn OriginExecutor>,
        resources: Arc<dyn ResourceFactory>,
        config: CacheConfig,
    ) -> Self {
        let validator =
            (config.asynchronous_workers > 0).then(|| Arc::new(AsynchronousValidator::default_production()));
        Self { storage, origin, resources, validator, config, inflight: DashMap::new() }
    }

    /// Run the full pipeline for one request.
    pub async fn run(&self, request: CacheRequest) -> Result<CacheResult> {
        invalidator::flush_invalidated_on_request(
            self.storage.as_ref(),
            &request.method,
            &request.uri,
            &request.headers,
        )
        .await?;

        let request_cc = parse_request_cache_control(
            request.headers.get_all("cache-control").iter().filter_map(|v| v.to_str().ok()),
        );
        let pragma_no_cache = request
            .headers
            .get("pragma")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("no-cache"));

        if !is_request_cacheable(&request.method, &request_cc, pragma_no_cache) {
            log::debug!("{} {} is not request-cacheable, bypassing", request.method, request.uri);
            let response = self.origin.execute(request).await?;
            return Ok(CacheResult { response, outcome: CacheOutcome::Bypass });
        }

        if request.method == Method::GET {
            invalidator::flush_head_only_entry_on_get(self.storage.as_ref(), &request.uri).await?;
        }

        let root_key = cache_key(&request.uri);
        let (storage_key, entry) = self.lookup(&root_key, &request).await?;

        let Some(entry) = entry else {
            if request_cc.only_if_cached {
                return Ok(CacheResult {
                    response: gateway_timeout(),
                    outcome: CacheOutcome::CacheModuleResponse,
                });
            }
            return self.handle_miss(root_key, request).await;
        };

        let response_cc = parse_response_cache_control(
            entry.header_values("cache-control").collect::<Vec<_>>().into_iter(),
        );
        let now = SystemTime::now();
        let suitability =
            suitability::check(&entry, &request_cc, &response_cc, self.config.shared_cache, self.config.heuristics, now);
        log::debug!("suitability of {storage_key} for {} {} is {suitability:?}", request.method, request.uri);

        match suitability {
            Suitability::Fresh => {
                Ok(CacheResult { response: self.serve(&entry, &request.method, now), outcome: CacheOutcome::CacheHit })
            }
            Suitability::StaleButUsable => {
                let mut response = self.serve(&entry, &request.method, now);
                generator::add_warning(&mut response.headers, 110, &self.config.agent, "Response is Stale");
                Ok(CacheResult { response, outcome: CacheOutcome::CacheHit })
            }
            Suitability::StaleWhileRevalidate => {
                let mut response = self.serve(&entry, &request.method, now);
                generator::add_warning(&mut response.headers, 110, &self.config.agent, "Response is Stale");
                if let Some(validator) = self.validator.clone() {
                    let storage = Arc::clone(&self.storage);
                    let origin = Arc::clone(&self.origin);
                    let resources = Arc::clone(&self.resources);
                    let shared_cache = self.config.shared_cache;
                    let max_object_size = self.config.max_object_size;
                    let root_key_for_job = root_key.clone();
                    let request_for_job = request.clone();
                    let storage_key_for_job = storage_key.clone();
                    let entry_for_job = Arc::clone(&entry);
                    let _ = validator
                        .schedule_revalidation(&storage_key, move || async move {
                            revalidate_in_background(
                                storage,
                                origin,
                                resources,
                                shared_cache,
                                max_object_size,
                                root_key_for_job,
                                storage_key_for_job,
                                entry_for_job,
                                request_for_job,
                            )
                            .await
                        })
                        .await;
                } else {
                    return self.revalidate_foreground(storage_key, entry, request, now).await;
                }
                Ok(CacheResult { response, outcome: CacheOutcome::CacheHit })
            }
            Suitability::NeedsRevalidation => self.revalidate_foreground(storage_key, entry, request, now).await,
            Suitability::Unsuitable => self.handle_miss(root_key, request).await,
        }
    }

    async fn lookup(
        &self,
        root_key: &str,
        request: &CacheRequest,
    ) -> Result<(String, Option<Arc<CacheEntry>>)> {
        let Some(root_entry) = self.storage.get(root_key).await? else {
            return Ok((root_key.to_string(), None));
        };
        if root_entry.is_variant_root() {
            let Some(vary) = root_entry.header("vary") else {
                return Ok((root_key.to_string(), None));
            };
            let Some(vk) = variant_key(vary, &request.headers) else {
                return Ok((root_key.to_string(), None));
            };
            let storage_key = variant_storage_key(root_key, Some(&vk));
            let variant_entry = self.storage.get(&storage_key).await?;
            Ok((storage_key, variant_entry))
        } else {
            Ok((root_key.to_string(), Some(root_entry)))
        }
    }

    fn serve(&self, entry: &CacheEntry, method: &Method, now: SystemTime) -> CacheResponse {
        let response = generator::generate::<http_body_util::Full<Bytes>>(entry, method, now, &self.config.agent);
        let (parts, body) = response.into_parts();
        let body_bytes = body.into_buffered_data().unwrap_or_default();
        CacheResponse::from_bytes(parts.status, parts.version, parts.headers, body_bytes)
    }

    async fn revalidate_foreground(
        &self,
        storage_key: String,
        entry: Arc<CacheEntry>,
        request: CacheRequest,
        now: SystemTime,
    ) -> Result<CacheResult> {
        let conditional = conditional_request(&request, &entry);
        match self.origin.execute(conditional).await {
            Ok(response) if response.status == StatusCode::NOT_MODIFIED => {
                let merged = update::merge_304(&entry, response.status, &response.headers, now, SystemTime::now())?;
                let merged = Arc::new(merged);
                self.storage.put(&storage_key, Arc::clone(&merged)).await?;
                Ok(CacheResult { response: self.serve(&merged, &request.method, SystemTime::now()), outcome: CacheOutcome::Validated })
            }
            Ok(response) => self.store_fresh_response(storage_key, request, response).await,
            Err(err) => {
                let response_cc = parse_response_cache_control(
                    entry.header_values("cache-control").collect::<Vec<_>>().into_iter(),
                );
                let request_cc = parse_request_cache_control(
                    request.headers.get_all("cache-control").iter().filter_map(|v| v.to_str().ok()),
                );
                if suitability::allows_stale_if_error(
                    &entry,
                    &request_cc,
                    &response_cc,
                    self.config.shared_cache,
                    self.config.heuristics,
                    now,
                ) {
                    let mut response = self.serve(&entry, &request.method, now);
                    generator::add_warning(&mut response.headers, 111, &self.config.agent, "Revalidation Failed");
                    Ok(CacheResult { response, outcome: CacheOutcome::CacheHit })
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn handle_miss(&self, root_key: String, request: CacheRequest) -> Result<CacheResult> {
        if !self.config.request_collapsing_enabled {
            return self.fetch_and_store(root_key, request).await;
        }

        while let Some(notify) = self.inflight.get(&root_key).map(|n| Arc::clone(n.value())) {
            log::debug!("{root_key} already in flight, following as a single-flight waiter");
            notify.notified().await;
            if let Some(entry) = self.storage.get(&root_key).await? {
                let now = SystemTime::now();
                return Ok(CacheResult { response: self.serve(&entry, &request.method, now), outcome: CacheOutcome::CacheHit });
            }
        }

        let notify = Arc::new(Notify::new());
        match self.inflight.entry(root_key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Box::pin(self.handle_miss(root_key, request)).await;
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(Arc::clone(&notify));
            }
        }

        log::debug!("{root_key} is the single-flight leader, fetching from origin");
        let result = self.fetch_and_store(root_key.clone(), request).await;
        self.inflight.remove(&root_key);
        notify.notify_waiters();
        result
    }

    async fn fetch_and_store(&self, root_key: String, request: CacheRequest) -> Result<CacheResult> {
        let cache_request = CacheRequest {
            method: request.method.clone(),
            uri: request.uri.clone(),
            version: request.version,
            headers: request.headers.clone(),
        };
        let response = self.origin.execute(cache_request).await?;
        self.store_fresh_response(root_key, request, response).await
    }

    async fn store_fresh_response(
        &self,
        root_key: String,
        request: CacheRequest,
        response: CacheResponse,
    ) -> Result<CacheResult> {
        store_fresh_response(
            self.storage.as_ref(),
            self.resources.as_ref(),
            self.config.shared_cache,
            self.config.max_object_size,
            root_key,
            request,
            response,
        )
        .await
    }
}

/// Run an origin response through compliance/cacheability checks and, if
/// storable, capture and store it. Shared by the foreground miss/hit path
/// and background revalidation so a changed representation is captured the
/// same way regardless of which path discovered it.
async fn store_fresh_response(
    storage: &dyn CacheStorage,
    resources: &dyn ResourceFactory,
    shared_cache: bool,
    max_object_size: usize,
    root_key: String,
    request: CacheRequest,
    response: CacheResponse,
) -> Result<CacheResult> {
    let CacheResponse { status, version, headers, body } = response;

    let request_had_range = request.headers.contains_key("range");
    let dummy_request = http::Request::builder().method(request.method.clone()).body(()).unwrap();
    compliance::check(&dummy_request, status, request_had_range)?;

    let response_cc = parse_response_cache_control(
        headers.get_all("cache-control").iter().filter_map(|v| v.to_str().ok()),
    );
    let request_has_auth = request.headers.contains_key("authorization");

    invalidator::flush_invalidated_on_response(storage, &request.uri, status, &headers).await?;

    let storable = is_response_cacheable(&request.method, status, &response_cc, request_has_auth, shared_cache);

    if !storable {
        log::debug!("response for {root_key} is not cacheable, bypassing storage");
        let response = CacheResponse { status, version, headers, body };
        return Ok(CacheResult { response, outcome: CacheOutcome::Bypass });
    }

    let vary = headers.get("vary").and_then(|v| v.to_str().ok()).map(str::to_string);
    let storage_key = match &vary {
        Some(vary_value) => {
            let vk = variant_key(vary_value, &request.headers);
            variant_storage_key(&root_key, vk.as_deref())
        }
        None => root_key.clone(),
    };

    // A bodyless status (204/205/304/1xx) or a HEAD response never carries
    // an entity to capture; store the headers with no resource so future
    // lookups still see the entry without inventing a body.
    let bodyless = compliance::suppresses_entity(&request.method, status);

    let (resource, out_body) = if bodyless {
        (None, body)
    } else {
        match size_limited_reader::capture(body, max_object_size, resources, &storage_key).await? {
            CaptureOutcome::Stored(resource) => {
                let replay = boxed_bytes_body(Bytes::copy_from_slice(&resource.get()));
                (Some(resource), replay)
            }
            CaptureOutcome::TooLarge(reconstructed) => {
                log::debug!("response exceeds max_object_size, not storing {storage_key}");
                let response = CacheResponse { status, version, headers, body: reconstructed.boxed() };
                return Ok(CacheResult { response, outcome: CacheOutcome::CacheMiss });
            }
        }
    };

    let mut header_pairs: Vec<(String, String)> = Vec::new();
    for (name, value) in &headers {
        if let Ok(value_str) = value.to_str() {
            header_pairs.push((name.as_str().to_string(), value_str.to_string()));
        }
    }

    let now = SystemTime::now();
    let entry = CacheEntry {
        request_instant: now,
        response_instant: now,
        status,
        headers: header_pairs,
        resource,
        variant_map: Default::default(),
        request_method: request.method.clone(),
        request_uri: request.uri.to_string(),
        request_version: request.version,
    };

    log::debug!("storing entry for {storage_key} (status {})", entry.status);
    storage.put(&storage_key, Arc::new(entry)).await?;

    if let Some(vary_value) = vary.clone() {
        if let Some(vk) = variant_key(&vary_value, &request.headers) {
            let root_key_clone = root_key.clone();
            storage
                .update(
                    &root_key_clone,
                    Box::new(move |current| {
                        let parent = current.unwrap_or_else(|| {
                            Arc::new(CacheEntry {
                                request_instant: now,
                                response_instant: now,
                                status: StatusCode::OK,
                                headers: vec![("vary".to_string(), vary_value.clone())],
                                resource: None,
                                variant_map: Default::default(),
                                request_method: Method::GET,
                                request_uri: String::new(),
                                request_version: http::Version::HTTP_11,
                            })
                        });
                        Some(Arc::new(update::update_parent_entry(&parent, &vk, &storage_key)))
                    }),
                )
                .await?;
        }
    }

    let response = CacheResponse { status, version, headers, body: out_body };
    Ok(CacheResult { response, outcome: CacheOutcome::CacheMiss })
}

#[allow(clippy::too_many_arguments)]
async fn revalidate_in_background(
    storage: Arc<dyn CacheStorage>,
    origin: Arc<dyn OriginExecutor>,
    resources: Arc<dyn ResourceFactory>,
    shared_cache: bool,
    max_object_size: usize,
    root_key: String,
    storage_key: String,
    entry: Arc<CacheEntry>,
    request: CacheRequest,
) -> bool {
    let conditional = conditional_request(&request, &entry);
    match origin.execute(conditional).await {
        Ok(response) if response.status == StatusCode::NOT_MODIFIED => {
            let now = SystemTime::now();
            match update::merge_304(&entry, response.status, &response.headers, now, now) {
                Ok(merged) => {
                    log::info!("background revalidation of {storage_key} confirmed fresh (304)");
                    storage.put(&storage_key, Arc::new(merged)).await.is_ok()
                }
                Err(err) => {
                    log::warn!("background revalidation of {storage_key} failed to merge 304: {err}");
                    false
                }
            }
        }
        Ok(response) if response.status.is_success() || response.status.is_redirection() => {
            log::info!("background revalidation of {storage_key} returned a changed representation, re-storing");
            match store_fresh_response(
                storage.as_ref(),
                resources.as_ref(),
                shared_cache,
                max_object_size,
                root_key,
                request,
                response,
            )
            .await
            {
                Ok(_) => true,
                Err(err) => {
                    log::warn!("background revalidation of {storage_key} failed to store new response: {err}");
                    false
                }
            }
        }
        Ok(response) => {
            log::warn!("background revalidation of {storage_key} got status {}", response.status);
            false
        }
        Err(err) => {
            log::warn!("background revalidation of {storage_key} failed: {err}");
            false
        }
    }
}

fn conditional_request(request: &CacheRequest, entry: &CacheEntry) -> CacheRequest {
    let mut conditional = CacheRequest {
        method: request.method.clone(),
        uri: request.uri.clone(),
        version: request.version,
        headers: request.headers.clone(),
    };
    if let Some(etag) = entry.header("etag") {
        if let Ok(value) = HeaderValue::from_str(etag) {
            conditional.headers.insert("if-none-match", value);
        }
    }
    if let Some(last_modified) = entry.header("last-modified") {
        if let Ok(value) = HeaderValue::from_str(last_modified) {
            conditional.headers.insert("if-modified-since", value);
        }
    }
    conditional
}

fn gateway_timeout() -> CacheResponse {
    CacheResponse::from_bytes(StatusCode::GATEWAY_TIMEOUT, http::Version::HTTP_11, http::HeaderMap::new(), Bytes::new())
}
