//! Fetch interception, precaching, and offline fallback.
//!
//! The agent sits between the app shell and the network: app-shell requests
//! are answered cache-first out of the current generation, live API paths
//! bypass the cache entirely, and a failed navigation degrades to the
//! cached offline page instead of an error screen.

use crate::cache::{CacheStore, CachedResponse};
use crate::error::{fetch_error, Error, FetchErrorKind};
use crate::net::{Network, NetworkResponse};
use log::*;
use url::Url;

/// App-shell entries fetched into a fresh generation during install.
pub const PRECACHE_MANIFEST: [&str; 4] = ["/", "/listings.html", "/messages.html", "/offline.html"];

/// Served for failed navigations; part of the precache manifest so it is
/// available exactly when the network is not.
pub const OFFLINE_PAGE: &str = "/offline.html";

/// Path prefixes the cache must never touch: live data, the event stream,
/// and platform probes. These go straight to the network in both
/// directions - never served from cache, never written back.
pub const EXCLUDED_PREFIXES: [&str; 4] = ["/api/", "/internal/", "/sse", "/.well-known/"];

/// How the client intends to use the response. Navigations (address-bar
/// style page loads) are the only requests that may fall back to the
/// offline page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Navigation,
    Resource,
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: String,
    pub mode: FetchMode,
}

impl FetchRequest {
    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            mode: FetchMode::Navigation,
        }
    }

    pub fn resource(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            mode: FetchMode::Resource,
        }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Cache,
    Network,
    OfflineFallback,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub response: CachedResponse,
    pub source: FetchSource,
}

/// Pure cacheability rule: only complete 200 responses to GET requests are
/// copied into the cache. Error statuses and opaque responses pass through
/// to the caller untouched.
pub fn should_cache(request: &FetchRequest, response: &NetworkResponse) -> bool {
    request.is_get() && response.status == 200 && !response.opaque
}

/// Owns the response cache and the interception policy.
pub struct CacheAgent {
    store: CacheStore,
    manifest: Vec<String>,
    excluded_prefixes: Vec<String>,
    offline_page: String,
}

impl CacheAgent {
    pub fn new() -> Self {
        Self {
            store: CacheStore::new(),
            manifest: PRECACHE_MANIFEST.iter().map(|s| s.to_string()).collect(),
            excluded_prefixes: EXCLUDED_PREFIXES.iter().map(|s| s.to_string()).collect(),
            offline_page: OFFLINE_PAGE.to_string(),
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Warm the current generation from the precache manifest.
    ///
    /// Entries are fetched one at a time; an entry that fails (transport
    /// error or non-200) is recorded and the rest still install. When
    /// anything failed, the pass reports precache-incomplete naming the
    /// failed entries so the caller can retry.
    pub async fn install(&self, network: &dyn Network) -> Result<(), Error> {
        let mut failures: Vec<String> = Vec::new();

        for entry in &self.manifest {
            let request = FetchRequest::resource(entry.clone());
            match network.fetch(&request).await {
                Ok(response) if response.status == 200 => {
                    self.store.insert(entry, CachedResponse::from(&response));
                }
                Ok(response) => {
                    warn!("Precache fetch for {entry} returned {}", response.status);
                    failures.push(entry.clone());
                }
                Err(e) => {
                    warn!("Precache fetch for {entry} failed: {e}");
                    failures.push(entry.clone());
                }
            }
        }

        if failures.is_empty() {
            info!(
                "Precached {} entries into generation {}",
                self.manifest.len(),
                self.store.current_generation()
            );
            Ok(())
        } else {
            Err(fetch_error(
                FetchErrorKind::PrecacheIncomplete,
                &format!("failed entries: {}", failures.join(", ")),
            ))
        }
    }

    /// Serve one request. Decision order:
    ///
    /// 1. Excluded paths and non-GET methods bypass the cache entirely.
    /// 2. A hit in the current generation is served as-is.
    /// 3. A miss goes to the network; cacheable responses are copied in
    ///    before being returned.
    /// 4. On network failure, navigations fall back to the cached offline
    ///    page; resources (or a missing offline page) surface the error.
    pub async fn handle_fetch(
        &self,
        network: &dyn Network,
        request: &FetchRequest,
    ) -> Result<FetchOutcome, Error> {
        if self.is_excluded(&request.url) || !request.is_get() {
            let response = network.fetch(request).await?;
            return Ok(FetchOutcome {
                response: CachedResponse::from(&response),
                source: FetchSource::Network,
            });
        }

        if let Some(cached) = self.store.lookup(&request.url) {
            return Ok(FetchOutcome {
                response: cached,
                source: FetchSource::Cache,
            });
        }

        match network.fetch(request).await {
            Ok(response) => {
                if should_cache(request, &response) {
                    self.store
                        .insert(&request.url, CachedResponse::from(&response));
                }
                Ok(FetchOutcome {
                    response: CachedResponse::from(&response),
                    source: FetchSource::Network,
                })
            }
            Err(e) => {
                if request.mode == FetchMode::Navigation {
                    if let Some(offline) = self.store.lookup(&self.offline_page) {
                        info!("Network unreachable; serving offline page for {}", request.url);
                        return Ok(FetchOutcome {
                            response: offline,
                            source: FetchSource::OfflineFallback,
                        });
                    }
                }
                Err(e)
            }
        }
    }

    /// Promote the current generation: every other generation is deleted.
    pub fn activate(&self) {
        let evicted = self.store.activate();
        if evicted.is_empty() {
            info!("Cache generation {} active", self.store.current_generation());
        } else {
            info!(
                "Cache generation {} active; evicted {:?}",
                self.store.current_generation(),
                evicted
            );
        }
    }

    fn is_excluded(&self, url: &str) -> bool {
        let path = request_path(url);
        self.excluded_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Default for CacheAgent {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the path component for exclusion matching, whether the request
/// URL is absolute or a bare path.
fn request_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => match url.split_once(&['?', '#'][..]) {
            Some((before, _)) => before.to_string(),
            None => url.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{http_error, ErrorKind, HttpErrorKind};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeNetwork {
        responses: HashMap<String, NetworkResponse>,
        calls: AtomicUsize,
    }

    impl FakeNetwork {
        fn online(pages: &[(&str, &str)]) -> Self {
            let responses = pages
                .iter()
                .map(|(url, body)| (url.to_string(), ok_response(body)))
                .collect();
            Self {
                responses,
                calls: AtomicUsize::new(0),
            }
        }

        fn offline() -> Self {
            Self {
                responses: HashMap::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn with_response(mut self, url: &str, response: NetworkResponse) -> Self {
            self.responses.insert(url.to_string(), response);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<NetworkResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(&request.url)
                .cloned()
                .ok_or_else(|| http_error(HttpErrorKind::Network, "unreachable"))
        }
    }

    fn ok_response(body: &str) -> NetworkResponse {
        NetworkResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/html".to_string())],
            body: body.as_bytes().to_vec(),
            opaque: false,
        }
    }

    fn full_manifest() -> FakeNetwork {
        FakeNetwork::online(&[
            ("/", "shell"),
            ("/listings.html", "listings"),
            ("/messages.html", "messages"),
            ("/offline.html", "you are offline"),
        ])
    }

    #[tokio::test]
    async fn test_install_precaches_the_manifest() {
        let agent = CacheAgent::new();
        let network = full_manifest();

        agent.install(&network).await.unwrap();

        assert_eq!(agent.store().entry_count(), 4);
        assert_eq!(
            agent.store().lookup("/offline.html").unwrap().body_text(),
            "you are offline"
        );
    }

    #[tokio::test]
    async fn test_install_reports_failures_but_caches_the_rest() {
        let agent = CacheAgent::new();
        // No /messages.html mapped: that entry fails, the rest install.
        let network = FakeNetwork::online(&[
            ("/", "shell"),
            ("/listings.html", "listings"),
            ("/offline.html", "you are offline"),
        ]);

        let err = agent.install(&network).await.unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Fetch(FetchErrorKind::PrecacheIncomplete)
        );
        assert_eq!(agent.store().entry_count(), 3);
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let agent = CacheAgent::new();
        let network = FakeNetwork::online(&[("/listings.html", "listings")]);
        let request = FetchRequest::navigation("/listings.html");

        let first = agent.handle_fetch(&network, &request).await.unwrap();
        let second = agent.handle_fetch(&network, &request).await.unwrap();

        assert_eq!(first.source, FetchSource::Network);
        assert_eq!(second.source, FetchSource::Cache);
        assert_eq!(second.response.body_text(), "listings");
        assert_eq!(network.calls(), 1);
    }

    #[tokio::test]
    async fn test_excluded_paths_bypass_the_cache_entirely() {
        let agent = CacheAgent::new();
        let network = FakeNetwork::online(&[
            ("/api/listings", "[]"),
            ("/sse?identity=user-a", "stream"),
        ]);

        for _ in 0..2 {
            let outcome = agent
                .handle_fetch(&network, &FetchRequest::resource("/api/listings"))
                .await
                .unwrap();
            assert_eq!(outcome.source, FetchSource::Network);
        }
        agent
            .handle_fetch(&network, &FetchRequest::resource("/sse?identity=user-a"))
            .await
            .unwrap();

        // Every request went out; nothing was written back.
        assert_eq!(network.calls(), 3);
        assert_eq!(agent.store().entry_count(), 0);
    }

    #[tokio::test]
    async fn test_non_get_requests_bypass_the_cache() {
        let agent = CacheAgent::new();
        let network = FakeNetwork::online(&[("/form", "saved")]);
        agent.store().insert(
            "/form",
            CachedResponse {
                status: 200,
                headers: vec![],
                body: b"stale form".to_vec(),
            },
        );

        let outcome = agent
            .handle_fetch(&network, &FetchRequest::resource("/form").with_method("POST"))
            .await
            .unwrap();

        // Cached entry is neither served nor overwritten.
        assert_eq!(outcome.source, FetchSource::Network);
        assert_eq!(outcome.response.body_text(), "saved");
        assert_eq!(
            agent.store().lookup("/form").unwrap().body_text(),
            "stale form"
        );
    }

    #[tokio::test]
    async fn test_error_statuses_and_opaque_responses_are_not_cached() {
        let agent = CacheAgent::new();
        let network = FakeNetwork::offline()
            .with_response(
                "/flaky",
                NetworkResponse {
                    status: 500,
                    headers: vec![],
                    body: b"error".to_vec(),
                    opaque: false,
                },
            )
            .with_response(
                "/third-party.js",
                NetworkResponse {
                    status: 200,
                    headers: vec![],
                    body: Vec::new(),
                    opaque: true,
                },
            );

        let flaky = agent
            .handle_fetch(&network, &FetchRequest::resource("/flaky"))
            .await
            .unwrap();
        agent
            .handle_fetch(&network, &FetchRequest::resource("/third-party.js"))
            .await
            .unwrap();

        assert_eq!(flaky.response.status, 500);
        assert_eq!(agent.store().entry_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_navigation_falls_back_to_the_offline_page() {
        let agent = CacheAgent::new();
        agent.install(&full_manifest()).await.unwrap();
        let dead_network = FakeNetwork::offline();

        let outcome = agent
            .handle_fetch(&dead_network, &FetchRequest::navigation("/brand-new-page"))
            .await
            .unwrap();

        assert_eq!(outcome.source, FetchSource::OfflineFallback);
        assert_eq!(outcome.response.body_text(), "you are offline");
    }

    #[tokio::test]
    async fn test_failed_resource_fetch_surfaces_the_error() {
        let agent = CacheAgent::new();
        agent.install(&full_manifest()).await.unwrap();
        let dead_network = FakeNetwork::offline();

        let err = agent
            .handle_fetch(&dead_network, &FetchRequest::resource("/app.css"))
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Http(HttpErrorKind::Network));
    }

    #[tokio::test]
    async fn test_failed_navigation_without_offline_page_surfaces_the_error() {
        let agent = CacheAgent::new();
        let dead_network = FakeNetwork::offline();

        let err = agent
            .handle_fetch(&dead_network, &FetchRequest::navigation("/anything"))
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Http(HttpErrorKind::Network));
    }

    #[test]
    fn test_cacheability_rule() {
        let get = FetchRequest::resource("/x");
        let post = FetchRequest::resource("/x").with_method("POST");

        assert!(should_cache(&get, &ok_response("x")));
        assert!(!should_cache(&post, &ok_response("x")));
        assert!(!should_cache(
            &get,
            &NetworkResponse {
                status: 404,
                headers: vec![],
                body: vec![],
                opaque: false,
            }
        ));
        assert!(!should_cache(
            &get,
            &NetworkResponse {
                status: 200,
                headers: vec![],
                body: vec![],
                opaque: true,
            }
        ));
    }

    #[test]
    fn test_exclusion_matches_paths_in_absolute_urls() {
        let agent = CacheAgent::new();
        assert!(agent.is_excluded("http://app.test/api/listings?page=2"));
        assert!(agent.is_excluded("/internal/events"));
        assert!(agent.is_excluded("/sse?identity=user-a"));
        assert!(!agent.is_excluded("/listings.html"));
    }
}
