//! Transport seam between the cache agent and the real network.
//!
//! The agent only ever talks to the [`Network`] trait, so tests and the
//! offline scenarios can swap in a scripted transport; [`HttpNetwork`] is
//! the reqwest-backed implementation used against a live server.

use crate::agent::FetchRequest;
use crate::cache::CachedResponse;
use crate::error::{http_error, Error, ErrorKind, FetchErrorKind, HttpErrorKind};
use async_trait::async_trait;
use log::*;
use std::time::Duration;
use url::Url;

/// What came back from a transport attempt.
#[derive(Debug, Clone)]
pub struct NetworkResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Body withheld by the transport (cross-origin fetch without shared
    /// access). Opaque responses are passed through to callers but never
    /// written to the cache.
    pub opaque: bool,
}

impl From<&NetworkResponse> for CachedResponse {
    fn from(response: &NetworkResponse) -> Self {
        CachedResponse {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
        }
    }
}

/// Transport used by the cache agent for everything it does not serve
/// from cache.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<NetworkResponse, Error>;
}

/// reqwest-backed [`Network`].
#[derive(Debug)]
pub struct HttpNetwork {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpNetwork {
    /// `base_url` anchors relative request paths. `timeout` bounds every
    /// single attempt, so one unreachable resource cannot stall a whole
    /// install pass.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, Error> {
        let base_url = Url::parse(base_url).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Fetch(FetchErrorKind::InvalidUrl),
        })?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn resolve(&self, url: &str) -> Result<Url, Error> {
        // join() keeps absolute inputs as-is and anchors relative ones.
        self.base_url.join(url).map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Fetch(FetchErrorKind::InvalidUrl),
        })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<NetworkResponse, Error> {
        let url = self.resolve(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            http_error(
                HttpErrorKind::BuilderFailed,
                &format!("invalid request method: {}", request.method),
            )
        })?;

        let response = self.client.request(method, url.clone()).send().await?;
        let status = response.status().as_u16();
        debug!("{} {} -> {}", request.method, url, status);

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).to_string(),
                )
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(NetworkResponse {
            status,
            headers,
            body,
            // A direct fetch always shares status and body with us.
            opaque: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_returns_status_headers_and_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/listings.html")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>listings</html>")
            .create_async()
            .await;

        let network = HttpNetwork::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = network
            .fetch(&FetchRequest::resource("/listings.html"))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response
            .headers
            .iter()
            .any(|(name, value)| name == "content-type" && value.starts_with("text/html")));
        assert_eq!(response.body, b"<html>listings</html>");
        assert!(!response.opaque);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_passes_error_statuses_through() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let network = HttpNetwork::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = network
            .fetch(&FetchRequest::resource("/missing"))
            .await
            .unwrap();

        // Transport success with an error status is not a fetch error.
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_fetch_sends_the_request_method() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/messages")
            .with_status(202)
            .create_async()
            .await;

        let network = HttpNetwork::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = network
            .fetch(&FetchRequest::resource("/api/messages").with_method("POST"))
            .await
            .unwrap();

        assert_eq!(response.status, 202);
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = HttpNetwork::new("not a url", Duration::from_secs(5)).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Fetch(FetchErrorKind::InvalidUrl)
        );
    }
}
