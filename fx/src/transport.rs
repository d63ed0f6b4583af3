//! HTTP transport used by the feed client.

use async_trait::async_trait;

use crate::config::FxConfig;
use crate::error::{FetchError, TransportErrorKind};

/// Raw response from a single GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }
}

/// A single HTTP GET. Status codes are returned, not interpreted.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError>;
}

/// Transport backed by one long-lived `reqwest::Client`.
///
/// The client owns the connection pool, so build this once and share it.
/// Bodies are streamed and abandoned as soon as they pass `max_body_bytes`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl ReqwestTransport {
    /// Build the underlying client with the configured timeout, redirect
    /// cap and user agent.
    pub fn new(config: &FxConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.http_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| FetchError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, config.max_feed_bytes))
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn with_client(client: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            client,
            max_body_bytes,
        }
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| FetchError::Request(format!("invalid URL {url}: {e}")))?;

        let mut response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status().as_u16();

        // Error bodies are never decoded.
        if !response.status().is_success() {
            return Ok(TransportResponse::new(status, Vec::new()));
        }

        let limit = self.max_body_bytes;
        if let Some(announced) = response.content_length() {
            if announced > limit as u64 {
                return Err(FetchError::BodyTooLarge { limit });
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| FetchError::Transport {
            kind: TransportErrorKind::Body,
            message: format!("failed to read response body: {e}"),
        })? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(TransportResponse { status, body })
    }
}

fn classify(e: reqwest::Error) -> FetchError {
    if e.is_redirect() {
        FetchError::TooManyRedirects
    } else if e.is_builder() {
        FetchError::Request(e.to_string())
    } else if e.is_timeout() {
        FetchError::Transport {
            kind: TransportErrorKind::Timeout,
            message: format!("request timeout: {e}"),
        }
    } else if e.is_connect() {
        FetchError::Transport {
            kind: TransportErrorKind::Connect,
            message: format!("connection failed: {e}"),
        }
    } else {
        FetchError::Transport {
            kind: TransportErrorKind::Other,
            message: format!("request failed: {e}"),
        }
    }
}

/// Scripted transport for tests.
///
/// Replays queued outcomes in order, then repeats the fallback. Records
/// the URL and (tokio) instant of every call.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockTransport {
    script: parking_lot::Mutex<std::collections::VecDeque<MockOutcome>>,
    fallback: MockOutcome,
    calls: parking_lot::Mutex<Vec<(String, tokio::time::Instant)>>,
}

#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Respond(TransportResponse),
    Fail(TransportErrorKind),
    TooManyRedirects,
    /// Never completes.
    Hang,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockTransport {
    /// Always answer with `fallback`.
    pub fn new(fallback: MockOutcome) -> Self {
        Self {
            script: parking_lot::Mutex::new(Default::default()),
            fallback,
            calls: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `status` and `body`.
    pub fn responding(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self::new(MockOutcome::Respond(TransportResponse::new(status, body)))
    }

    /// Queue an outcome ahead of the fallback.
    pub fn then(self, outcome: MockOutcome) -> Self {
        self.script.lock().push_back(outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(url, _)| url.clone()).collect()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<std::time::Duration> {
        self.calls
            .lock()
            .windows(2)
            .map(|pair| pair[1].1 - pair[0].1)
            .collect()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        self.calls
            .lock()
            .push((url.to_string(), tokio::time::Instant::now()));

        let outcome = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match outcome {
            MockOutcome::Respond(response) => Ok(response),
            MockOutcome::Fail(kind) => Err(FetchError::Transport {
                kind,
                message: format!("simulated {kind:?} failure"),
            }),
            MockOutcome::TooManyRedirects => Err(FetchError::TooManyRedirects),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(TransportResponse::new(200, "ok").is_success());
        assert!(TransportResponse::new(204, "").is_success());
        assert!(!TransportResponse::new(302, "").is_success());
        assert!(TransportResponse::new(404, "").is_client_error());
        assert!(!TransportResponse::new(500, "").is_client_error());
    }

    #[test]
    fn test_reqwest_transport_builds_from_default_config() {
        assert!(ReqwestTransport::new(&FxConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_reqwest_transport_rejects_bad_url() {
        let transport = ReqwestTransport::new(&FxConfig::default()).unwrap();
        let err = transport.get("not a url").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serve one response on a local socket and return its URL.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}/daily")
    }

    fn local_transport(max_body_bytes: usize) -> ReqwestTransport {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        ReqwestTransport::with_client(client, max_body_bytes)
    }

    #[test]
    fn test_body_cap_comes_from_config() {
        let config = FxConfig {
            max_feed_bytes: 2048,
            ..Default::default()
        };
        assert_eq!(ReqwestTransport::new(&config).unwrap().max_body_bytes(), 2048);
    }

    #[tokio::test]
    async fn test_reads_body_within_cap() {
        let body = b"<ValCurs/>".to_vec();
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_once(head, body.clone()).await;

        let response = local_transport(1024).get(&url).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, body);
    }

    #[tokio::test]
    async fn test_rejects_announced_oversized_body() {
        let body = vec![b'x'; 64 * 1024];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let url = serve_once(head, body).await;

        let err = local_transport(1024).get(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::BodyTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_stops_reading_streamed_oversized_body() {
        // No Content-Length: the body runs until the server closes.
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_string();
        let url = serve_once(head, vec![b'x'; 10 * 1024 * 1024]).await;

        let err = local_transport(1024).get(&url).await.unwrap_err();

        assert!(matches!(err, FetchError::BodyTooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_error_status_skips_body() {
        let head = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 5\r\nConnection: close\r\n\r\n"
            .to_string();
        let url = serve_once(head, b"busy!".to_vec()).await;

        let response = local_transport(1024).get(&url).await.unwrap();

        assert_eq!(response.status, 503);
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_mock_transport_replays_script() {
        let transport = MockTransport::responding(200, "ok")
            .then(MockOutcome::Fail(TransportErrorKind::Connect))
            .then(MockOutcome::Respond(TransportResponse::new(503, "")));

        assert!(transport.get("http://a").await.is_err());
        assert_eq!(transport.get("http://b").await.unwrap().status, 503);
        assert_eq!(transport.get("http://c").await.unwrap().status, 200);
        assert_eq!(transport.urls(), vec!["http://a", "http://b", "http://c"]);
    }
}
