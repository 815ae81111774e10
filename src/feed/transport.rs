use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::Method;
use thiserror::Error;

use crate::config::FetchConfig;

/// Errors raised by a [`Transport`] before a complete response is available.
///
/// Non-2xx statuses are not errors at this layer; they come back as a
/// [`FetchResponse`] with `ok() == false`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request (including reading the body) exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Network-level error (DNS, connection, TLS, etc.). `detail` is the
    /// error chain without the request URL, so it never echoes the URL back.
    #[error("Request failed: {detail}")]
    Network {
        detail: String,
        #[source]
        source: reqwest::Error,
    },
    /// Response body exceeded the configured download cap
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let source = err.without_url();
        let mut detail = source.to_string();
        let mut cause = std::error::Error::source(&source);
        while let Some(inner) = cause {
            detail.push_str(": ");
            detail.push_str(&inner.to_string());
            cause = std::error::Error::source(inner);
        }
        TransportError::Network { detail, source }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn get(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_owned(),
            method: Method::GET,
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetch-with-timeout primitive the parse pipeline is written against.
///
/// Implementations must enforce `request.timeout` over the whole exchange
/// and report it as [`TransportError::Timeout`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError>;
}

/// [`Transport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(create_redirect_policy(config.max_redirects))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self::from_client(client, config.max_response_bytes))
    }

    pub fn from_client(client: reqwest::Client, max_response_bytes: usize) -> Self {
        Self {
            client,
            max_response_bytes,
        }
    }

    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = read_limited_bytes(response, self.max_response_bytes).await?;

        Ok(FetchResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, TransportError> {
        tracing::trace!(url = %request.url, method = %request.method, "Fetching");
        tokio::time::timeout(request.timeout, self.send(&request))
            .await
            .map_err(|_| TransportError::Timeout(request.timeout))?
    }
}

/// Redirect policy with a hop limit and loop detection.
fn create_redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= max_redirects {
            return attempt.error(format!("Too many redirects (max {max_redirects})"));
        }

        let url = attempt.url();
        if attempt
            .previous()
            .iter()
            .any(|prev| prev.as_str() == url.as_str())
        {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(TransportError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(TransportError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(max_response_bytes: usize) -> HttpTransport {
        HttpTransport::from_client(reqwest::Client::new(), max_response_bytes)
    }

    #[tokio::test]
    async fn test_fetch_success_with_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("Accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&mock_server)
            .await;

        let request = FetchRequest::get(
            &format!("{}/feed", mock_server.uri()),
            Duration::from_secs(5),
        )
        .header("Accept", "application/json");
        let response = transport(1024).fetch(request).await.unwrap();

        assert!(response.ok());
        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.body, b"{}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_a_response() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let request = FetchRequest::get(&mock_server.uri(), Duration::from_secs(5));
        let response = transport(1024).fetch(request).await.unwrap();

        assert!(!response.ok());
        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
    }

    #[tokio::test]
    async fn test_timeout_is_distinguishable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let request = FetchRequest::get(&mock_server.uri(), Duration::from_millis(100));
        let result = transport(1024).fetch(request).await;

        match result {
            Err(TransportError::Timeout(d)) => assert_eq!(d, Duration::from_millis(100)),
            other => panic!("Expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
            .mount(&mock_server)
            .await;

        let request = FetchRequest::get(&mock_server.uri(), Duration::from_secs(5));
        let result = transport(1024).fetch(request).await;

        assert!(matches!(result, Err(TransportError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Nothing listens on port 1
        let request = FetchRequest::get("http://127.0.0.1:1/feed", Duration::from_secs(5));
        let result = transport(1024).fetch(request).await;

        assert!(matches!(result, Err(TransportError::Network { .. })));
    }

    #[tokio::test]
    async fn test_network_error_text_omits_url() {
        let url = "http://127.0.0.1:1/ssl-timeout-dns-news.xml";
        let request = FetchRequest::get(url, Duration::from_secs(5));
        let err = transport(1024).fetch(request).await.unwrap_err();

        let message = err.to_string();
        assert!(!message.contains("127.0.0.1"), "{message}");
        assert!(!message.contains("ssl-timeout-dns-news"), "{message}");
        assert!(message.to_lowercase().contains("refused"), "{message}");
    }

    #[test]
    fn test_timeout_message() {
        let err = TransportError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Request timed out after 30s");
    }
}
