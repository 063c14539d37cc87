use std::{collections::BTreeMap, time::Duration};

use {async_trait::async_trait, tracing::debug};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration =
    Duration::from_millis(skillpack_config::schema::DEFAULT_TIMEOUT_MS);

/// Headers and timeout for one GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Lower-case header names.
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request timeout after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(u16),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("{0}")]
    Message(String),
}

/// Fetch the body of a URL as text. Non-2xx responses and timeouts are
/// errors.
#[async_trait]
pub trait FetchText: Send + Sync {
    async fn fetch_text(&self, url: &str, request: &FetchRequest) -> Result<String, FetchError>;
}

/// [`FetchText`] over a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[async_trait]
impl FetchText for HttpFetcher {
    async fn fetch_text(&self, url: &str, request: &FetchRequest) -> Result<String, FetchError> {
        let mut builder = self.client.get(url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        // Bound the body read too, not just the connect + headers phase.
        let fetch = async {
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok::<_, FetchError>(response.text().await?)
        };

        match tokio::time::timeout(request.timeout, fetch).await {
            Ok(Err(FetchError::Request(e))) if e.is_timeout() => {
                Err(FetchError::Timeout(request.timeout))
            },
            Ok(result) => result,
            Err(_) => {
                debug!(%url, timeout_ms = request.timeout.as_millis() as u64, "request aborted");
                Err(FetchError::Timeout(request.timeout))
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request(timeout: Duration) -> FetchRequest {
        let mut headers = BTreeMap::new();
        headers.insert("accept".to_string(), "application/vnd.github+json".to_string());
        headers.insert("authorization".to_string(), "Bearer t0k".to_string());
        FetchRequest { headers, timeout }
    }

    #[test]
    fn timeout_message_matches_hook_output() {
        let err = FetchError::Timeout(Duration::from_millis(10_000));
        assert_eq!(err.to_string(), "Request timeout after 10000ms");
        assert_eq!(FetchError::Status(403).to_string(), "HTTP 403");
    }

    #[tokio::test]
    async fn returns_body_and_sends_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/o/r/commits")
            .match_query(mockito::Matcher::UrlEncoded("per_page".into(), "1".into()))
            .match_header("authorization", "Bearer t0k")
            .match_header("accept", "application/vnd.github+json")
            .with_status(200)
            .with_body(r#"[{"sha":"abc"}]"#)
            .create_async()
            .await;

        let url = format!("{}/repos/o/r/commits?per_page=1", server.url());
        let body = HttpFetcher::default()
            .fetch_text(&url, &request(Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(body, r#"[{"sha":"abc"}]"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/rate-limited")
            .with_status(403)
            .with_body(r#"{"message":"API rate limit exceeded"}"#)
            .create_async()
            .await;

        let url = format!("{}/rate-limited", server.url());
        let err = HttpFetcher::default()
            .fetch_text(&url, &request(Duration::from_secs(5)))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Status(403)));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let result = HttpFetcher::default()
            .fetch_text("http://127.0.0.1:9/", &request(Duration::from_secs(2)))
            .await;
        assert!(result.is_err());
    }
}
