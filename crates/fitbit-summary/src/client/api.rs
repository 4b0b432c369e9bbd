//! Authenticated HTTP client for the hosted storage and table APIs
//!
//! Every request carries the project key both as `apikey` and as a bearer
//! token. Transient failures are retried according to the client's
//! [`RetryPolicy`].

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::client::retry::RetryPolicy;
use crate::config::SupabaseConfig;
use crate::error::{Result, SummaryError};

/// HTTP request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Supabase project client
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    headers: HeaderMap,
    retry: RetryPolicy,
}

impl SupabaseClient {
    /// Create a new client for a project
    pub fn new(config: &SupabaseConfig) -> Result<Self> {
        Self::with_base_url(&config.url, &config.key)
    }

    /// Create a new client with a custom base URL (for testing)
    #[doc(hidden)]
    pub fn with_base_url(base_url: &str, key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: build_headers(key)?,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Build the full URL for a given path
    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request built fresh for every attempt
    async fn send(&self, build: impl Fn() -> RequestBuilder) -> Result<Response> {
        self.retry
            .run(|| {
                let request = build();
                async move {
                    let response = request.send().await?;
                    handle_response_status(response).await
                }
            })
            .await
    }

    /// Make an authenticated GET request and return the response
    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = self.build_url(path);
        self.send(|| self.client.get(&url).headers(self.headers.clone()))
            .await
    }

    /// Make an authenticated GET request with query parameters and deserialize JSON
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.build_url(path);
        let response = self
            .send(|| {
                self.client
                    .get(&url)
                    .headers(self.headers.clone())
                    .query(query)
            })
            .await?;

        response.json().await.map_err(|e| {
            SummaryError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Make an authenticated POST request with a JSON body and deserialize the JSON reply
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(path, body, &[]).await?;
        response.json().await.map_err(|e| {
            SummaryError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Make an authenticated POST request with a JSON body and extra headers
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        extra_headers: &[(&'static str, &'static str)],
    ) -> Result<Response> {
        let url = self.build_url(path);
        let payload = serde_json::to_vec(body)?;

        let mut headers = self.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for &(name, value) in extra_headers {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        self.send(|| {
            self.client
                .post(&url)
                .headers(headers.clone())
                .body(payload.clone())
        })
        .await
    }

    /// Make an authenticated GET request and return raw bytes (for file downloads)
    pub async fn download(&self, path: &str) -> Result<Bytes> {
        let response = self.get(path).await?;
        response.bytes().await.map_err(SummaryError::Http)
    }
}

fn build_headers(key: &str) -> Result<HeaderMap> {
    let invalid = |_| SummaryError::config("API key contains characters not allowed in a header");

    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("apikey"),
        HeaderValue::from_str(key).map_err(invalid)?,
    );
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", key)).map_err(invalid)?,
    );
    Ok(headers)
}

/// Handle response status codes and convert to errors
async fn handle_response_status(response: Response) -> Result<Response> {
    let status = response.status();

    match status {
        s if s.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SummaryError::NotAuthenticated),
        StatusCode::TOO_MANY_REQUESTS => Err(SummaryError::RateLimited),
        StatusCode::NOT_FOUND => Err(SummaryError::NotFound(response.url().path().to_string())),
        _ => {
            let body = response.text().await.unwrap_or_default();
            Err(SummaryError::Api {
                status: status.as_u16(),
                message: body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> SupabaseClient {
        SupabaseClient::with_base_url(&server.uri(), "test-key")
            .unwrap()
            .with_retry(RetryPolicy::new(3).with_initial_backoff(Duration::from_millis(1)))
    }

    #[test]
    fn test_build_url() {
        let client = SupabaseClient::with_base_url("https://demo.supabase.co/", "k").unwrap();
        assert_eq!(
            client.build_url("/rest/v1/data_summary"),
            "https://demo.supabase.co/rest/v1/data_summary"
        );
    }

    #[tokio::test]
    async fn test_sends_key_headers() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ping"))
            .and(header("apikey", "test-key"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .expect(1)
            .mount(&server)
            .await;

        let bytes = test_client(&server).download("/ping").await.unwrap();
        assert_eq!(&bytes[..], b"pong");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_not_authenticated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).get("/secret").await.unwrap_err();
        assert!(matches!(err, SummaryError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .expect(3)
            .mount(&server)
            .await;

        let err = test_client(&server).get("/flaky").await.unwrap_err();
        match err {
            SummaryError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server).get("/missing").await.unwrap_err();
        assert!(matches!(err, SummaryError::NotFound(_)));
    }
}
