//! Catalog web API HTTP client

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure talking to the catalog API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response shape from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Operations the pipeline needs from the catalog API
///
/// Implemented over HTTP by [`CatalogClient`] and by in-memory stubs in tests.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// GET `url`, returning the raw body alongside its parsed JSON
    async fn fetch(&self, url: &str) -> Result<(String, serde_json::Value), ApiError>;

    /// GET `url` with query parameters (paging offsets, limits, filters)
    async fn fetch_paged(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, ApiError>;

    /// GET `url` as raw bytes (cover art)
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ApiError>;
}

/// Decode a parsed response into its strict schema
pub fn decode<T: DeserializeOwned>(url: &str, value: serde_json::Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Bearer-authenticated HTTP client for the catalog web API
#[derive(Clone)]
pub struct CatalogClient {
    base_url: String,
    token: String,
    retry_attempts: u32,
    http_client: Client,
}

impl CatalogClient {
    /// Create a new catalog client
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        retry_attempts: u32,
    ) -> anyhow::Result<Self> {
        use anyhow::Context;

        let base_url = base_url.trim_end_matches('/').to_string();

        let http_client = Client::builder()
            .user_agent(concat!("tunedl/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            token: token.to_string(),
            retry_attempts,
            http_client,
        })
    }

    /// Absolute URL for an API path; absolute URLs pass through
    pub fn build_url(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// Send a GET, retrying on rate limiting and gateway errors
    async fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<reqwest::Response, ApiError> {
        let mut attempt = 0;
        loop {
            debug!("GET {} {:?}", url, params);
            let response = self
                .http_client
                .get(url)
                .bearer_auth(&self.token)
                .query(params)
                .send()
                .await
                .map_err(|source| ApiError::Http {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if is_retryable(status) && attempt < self.retry_attempts {
                attempt += 1;
                let wait = retry_after(&response).unwrap_or(Duration::from_secs(1 << attempt));
                warn!(
                    "{} returned {}, retrying in {}s ({}/{})",
                    url,
                    status,
                    wait.as_secs(),
                    attempt,
                    self.retry_attempts
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
    )
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn fetch(&self, url: &str) -> Result<(String, serde_json::Value), ApiError> {
        let url = self.build_url(url);
        let body = self
            .get(&url, &[])
            .await?
            .text()
            .await
            .map_err(|source| ApiError::Http {
                url: url.clone(),
                source,
            })?;
        let value = serde_json::from_str(&body).map_err(|source| ApiError::Decode {
            url: url.clone(),
            source,
        })?;
        Ok((body, value))
    }

    async fn fetch_paged(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.build_url(url);
        let response = self.get(&url, params).await?;
        response.json().await.map_err(|source| ApiError::Http { url, source })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, ApiError> {
        let url = self.build_url(url);
        let response = self.get(&url, &[]).await?;
        response.bytes().await.map_err(|source| ApiError::Http { url, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CatalogClient {
        CatalogClient::new("https://api.example.com/v1/", "token", Duration::from_secs(5), 1)
            .unwrap()
    }

    #[test]
    fn test_build_url_relative() {
        assert_eq!(
            client().build_url("tracks?ids=abc"),
            "https://api.example.com/v1/tracks?ids=abc"
        );
        assert_eq!(
            client().build_url("/me/tracks"),
            "https://api.example.com/v1/me/tracks"
        );
    }

    #[test]
    fn test_build_url_absolute_passthrough() {
        let next = "https://api.example.com/v1/artists/x/albums?offset=50";
        assert_eq!(client().build_url(next), next);
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_decode_reports_url() {
        let err = decode::<super::super::models::Track>("tracks?ids=x", serde_json::json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("tracks?ids=x"));
    }
}
