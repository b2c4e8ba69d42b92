//! Thin HTTP client over reqwest.

use crate::error::RestError;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback wait when a 429 carries no Retry-After header.
const DEFAULT_RETRY_AFTER_MS: u64 = 60_000;

/// Generic REST client bound to one base URL.
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for `base_url` with the given timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RestError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RestError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a client with the default timeout.
    pub fn with_default_timeout(base_url: &str) -> Result<Self, RestError> {
        Self::new(base_url, DEFAULT_TIMEOUT)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET returning a JSON body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<T, RestError> {
        let response = self.send(Method::GET, path, query, headers).await?;
        Self::decode_json(response).await
    }

    /// POST returning a JSON body.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<T, RestError> {
        let response = self.send(Method::POST, path, query, headers).await?;
        Self::decode_json(response).await
    }

    /// POST where the response body is ignored.
    pub async fn post_empty(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<(), RestError> {
        let response = self.send(Method::POST, path, query, headers).await?;
        Self::check_status(response).await
    }

    /// PUT where the response body is ignored.
    pub async fn put_empty(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<(), RestError> {
        let response = self.send(Method::PUT, path, query, headers).await?;
        Self::check_status(response).await
    }

    /// DELETE returning a JSON body.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<T, RestError> {
        let response = self.send(Method::DELETE, path, query, headers).await?;
        Self::decode_json(response).await
    }

    /// DELETE where the response body is ignored.
    pub async fn delete_empty(
        &self,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<(), RestError> {
        let response = self.send(Method::DELETE, path, query, headers).await?;
        Self::check_status(response).await
    }

    /// GET returning the raw bytes (archive downloads).
    pub async fn get_bytes(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<Vec<u8>, RestError> {
        let response = self.send(Method::GET, path, query, None).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::status_error(status.as_u16(), body));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: Option<&[(&str, &str)]>,
    ) -> Result<Response, RestError> {
        let url = self.build_url(path, query);
        tracing::debug!(method = %method, url = %url, "request");

        let mut request = self.client.request(method, &url);
        if let Some(hdrs) = headers {
            for (key, value) in hdrs {
                request = request.header(*key, *value);
            }
        }

        Ok(request.send().await?)
    }

    fn build_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(q) if !q.is_empty() => format!("{}{}?{}", self.base_url, path, q),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, RestError> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                tracing::warn!(body = %body, error = %e, "failed to parse response");
                RestError::Parse(e.to_string())
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Self::status_error(status.as_u16(), body))
        }
    }

    async fn check_status(response: Response) -> Result<(), RestError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Self::status_error(status.as_u16(), body))
        }
    }

    fn status_error(status: u16, body: String) -> RestError {
        if status == 429 {
            RestError::RateLimited {
                retry_after_ms: DEFAULT_RETRY_AFTER_MS,
            }
        } else {
            RestError::Http { status, body }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_no_query() {
        let client = RestClient::with_default_timeout("https://fapi.example.com").unwrap();
        assert_eq!(
            client.build_url("/fapi/v1/time", None),
            "https://fapi.example.com/fapi/v1/time"
        );
    }

    #[test]
    fn test_build_url_with_query() {
        let client = RestClient::with_default_timeout("https://fapi.example.com").unwrap();
        assert_eq!(
            client.build_url("/fapi/v1/aggTrades", Some("symbol=BTCUSDT&limit=1000")),
            "https://fapi.example.com/fapi/v1/aggTrades?symbol=BTCUSDT&limit=1000"
        );
    }

    #[test]
    fn test_build_url_strips_trailing_slash() {
        let client = RestClient::with_default_timeout("https://fapi.example.com/").unwrap();
        assert_eq!(
            client.build_url("/fapi/v1/time", None),
            "https://fapi.example.com/fapi/v1/time"
        );
    }

    #[test]
    fn test_build_url_empty_query() {
        let client = RestClient::with_default_timeout("https://fapi.example.com").unwrap();
        assert_eq!(
            client.build_url("/fapi/v1/time", Some("")),
            "https://fapi.example.com/fapi/v1/time"
        );
    }

    #[test]
    fn test_status_error_classifies_429() {
        assert!(matches!(
            RestClient::status_error(429, String::new()),
            RestError::RateLimited { .. }
        ));
        assert!(matches!(
            RestClient::status_error(418, String::new()),
            RestError::Http { status: 418, .. }
        ));
    }
}
