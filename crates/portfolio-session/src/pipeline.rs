//! Request pipeline for the backend REST API
//!
//! Every call goes through `ApiClient::send`:
//! 1. Authenticated callers get a token valid for at least five seconds
//!    (refreshing first if needed) attached as a bearer header.
//! 2. Anonymous callers go through untouched.
//! 3. A 401 starts the hosted login and fails the call with `Unauthorized`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::metrics::{record_api_error, record_api_request};
use crate::state::AuthStore;

pub const DEFAULT_BASE_URL: &str = "http://localhost:9090/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<AuthStore>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, auth: Arc<AuthStore>) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ApiError::Http(format!("invalid base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Http(format!("invalid base URL {base_url}")));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ApiError::Http(format!("building HTTP client: {e}")))?;

        Ok(Self { http, base, auth })
    }

    pub fn auth(&self) -> &Arc<AuthStore> {
        &self.auth
    }

    /// Base URL extended by `segments`. Each entry becomes exactly one
    /// percent-encoded path segment, so a `/` inside a value stays in it.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::Http(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .extend(segments.iter().copied());
        Ok(url)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let url = self.url(segments)?;
        let path = url.path().to_owned();
        debug!(%method, %path, "backend request");
        let mut request = self.http.request(method, url);

        if self.auth.snapshot().is_authenticated {
            // On failure the recovery login is already under way; the call
            // proceeds anonymously.
            if let Some(token) = self.auth.refresh_token().await {
                request = request.bearer_auth(token.expose());
            }
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            record_api_error();
            ApiError::Http(e.to_string())
        })?;

        let status = response.status();
        record_api_request(status.as_u16());

        if status == StatusCode::UNAUTHORIZED {
            warn!(%path, "backend rejected credentials, starting login");
            if let Err(e) = self.auth.login().await {
                warn!(error = %e, "failed to start login");
            }
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let response = self.send::<()>(Method::GET, segments, None).await?;
        Self::decode(response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::POST, segments, Some(body)).await?;
        Self::decode(response).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T> {
        let response = self.send(Method::PUT, segments, Some(body)).await?;
        Self::decode(response).await
    }

    pub async fn delete(&self, segments: &[&str]) -> Result<()> {
        self.send::<()>(Method::DELETE, segments, None).await?;
        Ok(())
    }
}
