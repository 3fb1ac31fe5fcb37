//! Shared JSON-over-HTTP client used by the remote adapters.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const USER_AGENT: &str = concat!("hangar/", env!("CARGO_PKG_VERSION"));

/// Header carrying a machine lease nonce on mutating fleet calls.
pub const LEASE_NONCE_HEADER: &str = "hangar-lease-nonce";

/// A non-success response from a remote API.
#[derive(Debug, thiserror::Error)]
#[error("{method} {path}: HTTP {status}: {message}")]
pub struct ApiError {
    pub method: Method,
    pub path: String,
    pub status: StatusCode,
    pub message: String,
    /// Lock expiry reported with a 409 from the lock endpoint.
    pub expires_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    expires_at: Option<String>,
}

/// Status of a failed call, if the failure was an HTTP response.
#[must_use]
pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain()
        .find_map(|e| e.downcast_ref::<ApiError>())
        .map(|e| e.status)
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(base: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Start a request against `path` (relative to the base URL).
    #[must_use]
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, format!("{}{path}", self.base));
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send and fail on any non-2xx status.
    ///
    /// # Errors
    ///
    /// Returns the transport error or an [`ApiError`].
    pub async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let req = req.build().context("building request")?;
        let method = req.method().clone();
        let path = req.url().path().to_string();
        tracing::debug!(%method, %path, "api request");
        let resp = self
            .http
            .execute(req)
            .await
            .with_context(|| format!("{method} {path}: request failed"))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = if body.error.is_empty() { text } else { body.error };
        Err(ApiError {
            method,
            path,
            status,
            message,
            expires_at: body.expires_at,
        }
        .into())
    }

    /// Send and decode a JSON body.
    ///
    /// # Errors
    ///
    /// Returns the send error or a decoding error.
    pub async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        let resp = self.send(req).await?;
        let url = resp.url().path().to_string();
        resp.json::<T>()
            .await
            .with_context(|| format!("decoding response from {url}"))
    }

    /// Send and discard the body.
    ///
    /// # Errors
    ///
    /// Returns the send error.
    pub async fn empty(&self, req: RequestBuilder) -> Result<()> {
        self.send(req).await.map(drop)
    }
}
