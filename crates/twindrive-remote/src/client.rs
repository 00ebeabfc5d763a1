//! HTTP client for the TwinDrive drive API
//!
//! Provides the [`DriveClient`] struct which handles:
//! - Request construction against a configurable base URL
//! - Bearer-token authentication on every request
//! - Request timeouts taken from [`RemoteConfig`]
//!
//! The client is deliberately thin: it builds authenticated requests and
//! leaves response handling to the operation modules in this crate.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Method;

use twindrive_core::config::RemoteConfig;

/// HTTP client wrapper for drive API requests
///
/// Holds the underlying `reqwest` client, the API base URL, and the
/// bearer token attached to every request. Cloning is cheap; the inner
/// `reqwest::Client` is reference-counted.
#[derive(Debug, Clone)]
pub struct DriveClient {
    /// Underlying HTTP client
    http: reqwest::Client,
    /// Base URL without a trailing slash
    base_url: String,
    /// Bearer token for API authentication
    api_token: String,
}

impl DriveClient {
    /// Creates a client from the remote section of the configuration
    ///
    /// The request timeout applies to every call made through this
    /// client, including upload-session chunk requests.
    pub fn from_config(config: &RemoteConfig, api_token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        })
    }

    /// Creates a client pointed at an explicit base URL
    ///
    /// Used by tests to target a mock server instead of the real API.
    pub fn with_base_url(api_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
        }
    }

    /// Builds an authenticated request for the given API path
    ///
    /// The path is appended to the base URL and the bearer token is
    /// attached. Callers finish the builder (body, query, headers) and
    /// send it themselves.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.http.request(method, url).bearer_auth(&self.api_token)
    }

    /// Returns the raw HTTP client
    ///
    /// Upload-session URLs are absolute, so chunk requests bypass the
    /// base-URL joining in [`DriveClient::request`].
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns the bearer token
    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    /// Returns the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
