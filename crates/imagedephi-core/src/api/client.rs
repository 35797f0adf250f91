//! HTTP client that carries the session token.
//!
//! Every outbound call goes through [`SessionClient::request`], which reads
//! the current token from the [`TokenStore`] and attaches it under the
//! `Girder-Token` header. HTTP error statuses come back as ordinary
//! responses; only transport failures are errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response};
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::auth::TokenStore;
use crate::config::{Config, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Header the server reads the session token from.
pub const SESSION_HEADER: &str = "Girder-Token";

/// Per-request additions on top of the session header.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub json: Option<serde_json::Value>,
    /// Send without the session header even when a token is held.
    pub anonymous: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        self.json = Some(serde_json::to_value(body).context("Failed to serialize request body")?);
        Ok(self)
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct SessionClient {
    client: Client,
    base_url: Url,
    store: Arc<TokenStore>,
}

impl SessionClient {
    pub fn new(base_url: &str, store: Arc<TokenStore>) -> Result<Self> {
        Self::with_timeout(base_url, store, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn from_config(config: &Config, store: Arc<TokenStore>) -> Result<Self> {
        Self::with_timeout(
            &config.base_url,
            store,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn with_timeout(base_url: &str, store: Arc<TokenStore>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid server URL: {}", base_url))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            store,
        })
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` under the base URL, keeping any path prefix the base
    /// carries (e.g. `https://host/girder`). Absolute URLs pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a request with the current session token, if any.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> reqwest::Result<Response> {
        let token = self.store.token();
        self.request_with(token.as_deref(), method, path, options).await
    }

    /// Send a request with an explicit token snapshot, so the caller knows
    /// exactly which token a rejected response applies to.
    pub async fn request_with(
        &self,
        token: Option<&str>,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> reqwest::Result<Response> {
        let url = self.url_for(path);
        let authenticated = token.is_some() && !options.anonymous;
        debug!(%method, url = %url, authenticated, "Sending request");

        let mut builder = self.client.request(method, &url).headers(options.headers);
        if !options.anonymous {
            if let Some(token) = token {
                builder = builder.header(SESSION_HEADER, token);
            }
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(ref body) = options.json {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        debug!(url = %url, status = %response.status(), "Received response");
        Ok(response)
    }
}
