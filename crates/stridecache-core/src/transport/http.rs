//! HTTP transport over reqwest.
//!
//! Reads are `GET {base}/{resource}?{param}={value}...`; writes are
//! `POST {base}/{operation}` with a JSON body.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::FutureExt;
use reqwest::{header, Client, Url};
use serde_json::Value;
use tracing::debug;

use super::Transport;
use crate::error::QueryError;
use crate::executor::FetchFuture;
use crate::key::QueryKey;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Self::with_client(client, base_url)
    }

    /// Share an existing connection pool.
    pub fn with_client(client: Client, base_url: &str) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, QueryError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| QueryError::InvalidResponse(format!("Bad endpoint {}: {}", path, e)))
    }

    /// The GET URL for `key`, with its named parameters as query pairs.
    pub fn query_url(&self, key: &QueryKey) -> Result<Url, QueryError> {
        let mut url = self.endpoint(key.resource().name())?;
        if !key.params().is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in key.named_params() {
                pairs.append_pair(name, &value.to_string());
            }
        }
        Ok(url)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, QueryError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(QueryError::from_status(status, &body))
        }
    }

    async fn get(client: Client, url: Url) -> Result<Value, QueryError> {
        debug!(url = %url, "GET");
        let response = client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    async fn post(client: Client, url: Url, body: Value) -> Result<Value, QueryError> {
        debug!(url = %url, "POST");
        let response = client
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        // Some writes answer 204 with no body
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| QueryError::InvalidResponse(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, key: &QueryKey) -> FetchFuture {
        let client = self.client.clone();
        let url = self.query_url(key);
        async move { Self::get(client, url?).await }.boxed()
    }

    fn send(&self, operation: &str, input: Value) -> FetchFuture {
        let client = self.client.clone();
        let url = self.endpoint(operation);
        async move { Self::post(client, url?, input).await }.boxed()
    }
}
