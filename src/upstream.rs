//! Upstream Teslamate API client
//!
//! One attempt per inbound request, bounded by the configured timeout. The
//! client decodes gzip/deflate/br bodies, so callers always see identity
//! encoded bytes.

use crate::error::ProxyResult;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Inbound headers that are never forwarded
pub const HOP_BY_HOP_HEADERS: [&str; 4] = ["host", "connection", "keep-alive", "transfer-encoding"];

/// What came back from upstream, fully buffered
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Declared content type, empty when missing or not valid ASCII
    pub fn content_type(&self) -> &str {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    /// `base_url` is expected without a trailing slash
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ProxyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL + path, plus the query string verbatim when there is one
    pub fn target_url(&self, path: &str, query: Option<&str>) -> String {
        match query {
            Some(query) if !query.is_empty() => format!("{}{}?{}", self.base_url, path, query),
            _ => format!("{}{}", self.base_url, path),
        }
    }

    /// Replay a request against upstream and buffer the response
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> ProxyResult<UpstreamResponse> {
        let url = self.target_url(path, query);
        debug!("→ {} {}", method, url);

        let response = self
            .client
            .request(method, url)
            .headers(forwardable_headers(headers))
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(UpstreamResponse { status, headers, body })
    }
}

/// Copy of `headers` without the hop-by-hop ones
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}
