//! HTTP transport seam.
//!
//! Everything above this module talks to GitHub through [`HttpTransport`], so
//! the credential manager and the request gateway never touch a concrete HTTP
//! client. [`ReqwestTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{redirect, Method, StatusCode};

use super::error::GitHubError;

/// Maximum redirect hops when downloading artifacts.
const MAX_REDIRECTS: usize = 10;

/// Body of an outgoing request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Bytes(Bytes),
}

/// A fully resolved HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
    /// Follow 3xx responses instead of returning them.
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            follow_redirects: false,
        }
    }
}

/// Raw HTTP response. The status is not interpreted at this layer.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Sends a single HTTP request.
///
/// Implementations return [`GitHubError::Transport`] for failures that never
/// produced a response. Non-2xx responses are returned as `Ok`.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitHubError>;
}

/// [`HttpTransport`] backed by `reqwest`.
///
/// API calls go through a client that never follows redirects. Artifact
/// downloads use a second client that does; reqwest drops the
/// `Authorization` header when a redirect changes host.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    api: reqwest::Client,
    download: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self, GitHubError> {
        let mut api = reqwest::Client::builder().redirect(redirect::Policy::none());
        let mut download =
            reqwest::Client::builder().redirect(redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(timeout) = timeout {
            api = api.timeout(timeout);
            download = download.timeout(timeout);
        }

        Ok(Self {
            api: api.build()?,
            download: download.build()?,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, GitHubError> {
        let client = if request.follow_redirects {
            &self.download
        } else {
            &self.api
        };

        let mut builder = client
            .request(request.method, &request.url)
            .headers(request.headers);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Bytes(bytes)) => builder.body(bytes),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
