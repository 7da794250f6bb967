//! GitHub API client for installation-scoped operations.
//!
//! [`GitHubClient`] resolves an installation access token through the
//! [`CredentialManager`] for every call, sends the request through the
//! configured [`HttpTransport`], rejects non-2xx responses and decodes the
//! body by content type. The repository operations in `repos` and `git` are
//! all built on [`GitHubClient::request`].

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::error::GitHubError;
use super::token_manager::{AppCredentials, CredentialManager, TokenCache};
use super::transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport};
use super::types::InstallationId;
use crate::config::{Config, GitHubAppConfig, DEFAULT_API_VERSION, DEFAULT_BASE_URL};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "x-github-api-version";

/// Where requests go and the fixed headers they carry.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    base_url: String,
    user_agent: String,
    api_version: String,
}

impl ApiEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_agent: env!("CARGO_PKG_NAME").to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }

    pub fn from_config(config: &GitHubAppConfig) -> Result<Self, GitHubError> {
        Ok(Self {
            base_url: config.normalized_base_url()?,
            user_agent: config.user_agent.clone(),
            api_version: config.api_version.clone(),
        })
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Standard GitHub headers with `Authorization: Bearer {bearer}`.
    pub fn headers(&self, bearer: &str) -> Result<HeaderMap, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", bearer))?);
        headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(
            HeaderName::from_static(API_VERSION_HEADER),
            header_value(&self.api_version)?,
        );
        Ok(headers)
    }
}

impl Default for ApiEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, GitHubError> {
    HeaderValue::from_str(value)
        .map_err(|_| GitHubError::Configuration("Invalid characters in header value".to_string()))
}

/// Per-call additions merged into a gateway request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    body: Option<RequestBody>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    follow_redirects: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, GitHubError> {
        let value = serde_json::to_value(body)
            .map_err(|e| GitHubError::Decode(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(RequestBody::Json(value));
        Ok(self)
    }

    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(RequestBody::Bytes(body.into()));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a header; it replaces a default header of the same name.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, GitHubError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GitHubError::Configuration(format!("Invalid header name: {}", name)))?;
        self.headers.insert(name, header_value(value)?);
        Ok(self)
    }

    pub fn follow_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }
}

/// A successful response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// `application/json` responses, parsed.
    Json(serde_json::Value),
    /// Any other content type, unmodified.
    Raw(Bytes),
}

impl ApiResponse {
    fn decode(response: HttpResponse) -> Result<Self, GitHubError> {
        let is_json = response
            .content_type()
            .map(|ct| ct.starts_with("application/json"))
            .unwrap_or(false);

        if !is_json {
            return Ok(ApiResponse::Raw(response.body));
        }
        if response.body.is_empty() {
            return Ok(ApiResponse::Json(serde_json::Value::Null));
        }
        Ok(ApiResponse::Json(serde_json::from_slice(&response.body)?))
    }

    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, GitHubError> {
        match self {
            ApiResponse::Json(value) => Ok(serde_json::from_value(value)?),
            ApiResponse::Raw(_) => Err(GitHubError::Decode(
                "Expected a JSON response body".to_string(),
            )),
        }
    }
}

/// GitHub API client for installation-based operations.
pub struct GitHubClient {
    endpoint: Arc<ApiEndpoint>,
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialManager,
}

impl GitHubClient {
    pub fn new(
        credentials: AppCredentials,
        endpoint: ApiEndpoint,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<TokenCache>,
    ) -> Self {
        let endpoint = Arc::new(endpoint);
        Self {
            credentials: CredentialManager::new(
                credentials,
                endpoint.clone(),
                transport.clone(),
                cache,
            ),
            endpoint,
            transport,
        }
    }

    /// Build a client backed by reqwest with its own token cache.
    pub fn from_config(config: &Config) -> Result<Self, GitHubError> {
        Self::from_config_with_cache(config, Arc::new(TokenCache::new()))
    }

    /// Build a client backed by reqwest that shares `cache` with other clients.
    pub fn from_config_with_cache(
        config: &Config,
        cache: Arc<TokenCache>,
    ) -> Result<Self, GitHubError> {
        let credentials = config.github.credentials()?;
        let endpoint = ApiEndpoint::from_config(&config.github)?;
        let transport = Arc::new(ReqwestTransport::new(config.http.timeout())?);
        Ok(Self::new(credentials, endpoint, transport, cache))
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    /// Installation access token, from cache when still valid.
    pub async fn installation_token(
        &self,
        installation_id: InstallationId,
    ) -> Result<String, GitHubError> {
        self.credentials.installation_token(installation_id).await
    }

    /// Make an authenticated request to `{base_url}{path}` and decode the body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        installation_id: InstallationId,
        options: RequestOptions,
    ) -> Result<ApiResponse, GitHubError> {
        let response = self.send(method, path, installation_id, options).await?;
        ApiResponse::decode(response)
    }

    /// Like [`request`](Self::request), deserializing the JSON body into `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        installation_id: InstallationId,
        options: RequestOptions,
    ) -> Result<T, GitHubError> {
        self.request(method, path, installation_id, options)
            .await?
            .into_json()
    }

    /// Authenticated request that returns the raw body regardless of content type.
    pub(crate) async fn request_bytes(
        &self,
        method: Method,
        path: &str,
        installation_id: InstallationId,
        options: RequestOptions,
    ) -> Result<Bytes, GitHubError> {
        Ok(self
            .send(method, path, installation_id, options)
            .await?
            .body)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        installation_id: InstallationId,
        options: RequestOptions,
    ) -> Result<HttpResponse, GitHubError> {
        let token = self.credentials.installation_token(installation_id).await?;

        let mut headers = self.endpoint.headers(&token)?;
        headers.extend(options.headers);

        let request = HttpRequest {
            method: method.clone(),
            url: self.endpoint.url(path),
            headers,
            query: options.query,
            body: options.body,
            follow_redirects: options.follow_redirects,
        };

        debug!(
            method = %method,
            path = path,
            installation_id = %installation_id,
            "GitHub API request"
        );

        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            let body = String::from_utf8_lossy(&response.body);
            warn!(
                method = %method,
                path = path,
                status = %response.status,
                body = GitHubError::body_excerpt(&body),
                "GitHub API error"
            );
            return Err(GitHubError::upstream(response.status, &response.body));
        }

        Ok(response)
    }
}
