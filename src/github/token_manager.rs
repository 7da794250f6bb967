//! Token management for GitHub App authentication.
//!
//! GitHub Apps use two types of authentication:
//! 1. App JWT - Short-lived JWT signed with the app's private key (for app-level operations)
//! 2. Installation Access Token - Token for a specific installation (for repo operations)
//!
//! Installation tokens live for an hour. [`CredentialManager`] keeps them in a
//! [`TokenCache`] and only goes back to GitHub when the cached token is about
//! to expire.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::api_client::ApiEndpoint;
use super::error::GitHubError;
use super::transport::{HttpRequest, HttpTransport};
use super::types::InstallationId;

/// JWT `iat` is backdated by this much to tolerate clock drift.
const JWT_BACKDATE_SECS: i64 = 60;
/// JWT lifetime. GitHub rejects anything longer than 10 minutes.
const JWT_LIFETIME_SECS: i64 = 600;
/// A cached token must outlive "now" by at least this much to be reused.
pub const REFRESH_MARGIN_SECS: i64 = 60;
/// Assumed token lifetime when the exchange response carries no usable `expires_at`.
pub const FALLBACK_TOKEN_TTL_SECS: i64 = 3500;

/// JWT claims for GitHub App authentication.
/// GitHub requires: iat (issued at), exp (expiration), iss (issuer = app_id)
#[derive(Debug, Serialize, Deserialize)]
pub struct GitHubAppClaims {
    /// Issued at time (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp) - max 10 minutes
    pub exp: i64,
    /// Issuer - the GitHub App ID
    pub iss: String,
}

/// Generate a JWT for GitHub App authentication.
///
/// The JWT is signed with RS256 (RSA-SHA256) using the app's private key.
/// It's valid for 10 minutes (GitHub's maximum).
///
/// # Example
/// ```ignore
/// let jwt = generate_app_jwt(12345, &private_key)?;
/// // Use: Authorization: Bearer {jwt}
/// ```
pub fn generate_app_jwt(app_id: u64, private_key_pem: &str) -> Result<String, GitHubError> {
    if app_id == 0 {
        return Err(GitHubError::Configuration(
            "GitHub App ID must be non-zero".to_string(),
        ));
    }
    if private_key_pem.trim().is_empty() {
        return Err(GitHubError::Configuration(
            "GitHub App private key is empty".to_string(),
        ));
    }

    let now = Utc::now();
    let claims = GitHubAppClaims {
        iat: (now - Duration::seconds(JWT_BACKDATE_SECS)).timestamp(),
        exp: (now + Duration::seconds(JWT_LIFETIME_SECS)).timestamp(),
        iss: app_id.to_string(),
    };

    let header = Header::new(Algorithm::RS256);

    let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes()).map_err(|e| {
        GitHubError::Configuration(format!("Failed to parse private key PEM: {}", e))
    })?;

    encode(&header, &claims, &encoding_key)
        .map_err(|e| GitHubError::Configuration(format!("Failed to encode JWT: {}", e)))
}

/// App ID and signing key of a GitHub App.
#[derive(Clone)]
pub struct AppCredentials {
    app_id: u64,
    private_key_pem: String,
}

impl AppCredentials {
    pub fn new(app_id: u64, private_key_pem: impl Into<String>) -> Self {
        Self {
            app_id,
            private_key_pem: private_key_pem.into(),
        }
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    pub fn generate_jwt(&self) -> Result<String, GitHubError> {
        generate_app_jwt(self.app_id, &self.private_key_pem)
    }
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("app_id", &self.app_id)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Response from GitHub's installation access token endpoint.
#[derive(Debug, Deserialize)]
pub struct InstallationTokenResponse {
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub permissions: Option<serde_json::Value>,
    #[serde(default)]
    pub repository_selection: Option<String>,
}

impl InstallationTokenResponse {
    /// Expiry reported by GitHub, or `now + FALLBACK_TOKEN_TTL_SECS` if absent or malformed.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| now + Duration::seconds(FALLBACK_TOKEN_TTL_SECS))
    }
}

/// An installation token together with its absolute expiry.
#[derive(Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Whether the token can still be handed out at `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now + Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// In-memory installation token store, one entry per installation.
///
/// Concurrent misses for the same installation are not coordinated: each
/// caller performs its own exchange and the last insert wins. Both tokens are
/// valid, so the only cost is a redundant exchange call.
#[derive(Debug, Default)]
pub struct TokenCache {
    entries: DashMap<InstallationId, CachedToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, installation_id: InstallationId) -> Option<CachedToken> {
        self.entries.get(&installation_id).map(|entry| entry.clone())
    }

    /// Token for `installation_id` if it is still fresh at `now`.
    pub fn fresh_token(&self, installation_id: InstallationId, now: DateTime<Utc>) -> Option<String> {
        self.entries
            .get(&installation_id)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| entry.token.clone())
    }

    /// Store a token, replacing any previous entry for the installation.
    pub fn insert(&self, installation_id: InstallationId, token: CachedToken) {
        self.entries.insert(installation_id, token);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Issues app JWTs and hands out cached installation access tokens.
pub struct CredentialManager {
    credentials: AppCredentials,
    endpoint: Arc<ApiEndpoint>,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<TokenCache>,
}

impl CredentialManager {
    pub fn new(
        credentials: AppCredentials,
        endpoint: Arc<ApiEndpoint>,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<TokenCache>,
    ) -> Self {
        Self {
            credentials,
            endpoint,
            transport,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// Mint a fresh app JWT. Never cached.
    pub fn app_jwt(&self) -> Result<String, GitHubError> {
        self.credentials.generate_jwt()
    }

    /// Get an installation access token, exchanging a new one when the cached
    /// token is missing or within [`REFRESH_MARGIN_SECS`] of expiry.
    pub async fn installation_token(
        &self,
        installation_id: InstallationId,
    ) -> Result<String, GitHubError> {
        let now = Utc::now();
        if let Some(token) = self.cache.fresh_token(installation_id, now) {
            debug!(installation_id = %installation_id, "Using cached installation token");
            return Ok(token);
        }

        let response = self.exchange(installation_id).await?;
        let expires_at = response.expiry(now);

        self.cache.insert(
            installation_id,
            CachedToken {
                token: response.token.clone(),
                expires_at,
            },
        );

        info!(
            installation_id = %installation_id,
            expires_at = %expires_at,
            "Obtained installation access token"
        );

        Ok(response.token)
    }

    /// Exchange an app JWT for an installation access token.
    async fn exchange(
        &self,
        installation_id: InstallationId,
    ) -> Result<InstallationTokenResponse, GitHubError> {
        let jwt = self.app_jwt()?;

        let mut request = HttpRequest::new(
            Method::POST,
            self.endpoint
                .url(&format!("/app/installations/{}/access_tokens", installation_id)),
        );
        request.headers = self.endpoint.headers(&jwt)?;

        let response = self.transport.send(request).await?;

        if !response.status.is_success() {
            let body = String::from_utf8_lossy(&response.body);
            warn!(
                installation_id = %installation_id,
                status = %response.status,
                body = GitHubError::body_excerpt(&body),
                "GitHub API error getting installation token"
            );
            return Err(GitHubError::upstream(response.status, &response.body));
        }

        serde_json::from_slice(&response.body).map_err(|e| {
            GitHubError::Decode(format!(
                "Failed to parse installation token response: {}",
                e
            ))
        })
    }
}
