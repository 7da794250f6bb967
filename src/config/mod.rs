use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::github::{AppCredentials, GitHubError};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubAppConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct GitHubAppConfig {
    /// Numeric GitHub App ID
    pub app_id: Option<u64>,
    /// Private key in PEM format (takes precedence over `private_key_path`)
    pub private_key: Option<String>,
    /// Path to a PEM file holding the private key
    pub private_key_path: Option<PathBuf>,
    /// REST API root (GitHub Enterprise Server uses `https://host/api/v3`)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Value of the `X-GitHub-Api-Version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for GitHubAppConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            private_key: None,
            private_key_path: None,
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            api_version: default_api_version(),
        }
    }
}

// Keeps the private key out of logs.
impl std::fmt::Debug for GitHubAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppConfig")
            .field("app_id", &self.app_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_path", &self.private_key_path)
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .field("api_version", &self.api_version)
            .finish()
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl GitHubAppConfig {
    /// Base URL without a trailing slash, so paths can be appended directly.
    pub fn normalized_base_url(&self) -> Result<String, GitHubError> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(GitHubError::Configuration(
                "GitHub base URL is empty".to_string(),
            ));
        }
        if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
            return Err(GitHubError::Configuration(format!(
                "GitHub base URL must start with http:// or https://: {}",
                trimmed
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Returns the PEM key, reading it from `private_key_path` when no inline key is set.
    pub fn resolve_private_key(&self) -> Result<String, GitHubError> {
        if let Some(key) = self.private_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }

        match &self.private_key_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                GitHubError::Configuration(format!(
                    "Failed to read private key {}: {}",
                    path.display(),
                    e
                ))
            }),
            None => Err(GitHubError::Configuration(
                "GitHub App private key is not configured".to_string(),
            )),
        }
    }

    pub fn credentials(&self) -> Result<AppCredentials, GitHubError> {
        let app_id = self.app_id.ok_or_else(|| {
            GitHubError::Configuration("GitHub App ID is not configured".to_string())
        })?;
        Ok(AppCredentials::new(app_id, self.resolve_private_key()?))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds. Unset means no deadline.
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    /// Apply `GITHUB_APP_ID`, `GITHUB_APP_PRIVATE_KEY`, `GITHUB_APP_PRIVATE_KEY_PATH`
    /// and `GITHUB_API_URL` on top of the file values.
    ///
    /// A key source set in the environment replaces both key sources from the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), GitHubError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("GITHUB_APP_ID") {
            let app_id = raw.trim().parse().map_err(|_| {
                GitHubError::Configuration(format!("Invalid GITHUB_APP_ID: {}", raw))
            })?;
            self.github.app_id = Some(app_id);
        }

        let env_key = lookup("GITHUB_APP_PRIVATE_KEY");
        let env_key_path = lookup("GITHUB_APP_PRIVATE_KEY_PATH");
        if env_key.is_some() || env_key_path.is_some() {
            self.github.private_key = env_key;
            self.github.private_key_path = env_key_path.map(PathBuf::from);
        }

        if let Some(url) = lookup("GITHUB_API_URL") {
            self.github.base_url = url;
        }
        Ok(())
    }
}
