//! Error type shared by every GitHub operation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::artifact::ArchiveError;

/// Maximum number of response body characters kept in log lines.
const LOG_BODY_LIMIT: usize = 512;

/// Errors returned by the credential manager, the request gateway and the
/// repository operations built on top of it.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// GitHub answered with a non-2xx status.
    #[error("GitHub API error: {status} - {body}")]
    Upstream { status: StatusCode, body: String },

    /// The request never produced an HTTP response (DNS, connect, TLS, timeout).
    #[error("GitHub transport error: {0}")]
    Transport(String),

    /// App id, signing key or another caller-supplied setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The response did not have the expected shape.
    #[error("Failed to decode GitHub response: {0}")]
    Decode(String),

    /// One step of a multi-file commit failed; earlier steps are not rolled back.
    #[error("Commit failed at step {step}: {source}")]
    CommitStep {
        step: CommitStep,
        #[source]
        source: Box<GitHubError>,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl GitHubError {
    /// HTTP status of an upstream failure, looking through commit step wrappers.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GitHubError::Upstream { status, .. } => Some(*status),
            GitHubError::CommitStep { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub fn is_unprocessable(&self) -> bool {
        self.status() == Some(StatusCode::UNPROCESSABLE_ENTITY)
    }

    pub(crate) fn upstream(status: StatusCode, body: &[u8]) -> Self {
        GitHubError::Upstream {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }

    /// Body excerpt suitable for a log line.
    pub(crate) fn body_excerpt(body: &str) -> &str {
        match body.char_indices().nth(LOG_BODY_LIMIT) {
            Some((idx, _)) => &body[..idx],
            None => body,
        }
    }
}

impl From<reqwest::Error> for GitHubError {
    fn from(err: reqwest::Error) -> Self {
        GitHubError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for GitHubError {
    fn from(err: serde_json::Error) -> Self {
        GitHubError::Decode(err.to_string())
    }
}

/// The stage of [`commit_files`](crate::github::GitHubClient::commit_files)
/// that produced an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStep {
    ReadRef,
    ReadBaseCommit,
    CreateBlob { path: String },
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl std::fmt::Display for CommitStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitStep::ReadRef => write!(f, "read_ref"),
            CommitStep::ReadBaseCommit => write!(f, "read_base_commit"),
            CommitStep::CreateBlob { path } => write!(f, "create_blob({})", path),
            CommitStep::CreateTree => write!(f, "create_tree"),
            CommitStep::CreateCommit => write!(f, "create_commit"),
            CommitStep::UpdateRef => write!(f, "update_ref"),
        }
    }
}

/// Attaches the failing [`CommitStep`] to an error.
pub(crate) trait CommitStepContext<T> {
    fn at_step(self, step: CommitStep) -> Result<T, GitHubError>;
}

impl<T> CommitStepContext<T> for Result<T, GitHubError> {
    fn at_step(self, step: CommitStep) -> Result<T, GitHubError> {
        self.map_err(|source| GitHubError::CommitStep {
            step,
            source: Box::new(source),
        })
    }
}
