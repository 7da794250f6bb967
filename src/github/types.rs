//! Request and response models for the GitHub endpoints this crate uses.
//!
//! Only the fields the client reads are modelled; serde ignores the rest.

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::error::GitHubError;

/// Identifies one installation of the GitHub App on an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(u64);

impl InstallationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for InstallationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for InstallationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A repository in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName(String);

impl RepoName {
    pub fn new(full_name: impl Into<String>) -> Result<Self, GitHubError> {
        let full_name = full_name.into();
        match full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self(full_name))
            }
            _ => Err(GitHubError::Configuration(format!(
                "Repository must be in owner/repo form: {}",
                full_name
            ))),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn owner(&self) -> &str {
        self.0.split_once('/').map(|(owner, _)| owner).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or_default()
    }
}

impl std::str::FromStr for RepoName {
    type Err = GitHubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Contents

/// Result of `GET /repos/{repo}/contents/{path}`: a single file or a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RepoContents {
    Directory(Vec<ContentFile>),
    File(ContentFile),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentFile {
    #[serde(rename = "type")]
    pub content_type: String,
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    /// Base64 payload; only present for files fetched individually.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ContentFile {
    /// Decode the base64 `content` field. GitHub wraps it at 60 columns.
    pub fn decoded_content(&self) -> Result<Vec<u8>, GitHubError> {
        let content = self.content.as_deref().ok_or_else(|| {
            GitHubError::Decode(format!("No inline content for {}", self.path))
        })?;

        match self.encoding.as_deref() {
            Some("base64") | None => {
                let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| GitHubError::Decode(format!("Invalid base64 content: {}", e)))
            }
            Some(other) => Err(GitHubError::Decode(format!(
                "Unsupported content encoding '{}' for {}",
                other, self.path
            ))),
        }
    }

    pub fn decoded_text(&self) -> Result<String, GitHubError> {
        String::from_utf8(self.decoded_content()?)
            .map_err(|e| GitHubError::Decode(format!("{} is not UTF-8: {}", self.path, e)))
    }
}

// Actions artifacts

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactList {
    pub total_count: u64,
    pub artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub size_in_bytes: u64,
    #[serde(default)]
    pub expired: bool,
    #[serde(default)]
    pub archive_download_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

// Git database

/// A git reference such as `refs/heads/main`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub object: GitObject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitObject {
    pub sha: String,
    #[serde(rename = "type")]
    pub object_type: String,
}

/// Reference to another object by sha (a commit's tree, or a parent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaRef {
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitCommit {
    pub sha: String,
    pub tree: ShaRef,
    #[serde(default)]
    pub parents: Vec<ShaRef>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitBlob {
    pub sha: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitTree {
    pub sha: String,
}

/// Mode for a regular, non-executable file.
pub const FILE_MODE_REGULAR: &str = "100644";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: FILE_MODE_REGULAR.to_string(),
            entry_type: "blob".to_string(),
            sha: sha.into(),
        }
    }
}

/// Content of a file to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Binary(Vec<u8>),
}

/// A file to write in [`commit_files`](crate::github::GitHubClient::commit_files).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFile {
    pub path: String,
    pub content: FileContent,
}

impl CommitFile {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Text(content.into()),
        }
    }

    pub fn binary(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: FileContent::Binary(content.into()),
        }
    }
}

// Request bodies

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefRequest {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateRefRequest {
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateBlobRequest {
    pub content: String,
    pub encoding: &'static str,
}

impl From<&FileContent> for CreateBlobRequest {
    fn from(content: &FileContent) -> Self {
        match content {
            FileContent::Text(text) => Self {
                content: text.clone(),
                encoding: "utf-8",
            },
            FileContent::Binary(bytes) => Self {
                content: base64::engine::general_purpose::STANDARD.encode(bytes),
                encoding: "base64",
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTreeRequest {
    pub base_tree: String,
    pub tree: Vec<TreeEntry>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCommitRequest {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

// Pull requests

/// Parameters for opening a pull request.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch containing the changes
    pub head: String,
    /// Branch the changes should be merged into
    pub base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub state: String,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
    pub head: PullRequestBranch,
    pub base: PullRequestBranch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}
