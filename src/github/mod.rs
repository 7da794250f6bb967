//! GitHub integration module for GitHub App support.
//!
//! This module provides:
//! - JWT token generation for GitHub App authentication
//! - Installation access token management and caching
//! - GitHub API client for repository operations (contents, artifacts,
//!   branches, commits, pull requests)

pub mod api_client;
pub mod error;
pub mod git;
pub mod repos;
pub mod token_manager;
pub mod transport;
pub mod types;

pub use api_client::{ApiEndpoint, ApiResponse, GitHubClient, RequestOptions};
pub use error::{CommitStep, GitHubError};
pub use git::BranchCreation;
pub use token_manager::{
    generate_app_jwt, AppCredentials, CachedToken, CredentialManager, TokenCache,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport};
pub use types::{
    Artifact, ArtifactList, CommitFile, ContentFile, FileContent, GitCommit, GitRef,
    InstallationId, NewPullRequest, PullRequest, RepoContents, RepoName, TreeEntry,
};
