//! Authenticated client for the GitHub REST API, acting as an installed GitHub App.
//!
//! ```ignore
//! let config = github_app_client::config::Config::load(Path::new("github-app.toml"))?;
//! let client = GitHubClient::from_config(&config)?;
//! let repo = RepoName::new("octo/widgets")?;
//! let readme = client.get_repo_contents(InstallationId::new(42), &repo, "README.md").await?;
//! ```

pub mod artifact;
pub mod config;
pub mod github;
pub mod logging;

pub use github::{GitHubClient, GitHubError, InstallationId, RepoName};
