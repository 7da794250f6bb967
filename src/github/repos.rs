//! Repository-level operations: contents, Actions artifacts and pull requests.

use bytes::Bytes;
use reqwest::Method;
use tracing::{debug, info};

use super::api_client::{GitHubClient, RequestOptions};
use super::error::GitHubError;
use super::types::{
    ArtifactList, InstallationId, NewPullRequest, PullRequest, RepoContents, RepoName,
};
use crate::artifact::{self, ArtifactArchive};

impl GitHubClient {
    /// Get a file or directory listing from the default branch.
    ///
    /// Returns `Ok(None)` when GitHub answers 404; every other failure is an error.
    pub async fn get_repo_contents(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        path: &str,
    ) -> Result<Option<RepoContents>, GitHubError> {
        // Resolve the token up front so a 404 from the exchange stays an error.
        self.installation_token(installation_id).await?;

        let url = format!("/repos/{}/contents/{}", repo, path.trim_start_matches('/'));

        match self
            .request_json(Method::GET, &url, installation_id, RequestOptions::new())
            .await
        {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.is_not_found() => {
                debug!(repo = %repo, path = path, "Repository path not found");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// List artifacts for a workflow run.
    pub async fn get_artifacts(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        run_id: u64,
    ) -> Result<ArtifactList, GitHubError> {
        let url = format!("/repos/{}/actions/runs/{}/artifacts", repo, run_id);
        self.request_json(Method::GET, &url, installation_id, RequestOptions::new())
            .await
    }

    /// Download an artifact zip file.
    ///
    /// GitHub answers with a redirect to a short-lived storage URL, so this
    /// request follows redirects and returns the final body untouched.
    pub async fn download_artifact(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        artifact_id: u64,
    ) -> Result<Bytes, GitHubError> {
        let url = format!("/repos/{}/actions/artifacts/{}/zip", repo, artifact_id);
        let bytes = self
            .request_bytes(
                Method::GET,
                &url,
                installation_id,
                RequestOptions::new().follow_redirects(),
            )
            .await?;

        info!(
            repo = %repo,
            artifact_id = artifact_id,
            size = bytes.len(),
            "Downloaded artifact"
        );

        Ok(bytes)
    }

    /// Download an artifact and read its files into memory.
    pub async fn download_artifact_archive(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        artifact_id: u64,
    ) -> Result<ArtifactArchive, GitHubError> {
        let bytes = self
            .download_artifact(installation_id, repo, artifact_id)
            .await?;
        Ok(artifact::read_archive(&bytes)?)
    }

    /// Create a pull request.
    pub async fn create_pull_request(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        pull_request: &NewPullRequest,
    ) -> Result<PullRequest, GitHubError> {
        let url = format!("/repos/{}/pulls", repo);
        let pr: PullRequest = self
            .request_json(
                Method::POST,
                &url,
                installation_id,
                RequestOptions::new().json(pull_request)?,
            )
            .await?;

        info!(
            repo = %repo,
            number = pr.number,
            head = %pull_request.head,
            base = %pull_request.base,
            "Created pull request"
        );

        Ok(pr)
    }
}
