//! Git database operations: refs, branches and multi-file commits.
//!
//! A commit is built from low-level objects (blobs, a tree, a commit) and then
//! the branch ref is moved. Nothing is rolled back when a later step fails;
//! the orphaned objects are content-addressed and inert until referenced.

use reqwest::Method;
use tracing::info;

use super::api_client::{GitHubClient, RequestOptions};
use super::error::{CommitStep, CommitStepContext, GitHubError};
use super::types::{
    CommitFile, CreateBlobRequest, CreateCommitRequest, CreateRefRequest, CreateTreeRequest,
    GitBlob, GitCommit, GitRef, GitTree, InstallationId, RepoName, TreeEntry, UpdateRefRequest,
};

/// Outcome of [`GitHubClient::create_branch`].
#[derive(Debug, Clone)]
pub enum BranchCreation {
    Created(GitRef),
    /// GitHub answered 422; the branch name is already taken.
    AlreadyExists,
}

impl GitHubClient {
    /// Get the ref of branch `branch` (`refs/heads/{branch}`).
    pub async fn get_ref(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        branch: &str,
    ) -> Result<GitRef, GitHubError> {
        let url = format!("/repos/{}/git/ref/heads/{}", repo, branch);
        self.request_json(Method::GET, &url, installation_id, RequestOptions::new())
            .await
    }

    /// Create `branch` pointing at the current head of `from_ref`.
    ///
    /// An existing branch is not an error. The source ref is read first, so a
    /// failed token exchange surfaces before the 422 check.
    pub async fn create_branch(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        branch: &str,
        from_ref: &str,
    ) -> Result<BranchCreation, GitHubError> {
        let source = self.get_ref(installation_id, repo, from_ref).await?;

        let body = CreateRefRequest {
            ref_name: format!("refs/heads/{}", branch),
            sha: source.object.sha,
        };
        let url = format!("/repos/{}/git/refs", repo);

        match self
            .request_json::<GitRef>(
                Method::POST,
                &url,
                installation_id,
                RequestOptions::new().json(&body)?,
            )
            .await
        {
            Ok(created) => {
                info!(repo = %repo, branch = branch, from = from_ref, "Created branch");
                Ok(BranchCreation::Created(created))
            }
            Err(e) if e.is_unprocessable() => {
                info!(repo = %repo, branch = branch, "Branch already exists");
                Ok(BranchCreation::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    /// Commit `files` to `branch` as a single commit on top of its current head.
    ///
    /// Steps run strictly in order: read ref, read base commit, one blob per
    /// file, tree, commit, ref update. The first failure aborts the sequence
    /// and is reported as [`GitHubError::CommitStep`]. With no files the new
    /// commit carries the base tree unchanged.
    pub async fn commit_files(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        branch: &str,
        files: &[CommitFile],
        message: &str,
    ) -> Result<GitCommit, GitHubError> {
        let head = self
            .get_ref(installation_id, repo, branch)
            .await
            .at_step(CommitStep::ReadRef)?;
        let base_sha = head.object.sha;

        let base_commit: GitCommit = self
            .request_json(
                Method::GET,
                &format!("/repos/{}/git/commits/{}", repo, base_sha),
                installation_id,
                RequestOptions::new(),
            )
            .await
            .at_step(CommitStep::ReadBaseCommit)?;

        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            let blob = self
                .create_blob(installation_id, repo, file)
                .await
                .at_step(CommitStep::CreateBlob {
                    path: file.path.clone(),
                })?;
            entries.push(TreeEntry::blob(file.path.clone(), blob.sha));
        }

        let tree: GitTree = self
            .post_json(
                installation_id,
                &format!("/repos/{}/git/trees", repo),
                &CreateTreeRequest {
                    base_tree: base_commit.tree.sha,
                    tree: entries,
                },
            )
            .await
            .at_step(CommitStep::CreateTree)?;

        let commit: GitCommit = self
            .post_json(
                installation_id,
                &format!("/repos/{}/git/commits", repo),
                &CreateCommitRequest {
                    message: message.to_string(),
                    tree: tree.sha,
                    parents: vec![base_sha],
                },
            )
            .await
            .at_step(CommitStep::CreateCommit)?;

        self.request(
            Method::PATCH,
            &format!("/repos/{}/git/refs/heads/{}", repo, branch),
            installation_id,
            RequestOptions::new()
                .json(&UpdateRefRequest {
                    sha: commit.sha.clone(),
                })
                .at_step(CommitStep::UpdateRef)?,
        )
        .await
        .at_step(CommitStep::UpdateRef)?;

        info!(
            repo = %repo,
            branch = branch,
            sha = %commit.sha,
            files = files.len(),
            "Committed files"
        );

        Ok(commit)
    }

    async fn create_blob(
        &self,
        installation_id: InstallationId,
        repo: &RepoName,
        file: &CommitFile,
    ) -> Result<GitBlob, GitHubError> {
        self.post_json(
            installation_id,
            &format!("/repos/{}/git/blobs", repo),
            &CreateBlobRequest::from(&file.content),
        )
        .await
    }

    async fn post_json<B, T>(
        &self,
        installation_id: InstallationId,
        url: &str,
        body: &B,
    ) -> Result<T, GitHubError>
    where
        B: serde::Serialize,
        T: serde::de::DeserializeOwned,
    {
        self.request_json(
            Method::POST,
            url,
            installation_id,
            RequestOptions::new().json(body)?,
        )
        .await
    }
}
