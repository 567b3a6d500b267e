use super::{credentials::CredentialHandler, GitError};
use crate::repository::Auth;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    AnnotatedCommit, AutotagOption, Config, FetchOptions, RemoteCallbacks, Repository,
    StatusOptions,
};
use std::path::Path;

const REMOTE_NAME: &str = "origin";

/// The first seven characters of a commit hash.
pub fn shorthash(sha: &str) -> String {
    sha.chars().take(7).collect()
}

fn fetch_options(auth: &Auth) -> Result<FetchOptions<'static>, GitError> {
    let git_config = Config::open_default().map_err(|_| GitError::ConfigLoadingFailed)?;
    let mut ch = CredentialHandler::new(git_config, auth);

    let mut cb = RemoteCallbacks::new();
    cb.credentials(move |url, username, allowed| ch.try_next_credential(url, username, allowed));

    let mut opts = FetchOptions::new();
    opts.remote_callbacks(cb);
    opts.download_tags(AutotagOption::All);

    Ok(opts)
}

pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    pub fn open(directory: &Path) -> Result<Self, GitError> {
        let repo = Repository::open(directory)
            .map_err(|_| GitError::NotAGitRepository(directory.display().to_string()))?;

        Ok(GitRepository { repo })
    }

    /// Clone the branch of the remote into the (empty or missing) directory.
    pub fn clone_remote(
        url: &str,
        branch: &str,
        directory: &Path,
        auth: &Auth,
    ) -> Result<Self, GitError> {
        let mut builder = RepoBuilder::new();
        builder.branch(branch);
        builder.fetch_options(fetch_options(auth)?);

        let repo = builder
            .clone(url, directory)
            .map_err(|err| GitError::CloneFailed(err.message().to_string()))?;

        Ok(GitRepository { repo })
    }

    /// The commit hash HEAD is pointing to.
    pub fn head_sha(&self) -> Result<String, GitError> {
        let head = self.repo.head().map_err(|_| GitError::NoHead)?;
        let oid = head.target().ok_or(GitError::NoHead)?;

        Ok(oid.to_string())
    }

    /// The url of the origin remote.
    pub fn remote_url(&self) -> Result<String, GitError> {
        let remote = self
            .repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| GitError::NoRemote)?;

        remote.url().map(String::from).ok_or(GitError::NoRemote)
    }

    /// Fail if HEAD is not on the tracked branch.
    pub fn ensure_branch(&self, branch: &str) -> Result<(), GitError> {
        let head = self
            .repo
            .head()
            .map_err(|_| GitError::NotOnBranch(String::from(branch)))?;

        if head.is_branch() && head.shorthand() == Some(branch) {
            Ok(())
        } else {
            Err(GitError::NotOnBranch(String::from(branch)))
        }
    }

    /// Check if there are modifications in the tracked files.
    pub fn is_dirty(&self) -> Result<bool, GitError> {
        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut options))
            .map_err(|err| GitError::StatusFailed(err.message().to_string()))?;

        Ok(!statuses.is_empty())
    }

    // Inspired from: https://github.com/rust-lang/git2-rs/blob/master/examples/pull.rs
    pub fn fetch(&self, branch: &str, auth: &Auth) -> Result<AnnotatedCommit, GitError> {
        let Self { repo } = self;

        let mut remote = repo
            .find_remote(REMOTE_NAME)
            .map_err(|_| GitError::NoRemote)?;
        let mut opts = fetch_options(auth)?;

        remote
            .fetch(&[branch], Some(&mut opts), None)
            .map_err(|err| GitError::FetchFailed(err.message().to_string()))?;

        let fetch_head = repo
            .find_reference("FETCH_HEAD")
            .map_err(|err| GitError::FetchFailed(err.message().to_string()))?;
        let fetch_commit = repo
            .reference_to_annotated_commit(&fetch_head)
            .map_err(|err| GitError::FetchFailed(err.message().to_string()))?;

        Ok(fetch_commit)
    }

    pub fn check_if_updatable(&self, fetch_commit: &AnnotatedCommit) -> Result<bool, GitError> {
        let Self { repo } = self;
        let (analysis, _) = repo
            .merge_analysis(&[fetch_commit])
            .map_err(|_| GitError::MergeConflict)?;

        if analysis.is_fast_forward() {
            Ok(true)
        } else if analysis.is_up_to_date() {
            Ok(false)
        } else {
            Err(GitError::MergeConflict)
        }
    }

    /// Fast-forward the branch to the fetched commit and check it out.
    pub fn pull(&self, branch: &str, fetch_commit: &AnnotatedCommit) -> Result<bool, GitError> {
        let Self { repo } = self;

        let branch_refname = format!("refs/heads/{branch}");
        let fetch_id = fetch_commit.id();
        let msg = format!("Fast-Forward: Setting {branch_refname} to id: {fetch_id}");

        let mut branch_ref = repo
            .find_reference(&branch_refname)
            .map_err(|_| GitError::NotOnBranch(String::from(branch)))?;
        branch_ref
            .set_target(fetch_id, &msg)
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;
        repo.set_head(&branch_refname)
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;

        Ok(true)
    }
}
