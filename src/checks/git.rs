use self::repository::{shorthash, GitRepository};
use super::{Check, CheckError, Environment};
use crate::{context::Context, repository::Repository};
use log::{debug, info, warn};
use std::{fs, path::Path, sync::OnceLock};
use thiserror::Error;

mod credentials;
mod known_hosts;
mod repository;

use known_hosts::setup_known_hosts;

const CHECK_NAME: &str = "GIT";

/// A check to clone or fetch and pull a local git repository.
///
/// If the repository is not cloned yet, it is cloned on the first check.
/// Afterwards the tracked branch is fast-forwarded to the remote.
pub struct GitCheck;

/// A custom error describing the error cases for the GitCheck.
#[derive(Debug, Error)]
pub enum GitError {
    /// The directory is not a valid git repository.
    #[error("{0} is not a valid git repository")]
    NotAGitRepository(String),
    /// Cannot parse HEAD, either stuck an unborn branch or some deleted reference
    #[error("HEAD is invalid, probably points to invalid commit")]
    NoHead,
    /// The checkout is not on the branch we are tracking.
    #[error("repository is not on branch {0}, check it out first")]
    NotOnBranch(String),
    /// There is no origin remote, the repository was not cloned by us.
    #[error("repository doesn't have an origin remote")]
    NoRemote,
    /// There are changes in the directory, avoiding pulling. This is a safety mechanism to avoid pulling
    /// over local changes, to not overwrite anything important.
    #[error("there are uncommited changes in the directory")]
    DirtyWorkingTree,
    /// Cannot read the status of the working tree.
    #[error("cannot read the status of the repository ({0})")]
    StatusFailed(String),
    /// Cannot load the git config
    #[error("cannot load git config")]
    ConfigLoadingFailed,
    /// Cannot create the ssh config
    #[error("cannot create ssh config")]
    SshConfigFailed,
    /// The configured private key does not exist.
    #[error("private key {0} does not exist")]
    KeyNotFound(String),
    /// There is already a repository with a different remote in the directory.
    #[error("another git repository '{1}' exists at {0}")]
    AnotherRepository(String, String),
    /// The directory has files in it, but it is not a repository.
    #[error("cannot clone into {0}, directory not empty")]
    DirectoryNotEmpty(String),
    /// The directory cannot be created or read.
    #[error("cannot access {0} ({1})")]
    PathNotAccessible(String, String),
    /// The libgit2 we are linked with cannot be used.
    #[error("libgit2 is unusable: {0}")]
    MissingCapability(String),
    /// Cannot clone the repository. This can be a network failure, authentication error or many other things.
    #[error("cannot clone ({0})")]
    CloneFailed(String),
    /// Cannot fetch the current branch. This can be a network failure, authentication error or many other things.
    #[error("cannot fetch ({0})")]
    FetchFailed(String),
    /// Cannot pull updates to the current branch. This means either the merge analysis failed
    /// or there is a merge conflict.
    #[error("cannot update branch, this is likely a merge conflict")]
    MergeConflict,
    /// Cannot set the HEAD to the fetch commit.
    #[error("could not set HEAD to fetch commit {0}")]
    FailedSettingHead(String),
}

impl From<GitError> for CheckError {
    fn from(value: GitError) -> Self {
        match value {
            GitError::NotAGitRepository(_)
            | GitError::NoHead
            | GitError::NotOnBranch(_)
            | GitError::NoRemote
            | GitError::KeyNotFound(_)
            | GitError::AnotherRepository(_, _)
            | GitError::DirectoryNotEmpty(_)
            | GitError::MissingCapability(_) => CheckError::Misconfigured(value.to_string()),
            GitError::ConfigLoadingFailed
            | GitError::SshConfigFailed
            | GitError::PathNotAccessible(_, _) => CheckError::PermissionDenied(value.to_string()),
            GitError::DirtyWorkingTree | GitError::MergeConflict => {
                CheckError::Conflict(value.to_string())
            }
            GitError::StatusFailed(_)
            | GitError::CloneFailed(_)
            | GitError::FetchFailed(_)
            | GitError::FailedSettingHead(_) => CheckError::FailedUpdate(value.to_string()),
        }
    }
}

impl GitCheck {
    fn check_inner(
        &self,
        repository: &Repository,
        context: &mut Context,
    ) -> Result<bool, GitError> {
        context.insert("CHECK_NAME".to_string(), CHECK_NAME.to_string());
        context.insert("GIT_REMOTE_URL".to_string(), repository.url.clone());
        context.insert("GIT_BRANCH_NAME".to_string(), repository.branch.clone());

        if !repository.path.join(".git").exists() {
            info!("Cloning {repository}.");
            let repo = GitRepository::clone_remote(
                &repository.url,
                &repository.branch,
                &repository.path,
                &repository.auth,
            )?;
            insert_commit(context, "GIT_COMMIT", &repo.head_sha()?);
            return Ok(true);
        }

        let repo = GitRepository::open(&repository.path)?;
        let before_commit_sha = repo.head_sha()?;
        insert_commit(context, "GIT_BEFORE_COMMIT", &before_commit_sha);
        insert_commit(context, "GIT_COMMIT", &before_commit_sha);

        repo.ensure_branch(&repository.branch)?;
        if repo.is_dirty()? {
            return Err(GitError::DirtyWorkingTree);
        }

        let fetch_commit = repo.fetch(&repository.branch, &repository.auth)?;
        if repo.check_if_updatable(&fetch_commit)?
            && repo.pull(&repository.branch, &fetch_commit)?
        {
            insert_commit(context, "GIT_COMMIT", &fetch_commit.id().to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

fn insert_commit(context: &mut Context, prefix: &str, sha: &str) {
    context.insert(format!("{prefix}_SHA"), sha.to_string());
    context.insert(format!("{prefix}_SHORT_SHA"), shorthash(sha));
}

impl Check for GitCheck {
    /// Clone or fetch and pull changes from the remote repository on the tracked branch.
    /// It returns true if the pull was successful and there are new changes.
    fn check(&self, repository: &Repository, context: &mut Context) -> Result<bool, CheckError> {
        let update_successful = self.check_inner(repository, context)?;

        Ok(update_successful)
    }
}

/// The environment of the git checks, backed by libgit2 and the local filesystem.
#[derive(Default)]
pub struct GitEnvironment {
    initialized: OnceLock<Result<(), String>>,
}

impl GitEnvironment {
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_libgit2() -> Result<(), String> {
    let version = git2::Version::get();
    let (major, minor, patch) = version.libgit2_version();
    debug!("Using libgit2 {major}.{minor}.{patch}.");

    if !version.https() {
        let err = GitError::MissingCapability(String::from("built without https support"));
        return Err(err.to_string());
    }
    if !version.ssh() {
        warn!("libgit2 was built without ssh support, private keys will not work.");
    }

    Ok(())
}

/// Prepare the directory of the repository for the first pull.
///
/// A missing directory is created, an empty one is left as it is and an existing
/// repository is only accepted if its origin is the configured url.
pub fn prepare(repository: &Repository) -> Result<(), GitError> {
    if let Some(key) = repository.key_path() {
        if !key.exists() {
            return Err(GitError::KeyNotFound(key.display().to_string()));
        }
        setup_known_hosts(&repository.host)?;
    }

    let path = &repository.path;
    if !path.exists() {
        debug!("Creating directory {}.", path.display());
        return fs::create_dir_all(path).map_err(|err| not_accessible(path, err));
    }

    if path.join(".git").exists() {
        // Checkouts cloned by hand may leave out the `.git` suffix.
        let remote_url = GitRepository::open(path)?.remote_url()?;
        if remote_url.trim_end_matches(".git") != repository.url.trim_end_matches(".git") {
            return Err(GitError::AnotherRepository(
                path.display().to_string(),
                remote_url,
            ));
        }
        return Ok(());
    }

    let is_empty = fs::read_dir(path)
        .map_err(|err| not_accessible(path, err))?
        .next()
        .is_none();
    if is_empty {
        Ok(())
    } else {
        Err(GitError::DirectoryNotEmpty(path.display().to_string()))
    }
}

fn not_accessible(path: &Path, err: std::io::Error) -> GitError {
    GitError::PathNotAccessible(path.display().to_string(), err.to_string())
}

impl Environment for GitEnvironment {
    fn init(&self) -> Result<(), CheckError> {
        self.initialized
            .get_or_init(validate_libgit2)
            .clone()
            .map_err(CheckError::Misconfigured)
    }

    fn prepare(&self, repository: &Repository) -> Result<(), CheckError> {
        prepare(repository)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Auth;
    use duct::cmd;
    use rand::distributions::{Alphanumeric, DistString};
    use std::{collections::HashMap, error::Error, path::PathBuf};

    fn get_random_id() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    }

    fn commit(path: &str, file: &str, contents: &str) -> Result<(), Box<dyn Error>> {
        fs::write(format!("{path}/{file}"), contents)?;
        cmd!("git", "add", "-A").dir(path).read()?;
        cmd!(
            "git",
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-m",
            file
        )
        .dir(path)
        .read()?;

        Ok(())
    }

    fn create_remote_repository(local: &str) -> Result<String, Box<dyn Error>> {
        let remote = format!("{local}-remote");
        let seed = format!("{local}-seed");

        fs::create_dir_all(&remote)?;
        cmd!("git", "init", "--bare", "--initial-branch=master")
            .dir(&remote)
            .read()?;
        cmd!("git", "clone", &remote, &seed).read()?;
        cmd!("git", "symbolic-ref", "HEAD", "refs/heads/master")
            .dir(&seed)
            .read()?;
        commit(&seed, "1", "1")?;
        cmd!("git", "push", "origin", "master").dir(&seed).read()?;

        Ok(fs::canonicalize(&remote)?.to_string_lossy().to_string())
    }

    fn push_other_commit(local: &str) -> Result<(), Box<dyn Error>> {
        let seed = format!("{local}-seed");

        commit(&seed, "2", "2")?;
        cmd!("git", "push", "origin", "master").dir(&seed).read()?;

        Ok(())
    }

    fn get_last_commit(path: &str) -> Result<String, Box<dyn Error>> {
        let commit_sha = cmd!("git", "rev-parse", "HEAD").dir(path).read()?;

        Ok(commit_sha)
    }

    fn cleanup_repository(local: &str) -> Result<(), Box<dyn Error>> {
        for path in [
            local.to_string(),
            format!("{local}-remote"),
            format!("{local}-seed"),
        ] {
            if Path::new(&path).exists() {
                fs::remove_dir_all(path)?;
            }
        }

        Ok(())
    }

    fn repository_for(url: &str, local: &str) -> Repository {
        let mut repository = Repository::new(local);
        repository.url = url.to_string();
        repository
    }

    #[test]
    fn it_should_clone_a_missing_repository() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;

        let repository = repository_for(&remote, &local);
        let mut context: Context = HashMap::new();
        let is_pulled = GitCheck.check_inner(&repository, &mut context)?;

        assert!(is_pulled);
        assert!(Path::new(&format!("{local}/1")).exists());
        assert_eq!("GIT", context.get("CHECK_NAME").unwrap());
        assert_eq!("master", context.get("GIT_BRANCH_NAME").unwrap());
        assert_eq!(&get_last_commit(&local)?, context.get("GIT_COMMIT_SHA").unwrap());

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_return_false_if_the_remote_didnt_change() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;

        let repository = repository_for(&remote, &local);
        GitCheck.check_inner(&repository, &mut HashMap::new())?;

        let mut context: Context = HashMap::new();
        let is_pulled = GitCheck.check_inner(&repository, &mut context)?;
        assert!(!is_pulled);

        let commit_sha = get_last_commit(&local)?;
        assert_eq!(&commit_sha, context.get("GIT_BEFORE_COMMIT_SHA").unwrap());
        assert_eq!(&commit_sha, context.get("GIT_COMMIT_SHA").unwrap());
        assert_eq!(
            &commit_sha[0..7],
            context.get("GIT_COMMIT_SHORT_SHA").unwrap()
        );

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_return_true_if_the_remote_changes() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;

        let repository = repository_for(&remote, &local);
        GitCheck.check_inner(&repository, &mut HashMap::new())?;
        let before_commit_sha = get_last_commit(&local)?;

        push_other_commit(&local)?;

        let mut context: Context = HashMap::new();
        let is_pulled = GitCheck.check_inner(&repository, &mut context)?;
        assert!(is_pulled);

        // The pushed file should be pulled
        assert!(Path::new(&format!("{local}/2")).exists());

        let commit_sha = get_last_commit(&local)?;
        assert_eq!(
            &before_commit_sha,
            context.get("GIT_BEFORE_COMMIT_SHA").unwrap()
        );
        assert_eq!(&commit_sha, context.get("GIT_COMMIT_SHA").unwrap());

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_if_the_working_tree_is_dirty() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;

        let repository = repository_for(&remote, &local);
        GitCheck.check_inner(&repository, &mut HashMap::new())?;
        push_other_commit(&local)?;

        // Add uncommited modification to emulate a dirty working tree
        fs::write(format!("{local}/1"), "22")?;

        let error = GitCheck
            .check_inner(&repository, &mut HashMap::new())
            .err()
            .unwrap();
        assert!(
            matches!(error, GitError::DirtyWorkingTree),
            "{error:?} should be DirtyWorkingTree"
        );
        assert!(!Path::new(&format!("{local}/2")).exists());

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_if_the_branch_does_not_exist() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;

        let mut repository = repository_for(&remote, &local);
        repository.branch = String::from("does-not-exist");
        let result = GitCheck.check(&repository, &mut HashMap::new());

        assert!(
            matches!(result, Err(CheckError::FailedUpdate(_))),
            "{result:?} should be FailedUpdate"
        );

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_create_missing_directories() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}/nested", get_random_id());

        let repository = repository_for("https://github.com/org/repo.git", &local);
        prepare(&repository)?;

        assert!(Path::new(&local).is_dir());

        fs::remove_dir_all(Path::new(&local).parent().unwrap())?;

        Ok(())
    }

    #[test]
    fn it_should_refuse_non_empty_directories() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        fs::create_dir_all(&local)?;
        fs::write(format!("{local}/index.html"), "hello")?;

        let repository = repository_for("https://github.com/org/repo.git", &local);
        let error = prepare(&repository).err().unwrap();
        assert!(
            matches!(error, GitError::DirectoryNotEmpty(_)),
            "{error:?} should be DirectoryNotEmpty"
        );

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_refuse_repositories_with_another_remote() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;
        GitCheck.check_inner(&repository_for(&remote, &local), &mut HashMap::new())?;

        let repository = repository_for("https://github.com/org/other.git", &local);
        let error = prepare(&repository).err().unwrap();
        assert!(
            matches!(error, GitError::AnotherRepository(_, _)),
            "{error:?} should be AnotherRepository"
        );

        // The same remote is accepted
        prepare(&repository_for(&remote, &local))?;

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_accept_remotes_without_the_git_suffix() -> Result<(), Box<dyn Error>> {
        let local = format!("test_directories/{}", get_random_id());
        let remote = create_remote_repository(&local)?;
        GitCheck.check_inner(&repository_for(&remote, &local), &mut HashMap::new())?;

        // The checkout has the remote without the suffix, the normalized url has it
        prepare(&repository_for(&format!("{remote}.git"), &local))?;

        let error = prepare(&repository_for(&format!("{remote}-other.git"), &local))
            .err()
            .unwrap();
        assert!(
            matches!(error, GitError::AnotherRepository(_, _)),
            "{error:?} should be AnotherRepository"
        );

        cleanup_repository(&local)?;

        Ok(())
    }

    #[test]
    fn it_should_fail_if_the_private_key_is_missing() {
        let mut repository = repository_for("git@github.com:org/repo.git", "test_directories");
        repository.auth = Auth::Ssh {
            key: PathBuf::from("/path/to/nowhere"),
        };

        let error = prepare(&repository).err().unwrap();
        assert!(
            matches!(error, GitError::KeyNotFound(_)),
            "{error:?} should be KeyNotFound"
        );
    }

    #[test]
    fn it_should_validate_the_environment_once() {
        let environment = GitEnvironment::new();

        assert!(environment.init().is_ok());
        assert!(environment.init().is_ok());
        assert!(environment.initialized.get().is_some());
    }
}
