use crate::{context::Context, repository::Repository};
use mockall::automock;
use thiserror::Error;

/// A check to clone, fetch and pull a git repository.
pub mod git;

/// A custom error for describing the error cases for checks
#[derive(Debug, Error)]
pub enum CheckError {
    /// Cannot initialize check, because it has a misconfiguration.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// Cannot run check, because there isn't enough permission.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Cannot update the check, because there is a conflict.
    /// This can be a merge conflict, a filesystem issue
    #[error("there is a conflict: {0}")]
    Conflict(String),
    /// Running the check failed.
    #[error("failed while running: {0}")]
    FailedUpdate(String),
}

/// A check is a process that tests if there are any changes and updates it.
///
/// This is the synchronization of one repository: it brings the local
/// checkout up to date with the remote ([git::GitCheck]).
#[automock]
pub trait Check {
    /// Synchronize the repository. Returns true if the local checkout changed.
    fn check(&self, repository: &Repository, context: &mut Context) -> Result<bool, CheckError>;
}

/// The environment the checks are running in.
#[automock]
pub trait Environment {
    /// Validate the global requirements. It can be called multiple times,
    /// but the validation only happens once.
    fn init(&self) -> Result<(), CheckError>;

    /// Make the local path of the repository ready to be cloned into or pulled.
    fn prepare(&self, repository: &Repository) -> Result<(), CheckError>;
}
