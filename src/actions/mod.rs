use crate::context::Context;
use mockall::automock;
use std::path::Path;
use thiserror::Error;

/// An action to run a command after the repository changed.
pub mod then;

/// A custom error for describing the error cases for actions
#[derive(Debug, Error)]
pub enum ActionError {
    /// Running the action failed.
    #[error("{0}")]
    FailedAction(String),
}

/// An action is a process that runs if any changes occured.
///
/// Actions may include:
///   - commands waited for ([then::ThenAction::new])
///   - commands left running in the background ([then::ThenAction::new_long])
#[automock]
pub trait Action {
    /// Initiate the action in the directory of the repository.
    fn run(&self, directory: &Path, context: &Context) -> Result<(), ActionError>;
}
