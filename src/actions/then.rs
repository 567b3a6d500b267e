use super::{Action, ActionError};
use crate::context::Context;
use duct::{cmd, Expression};
use log::{debug, error, warn};
use std::{path::Path, thread};
use thiserror::Error;

const ACTION_NAME: &str = "THEN";

/// An action to run a command after the repository has been updated.
///
/// The command is not run in a shell, the arguments are passed as they were
/// written in the configuration. Short commands are waited for and their output
/// is logged, long commands (e.g. servers) are started in the background and
/// only their exit is logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThenAction {
    command: String,
    args: Vec<String>,
    long: bool,
}

/// Custom error describing the error cases for the ThenAction.
#[derive(Debug, Error)]
pub enum ThenError {
    /// The underlying Rust command creation failed. The parameter contains the error.
    #[error("the command cannot run: {0}")]
    CommandFailure(#[from] std::io::Error),
    /// The command returned a non-zero exit code. The parameters are the exit code
    /// and the failed output.
    #[error("the command returned non-zero exit code {0} with message: {1}")]
    NonZeroExitcode(i32, String),
    /// The command output contains non-UTF8 characters.
    #[error("the command returned invalid characters")]
    NonUtf8Return,
}

impl From<ThenError> for ActionError {
    fn from(value: ThenError) -> Self {
        ActionError::FailedAction(value.to_string())
    }
}

impl ThenAction {
    /// Create a command that is waited for before continuing.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        ThenAction {
            command: command.into(),
            args,
            long: false,
        }
    }

    /// Create a command that is started in the background.
    pub fn new_long(command: impl Into<String>, args: Vec<String>) -> Self {
        ThenAction {
            command: command.into(),
            args,
            long: true,
        }
    }

    fn expression(&self, directory: &Path, context: &Context) -> Expression {
        let mut expression = cmd(&self.command, &self.args)
            .dir(directory)
            .env("CI", "true")
            .env("GITWATCH_ACTION_NAME", ACTION_NAME)
            .env("GITWATCH_DIRECTORY", directory);
        for (key, value) in context {
            expression = expression.env(format!("GITWATCH_{key}"), value);
        }

        expression
    }

    fn run_inner(&self, directory: &Path, context: &Context) -> Result<String, ThenError> {
        let output = self
            .expression(directory, context)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .run()?;

        let output_str =
            std::str::from_utf8(&output.stdout).map_err(|_| ThenError::NonUtf8Return)?;
        let output_str = output_str.trim_end().to_string();

        if output.status.success() {
            Ok(output_str)
        } else {
            Err(ThenError::NonZeroExitcode(
                output.status.code().unwrap_or(-1),
                output_str,
            ))
        }
    }

    fn start_inner(&self, directory: &Path, context: &Context) -> Result<(), ThenError> {
        let handle = self.expression(directory, context).unchecked().start()?;

        let command = self.command.clone();
        thread::spawn(move || match handle.wait() {
            Ok(output) if output.status.success() => {
                debug!("Long running command {command} finished.");
            }
            Ok(output) => {
                warn!(
                    "Long running command {command} exited with code {}.",
                    output.status.code().unwrap_or(-1)
                );
            }
            Err(err) => {
                error!("Long running command {command} failed: {err}.");
            }
        });

        Ok(())
    }
}

impl Action for ThenAction {
    fn run(&self, directory: &Path, context: &Context) -> Result<(), ActionError> {
        debug!(
            "Running command: {} {} in directory {}.",
            self.command,
            self.args.join(" "),
            directory.display()
        );

        if self.long {
            match self.start_inner(directory, context) {
                Ok(()) => {
                    debug!("Command started in the background.");
                    Ok(())
                }
                Err(err) => {
                    error!("Failed: {err}.");
                    Err(err.into())
                }
            }
        } else {
            match self.run_inner(directory, context) {
                Ok(result) => {
                    debug!("Command success, output:");
                    result.lines().for_each(|line| {
                        debug!("{line}");
                    });
                    Ok(())
                }
                Err(err) => {
                    error!("Failed: {err}.");
                    Err(err.into())
                }
            }
        }
    }
}
