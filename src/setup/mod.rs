use crate::{
    checks::{CheckError, Environment},
    config::dispenser::Dispenser,
    repository::{url::UrlError, AuthError},
    triggers::http::Middleware,
    webhook::{hooks::UnknownHookType, WebHook},
};
use log::debug;
use std::path::PathBuf;
use thiserror::Error;

/// Planning the startup synchronizations and the webhook.
pub mod activation;
/// Parsing the `git` directives into repositories.
pub mod parse;

use self::activation::{plan, StartupRegistry};

/// A custom error for `git` directives that cannot be set up.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("line {line}: {directive} needs an argument")]
    MissingArgument { line: usize, directive: String },
    #[error("line {line}: unknown property {directive}")]
    InvalidDirective { line: usize, directive: String },
    #[error("line {line}: the repository url is missing")]
    MissingRepositoryUrl { line: usize },
    #[error(transparent)]
    InvalidUrl(#[from] UrlError),
    #[error("line {line}: {source}")]
    UnsupportedHookType {
        line: usize,
        source: UnknownHookType,
    },
    #[error(transparent)]
    UnsupportedPlatform(#[from] AuthError),
    #[error("git is not usable: {0}")]
    Init(CheckError),
    #[error("cannot prepare repository: {0}")]
    Prepare(CheckError),
}

/// Everything a directive needs to be set up for one key of a server block.
pub struct Controller<'a> {
    /// The tokens of every `git` directive in the server block.
    pub dispenser: Dispenser,
    /// The site root, relative paths are resolved against it.
    pub root: PathBuf,
    /// The index of the server block, shared by all of its keys.
    pub server_block: usize,
    /// The listen address this setup is for.
    pub key: String,
    pub environment: &'a dyn Environment,
    pub registry: &'a StartupRegistry,
}

/// Set up the `git` directives of the controller.
///
/// The repositories are parsed and prepared, the startup pulls are registered
/// once per server block. Returns the webhook middleware if any repository
/// is triggered by a webhook.
pub fn setup(controller: &mut Controller) -> Result<Option<Middleware>, SetupError> {
    let repositories = parse::parse(controller)?;
    let (actions, webhook_targets) = plan(repositories);

    if !controller
        .registry
        .once_per_server_block(controller.server_block, actions)
    {
        debug!(
            "Startup actions of server block {} are already registered, skipping for {}.",
            controller.server_block, controller.key
        );
    }

    if webhook_targets.is_empty() {
        Ok(None)
    } else {
        Ok(Some(WebHook::middleware(webhook_targets)))
    }
}
