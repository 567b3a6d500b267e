use crate::{actions::then::ThenAction, webhook::hooks::HookType};
use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Normalize repository urls to the https or ssh form.
pub mod url;

use self::url::{normalize_https, normalize_ssh, UrlError};

/// The branch to track if there is none given.
pub const DEFAULT_BRANCH: &str = "master";

/// The minimum interval to wait before pulling again.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A custom error for authentication modes that cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Private keys are only supported on some platforms.
    #[error("private key authentication is not supported on {0}")]
    UnsupportedPlatform(&'static str),
}

/// The way to authenticate against the remote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Auth {
    /// Access the remote over https, relying on the credential helper if needed.
    #[default]
    Https,
    /// Access the remote over ssh with the given private key.
    Ssh { key: PathBuf },
}

impl Auth {
    /// Create a private key authentication, if the platform supports it.
    pub fn ssh(key: impl Into<PathBuf>) -> Result<Auth, AuthError> {
        if !ssh_key_supported() {
            return Err(AuthError::UnsupportedPlatform(std::env::consts::OS));
        }

        Ok(Auth::Ssh { key: key.into() })
    }

    /// Normalize the url to the form this authentication needs.
    /// Returns the canonical url and the host name.
    pub fn normalize(&self, raw_url: &str) -> Result<(String, String), UrlError> {
        match self {
            Auth::Https => normalize_https(raw_url),
            Auth::Ssh { .. } => normalize_ssh(raw_url),
        }
    }
}

/// Private keys are passed to ssh, which we cannot drive on Windows.
pub fn ssh_key_supported() -> bool {
    !cfg!(windows)
}

/// The webhook that triggers the pulls instead of an interval.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hook {
    /// The request path to listen on, empty if there is no webhook.
    pub url: String,
    /// Shared secret to validate the requests with, empty if not set.
    pub secret: String,
    /// The payload format, detected from the request if not set.
    pub hook_type: Option<HookType>,
}

/// What triggers the synchronization of a repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// Pull on a recurring timer.
    Polling(Duration),
    /// Pull on inbound webhook requests.
    Webhook,
}

/// One configured repository to keep in sync.
///
/// It is created once while parsing the configuration and only read afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Repository {
    /// The canonical remote url.
    pub url: String,
    /// The host of the remote url (e.g. github.com).
    pub host: String,
    /// The local directory of the checkout.
    pub path: PathBuf,
    /// The branch to track.
    pub branch: String,
    pub auth: Auth,
    /// Time between pulls, ignored if there is a webhook.
    pub interval: Duration,
    pub hook: Hook,
    /// Commands to run after the repository has changed.
    pub then: Vec<ThenAction>,
}

impl Repository {
    /// Create an empty repository with the defaults, checked out in the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Repository {
            url: String::new(),
            host: String::new(),
            path: root.into(),
            branch: String::from(DEFAULT_BRANCH),
            auth: Auth::Https,
            interval: DEFAULT_INTERVAL,
            hook: Hook::default(),
            then: vec![],
        }
    }

    /// The private key, if the repository is accessed over ssh.
    pub fn key_path(&self) -> Option<&Path> {
        match &self.auth {
            Auth::Ssh { key } => Some(key),
            Auth::Https => None,
        }
    }

    /// The webhook always takes precedence over the interval.
    pub fn mode(&self) -> SyncMode {
        if self.hook.url.is_empty() {
            SyncMode::Polling(self.interval)
        } else {
            SyncMode::Webhook
        }
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} in {}", self.url, self.branch, self.path.display())
    }
}
