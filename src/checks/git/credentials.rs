// Credential handling adapted from https://github.com/davidB/git2_credentials,
// reduced to the configured private key, the ssh agent and the credential helper.

use crate::repository::Auth;
use git2::{Config, Cred, CredentialType, Error};
use std::path::PathBuf;

const DEFAULT_USERNAME: &str = "git";

/// Hands out credentials to libgit2 one after the other, never the same twice.
pub struct CredentialHandler {
    username_attempts_count: usize,
    ssh_attempts_count: usize,
    ssh_key: Option<PathBuf>,
    cred_helper_bad: Option<bool>,
    cfg: Config,
}

// implemention based on code & comment from cargo
// https://github.com/rust-lang/cargo/blob/master/src/cargo/sources/git/utils.rs#L415-L628
// License APACHE
impl CredentialHandler {
    pub fn new(cfg: Config, auth: &Auth) -> Self {
        let ssh_key = match auth {
            Auth::Ssh { key } => Some(key.clone()),
            Auth::Https => None,
        };

        CredentialHandler {
            username_attempts_count: 0,
            ssh_attempts_count: 0,
            ssh_key,
            cred_helper_bad: None,
            cfg,
        }
    }

    /// The credential callback given to libgit2.
    ///
    /// libgit2 calls it again and again until it returns an error, so every kind
    /// of credential is only tried once:
    ///
    /// - If only a username is asked (ssh urls without user), we answer `git`.
    /// - For ssh we try the configured private key first, then the ssh agent.
    /// - For https we try the credential helper configured in git.
    /// - Otherwise we return the default credentials, if allowed.
    pub fn try_next_credential(
        &mut self,
        url: &str,
        username: Option<&str>,
        allowed: CredentialType,
    ) -> Result<Cred, Error> {
        if allowed.contains(CredentialType::USERNAME) {
            self.username_attempts_count += 1;
            return if self.username_attempts_count == 1 {
                Cred::username(DEFAULT_USERNAME)
            } else {
                Err(Error::from_str("no more username to try"))
            };
        }

        if allowed.contains(CredentialType::SSH_KEY) {
            self.ssh_attempts_count += 1;
            let user = username.unwrap_or(DEFAULT_USERNAME);
            return match (self.ssh_attempts_count, &self.ssh_key) {
                (1, Some(key)) => Cred::ssh_key(user, None, key, None),
                (1, None) | (2, Some(_)) => Cred::ssh_key_from_agent(user),
                _ => Err(Error::from_str("failed ssh authentication for repository")),
            };
        }

        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) && self.cred_helper_bad.is_none()
        {
            let result = Cred::credential_helper(&self.cfg, url, username);
            self.cred_helper_bad = Some(result.is_err());
            return result;
        }

        if allowed.contains(CredentialType::DEFAULT) {
            return Cred::default();
        }

        Err(Error::from_str("no valid authentication available"))
    }
}
