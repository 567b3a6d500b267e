use thiserror::Error;
use url::Url;

const GIT_SUFFIX: &str = ".git";
const SSH_PREFIX: &str = "git@";
// The shortest acceptable ssh url is `git@a:`, the colon can't come earlier.
const SSH_MIN_COLON_INDEX: usize = "git@a:".len();
const BITBUCKET_HOST: &str = "bitbucket.org";

/// A custom error describing why a repository url cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    /// The url is neither a valid http(s) url nor an ssh url in the `git@host:path` form.
    #[error("invalid git url {0}")]
    InvalidGitUrl(String),
    /// The url could not be parsed at all.
    #[error("cannot parse url {0} ({1})")]
    Unparseable(String, url::ParseError),
}

/// Convert the repository url to the https format, so cloning never falls back to
/// interactive ssh authentication.
///
/// Urls in the ssh form (`git@github.com:org/repo`) are rewritten, user information
/// is kept and Bitbucket urls get the account name as user, because Bitbucket
/// requires it in https urls. Returns the canonical url and the host name.
pub fn normalize_https(raw_url: &str) -> Result<(String, String), UrlError> {
    let raw_url = raw_url.trim();

    let url = match raw_url.strip_prefix(SSH_PREFIX) {
        Some(scp) if !raw_url.contains("://") => {
            let (host, path) = scp
                .split_once(':')
                .ok_or_else(|| UrlError::InvalidGitUrl(raw_url.to_string()))?;
            // Parsed like every other url, so the output is already canonical.
            parse_with_default_scheme(&format!("https://{host}/{path}"))?
        }
        _ => parse_with_default_scheme(raw_url)?,
    };

    let host = url
        .host_str()
        .ok_or_else(|| UrlError::InvalidGitUrl(raw_url.to_string()))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let user = Some(url.username())
        .filter(|user| !user.is_empty())
        .map(String::from);
    let path = url.path().to_string();

    if host.is_empty() || path.trim_start_matches('/').is_empty() {
        return Err(UrlError::InvalidGitUrl(raw_url.to_string()));
    }

    let url = match user {
        Some(user) => format!("https://{user}@{host}{path}"),
        None if host == BITBUCKET_HOST => {
            let account = path.split('/').nth(1).unwrap_or_default();
            format!("https://{account}@{host}{path}")
        }
        None => format!("https://{host}{path}"),
    };

    Ok((with_git_suffix(url), host))
}

/// Convert the repository url to the ssh format (`git@host:path`), used when a
/// private key is given.
///
/// Urls already in the ssh form are kept, http(s) urls are rewritten, anything
/// else is rejected. Returns the canonical url and the host name.
pub fn normalize_ssh(raw_url: &str) -> Result<(String, String), UrlError> {
    let raw_url = raw_url.trim();

    let ssh_url = if is_ssh_url(raw_url) {
        raw_url.to_string()
    } else {
        match Url::parse(raw_url) {
            Ok(url) if url.scheme().starts_with("http") => {
                let host = url
                    .host_str()
                    .ok_or_else(|| UrlError::InvalidGitUrl(raw_url.to_string()))?;
                format!("{SSH_PREFIX}{host}:{}", url.path().trim_start_matches('/'))
            }
            _ => return Err(UrlError::InvalidGitUrl(raw_url.to_string())),
        }
    };

    let host = ssh_url[SSH_PREFIX.len()..]
        .split_once(':')
        .map(|(host, _)| host.to_string())
        .ok_or_else(|| UrlError::InvalidGitUrl(raw_url.to_string()))?;

    Ok((with_git_suffix(ssh_url), host))
}

fn is_ssh_url(url: &str) -> bool {
    url.starts_with(SSH_PREFIX)
        && url
            .find(':')
            .is_some_and(|index| index >= SSH_MIN_COLON_INDEX)
}

fn parse_with_default_scheme(raw_url: &str) -> Result<Url, UrlError> {
    let result = if raw_url.contains("://") {
        Url::parse(raw_url)
    } else {
        // Host-first urls like github.com/org/repo
        Url::parse(&format!("https://{raw_url}"))
    };

    result.map_err(|err| UrlError::Unparseable(raw_url.to_string(), err))
}

fn with_git_suffix(mut url: String) -> String {
    if !url.ends_with(GIT_SUFFIX) {
        url.push_str(GIT_SUFFIX);
    }
    url
}
