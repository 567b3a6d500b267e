use super::signature::{verify_hex_signature, verify_signature, verify_token};
use crate::{repository::Repository, triggers::http::HttpRequest};
use serde::Deserialize;
use std::{
    fmt::{self, Display},
    str::FromStr,
};
use thiserror::Error;

/// The names accepted by `hook_type`.
pub const HOOK_TYPES: [&str; 5] = ["github", "gitlab", "bitbucket", "gogs", "generic"];

/// The payload formats of the supported git hosts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookType {
    Github,
    Gitlab,
    Bitbucket,
    Gogs,
    /// A JSON body with an optional `ref`, signed like GitHub if there is a secret.
    Generic,
}

/// The hook type is not one of [HOOK_TYPES].
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported hook type {0}, valid values: github, gitlab, bitbucket, gogs, generic")]
pub struct UnknownHookType(pub String);

impl FromStr for HookType {
    type Err = UnknownHookType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(HookType::Github),
            "gitlab" => Ok(HookType::Gitlab),
            "bitbucket" => Ok(HookType::Bitbucket),
            "gogs" => Ok(HookType::Gogs),
            "generic" => Ok(HookType::Generic),
            s => Err(UnknownHookType(s.to_string())),
        }
    }
}

impl Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookType::Github => "github",
            HookType::Gitlab => "gitlab",
            HookType::Bitbucket => "bitbucket",
            HookType::Gogs => "gogs",
            HookType::Generic => "generic",
        };
        write!(f, "{name}")
    }
}

/// What the webhook request asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum HookEvent {
    /// There was a push to the tracked branch, we should pull.
    Push,
    /// The host is testing the webhook.
    Ping,
    /// A valid request that doesn't need a pull, with the reason.
    Ignored(String),
}

/// A custom error for webhook requests that are rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HookError {
    #[error("only POST requests are accepted")]
    MethodNotAllowed,
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("the request is not signed with the secret")]
    InvalidSignature,
    #[error("cannot parse payload: {0}")]
    InvalidPayload(String),
}

impl HookError {
    /// The HTTP status code to respond with.
    pub fn status(&self) -> u16 {
        match self {
            HookError::MethodNotAllowed => 405,
            HookError::InvalidSignature => 403,
            HookError::MissingHeader(_) | HookError::InvalidPayload(_) => 400,
        }
    }
}

#[derive(Deserialize)]
struct PushPayload {
    #[serde(rename = "ref")]
    reference: Option<String>,
}

#[derive(Deserialize)]
struct BitbucketPayload {
    push: BitbucketPush,
}

#[derive(Deserialize)]
struct BitbucketPush {
    changes: Vec<BitbucketChange>,
}

#[derive(Deserialize)]
struct BitbucketChange {
    new: Option<BitbucketTarget>,
}

#[derive(Deserialize)]
struct BitbucketTarget {
    #[serde(rename = "type")]
    kind: String,
    name: String,
}

impl HookType {
    /// Guess the hook type from the event headers the hosts send.
    pub fn detect(request: &HttpRequest) -> HookType {
        if request.header("X-Gitlab-Event").is_some() {
            HookType::Gitlab
        } else if request.header("X-Gogs-Event").is_some() {
            HookType::Gogs
        } else if request.header("X-GitHub-Event").is_some() {
            HookType::Github
        } else if request.header("X-Event-Key").is_some() {
            HookType::Bitbucket
        } else {
            HookType::Generic
        }
    }

    /// Validate the request for the repository and tell what it asks for.
    pub fn handle(
        &self,
        request: &HttpRequest,
        repository: &Repository,
    ) -> Result<HookEvent, HookError> {
        if request.method != "POST" {
            return Err(HookError::MethodNotAllowed);
        }

        let secret = repository.hook.secret.as_bytes();
        let branch = &repository.branch;
        match self {
            HookType::Github => {
                let event = required_header(request, "X-GitHub-Event")?;
                if !secret.is_empty() {
                    let signature = required_header(request, "X-Hub-Signature-256")?;
                    if !verify_signature(&request.body, signature, secret) {
                        return Err(HookError::InvalidSignature);
                    }
                }
                match event {
                    "ping" => Ok(HookEvent::Ping),
                    "push" => push_event(&request.body, branch),
                    event => Ok(HookEvent::Ignored(format!("unsupported event {event}"))),
                }
            }
            HookType::Gitlab => {
                let event = required_header(request, "X-Gitlab-Event")?;
                if !secret.is_empty() {
                    let token = required_header(request, "X-Gitlab-Token")?;
                    if !verify_token(token, secret) {
                        return Err(HookError::InvalidSignature);
                    }
                }
                match event {
                    "Push Hook" => push_event(&request.body, branch),
                    event => Ok(HookEvent::Ignored(format!("unsupported event {event}"))),
                }
            }
            HookType::Bitbucket => {
                let event = required_header(request, "X-Event-Key")?;
                if !secret.is_empty() {
                    let signature = required_header(request, "X-Hub-Signature")?;
                    if !verify_signature(&request.body, signature, secret) {
                        return Err(HookError::InvalidSignature);
                    }
                }
                match event {
                    "diagnostics:ping" => Ok(HookEvent::Ping),
                    "repo:push" => bitbucket_push_event(&request.body, branch),
                    event => Ok(HookEvent::Ignored(format!("unsupported event {event}"))),
                }
            }
            HookType::Gogs => {
                let event = required_header(request, "X-Gogs-Event")?;
                if !secret.is_empty() {
                    let signature = required_header(request, "X-Gogs-Signature")?;
                    if !verify_hex_signature(&request.body, signature, secret) {
                        return Err(HookError::InvalidSignature);
                    }
                }
                match event {
                    "push" => push_event(&request.body, branch),
                    event => Ok(HookEvent::Ignored(format!("unsupported event {event}"))),
                }
            }
            HookType::Generic => {
                if !secret.is_empty() {
                    let signature = required_header(request, "X-Hub-Signature-256")?;
                    if !verify_signature(&request.body, signature, secret) {
                        return Err(HookError::InvalidSignature);
                    }
                }
                if request.body.iter().all(u8::is_ascii_whitespace) {
                    Ok(HookEvent::Push)
                } else {
                    push_event(&request.body, branch)
                }
            }
        }
    }
}

fn required_header<'a>(
    request: &'a HttpRequest,
    name: &'static str,
) -> Result<&'a str, HookError> {
    request.header(name).ok_or(HookError::MissingHeader(name))
}

fn push_event(body: &[u8], branch: &str) -> Result<HookEvent, HookError> {
    let payload: PushPayload =
        serde_json::from_slice(body).map_err(|err| HookError::InvalidPayload(err.to_string()))?;

    match payload.reference {
        None => Ok(HookEvent::Push),
        Some(reference) if reference == format!("refs/heads/{branch}") => Ok(HookEvent::Push),
        Some(reference) => Ok(HookEvent::Ignored(format!("ignoring push to {reference}"))),
    }
}

fn bitbucket_push_event(body: &[u8], branch: &str) -> Result<HookEvent, HookError> {
    let payload: BitbucketPayload =
        serde_json::from_slice(body).map_err(|err| HookError::InvalidPayload(err.to_string()))?;

    let is_tracked_branch = payload
        .push
        .changes
        .iter()
        .filter_map(|change| change.new.as_ref())
        .any(|target| target.kind == "branch" && target.name == branch);

    if is_tracked_branch {
        Ok(HookEvent::Push)
    } else {
        Ok(HookEvent::Ignored(format!("no push to branch {branch}")))
    }
}
