use super::{Controller, SetupError};
use crate::{
    actions::then::ThenAction,
    repository::{Auth, Repository},
    webhook::hooks::HookType,
};
use log::debug;
use std::{
    path::{Component, Path, PathBuf},
    time::Duration,
};

/// Parse every `git` directive of the controller into a prepared repository.
///
/// The first error stops the parsing and nothing is returned.
pub fn parse(c: &mut Controller) -> Result<Vec<Repository>, SetupError> {
    let mut repositories = vec![];

    while c.dispenser.next() {
        let line = c.dispenser.line();
        let mut repository = Repository::new(&c.root);
        let mut key = None;

        match c.dispenser.remaining_args().as_slice() {
            [url] => repository.url = url.clone(),
            [url, path] => {
                repository.url = url.clone();
                repository.path = clean_path(&c.root, path);
            }
            _ => {}
        }

        while c.dispenser.next_block() {
            let directive = c.dispenser.val().to_string();
            match directive.as_str() {
                "repo" => repository.url = next_arg(c, &directive)?,
                "path" => {
                    let path = next_arg(c, &directive)?;
                    repository.path = clean_path(&c.root, &path);
                }
                "branch" => repository.branch = next_arg(c, &directive)?,
                "key" => key = Some(next_arg(c, &directive)?),
                "interval" => {
                    let value = next_arg(c, &directive)?;
                    match value.parse::<i64>() {
                        Ok(seconds) if seconds > 0 => {
                            repository.interval = Duration::from_secs(seconds.unsigned_abs())
                        }
                        _ => debug!("Ignoring interval {value}, it is not a positive number."),
                    }
                }
                "hook" => {
                    repository.hook.url = next_arg(c, &directive)?;
                    if c.dispenser.next_arg() {
                        repository.hook.secret = c.dispenser.val().to_string();
                    }
                }
                "hook_type" => {
                    let name = next_arg(c, &directive)?;
                    let hook_type = name.parse::<HookType>().map_err(|source| {
                        SetupError::UnsupportedHookType {
                            line: c.dispenser.line(),
                            source,
                        }
                    })?;
                    repository.hook.hook_type = Some(hook_type);
                }
                "then" => {
                    let command = next_arg(c, &directive)?;
                    let args = c.dispenser.remaining_args();
                    repository.then.push(ThenAction::new(command, args));
                }
                "then_long" => {
                    let command = next_arg(c, &directive)?;
                    let args = c.dispenser.remaining_args();
                    repository.then.push(ThenAction::new_long(command, args));
                }
                _ => {
                    return Err(SetupError::InvalidDirective {
                        line: c.dispenser.line(),
                        directive,
                    })
                }
            }
        }

        if repository.url.is_empty() {
            return Err(SetupError::MissingRepositoryUrl { line });
        }

        // Private keys are only checked for the platform here, the filesystem
        // is touched in prepare.
        if let Some(key) = key {
            repository.auth = Auth::ssh(key)?;
        }
        let (url, host) = repository.auth.normalize(&repository.url)?;
        repository.url = url;
        repository.host = host;

        c.environment.init().map_err(SetupError::Init)?;
        c.environment
            .prepare(&repository)
            .map_err(SetupError::Prepare)?;

        debug!("Configured repository {repository}.");
        repositories.push(repository);
    }

    Ok(repositories)
}

fn next_arg(c: &mut Controller, directive: &str) -> Result<String, SetupError> {
    if c.dispenser.next_arg() {
        Ok(c.dispenser.val().to_string())
    } else {
        Err(SetupError::MissingArgument {
            line: c.dispenser.line(),
            directive: directive.to_string(),
        })
    }
}

/// Join the path to the root and resolve `.` and `..` without touching the filesystem.
///
/// Absolute paths are also placed under the root.
pub fn clean_path(root: &Path, path: &str) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in root.components() {
        push_component(&mut cleaned, component);
    }
    for component in Path::new(path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir => {}
            component => push_component(&mut cleaned, component),
        }
    }
    cleaned
}

fn push_component(path: &mut PathBuf, component: Component) {
    match component {
        Component::CurDir => {}
        Component::ParentDir => {
            if path.file_name().is_some() {
                path.pop();
            } else if !path.has_root() {
                path.push(component);
            }
        }
        component => path.push(component),
    }
}
