//! The `Gitfile` configuration.
//!
//! The file is made of server blocks: a list of listen addresses followed by
//! the directives in braces.
//!
//! ```text
//! :8080, localhost:9090 {
//!     root /srv/www
//!     git github.com/org/site {
//!         branch main
//!         hook /webhook secret
//!     }
//! }
//! ```

use self::{dispenser::Dispenser, lexer::Token};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A cursor over the tokens of a directive.
pub mod dispenser;
/// Splitting the configuration into tokens.
pub mod lexer;

/// The directives that can be used in a server block.
pub const DIRECTIVES: [&str; 2] = ["root", "git"];

/// A custom error for configuration files that cannot be read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("line {0}: unclosed quote")]
    UnclosedQuote(usize),
    #[error("line {0}: expected listen addresses before the block")]
    MissingKeys(usize),
    #[error("line {0}: expected '{{' after the listen addresses")]
    MissingOpeningBrace(usize),
    #[error("line {0}: the block is never closed")]
    UnclosedBlock(usize),
    #[error("line {0}: unexpected '}}'")]
    UnexpectedClosingBrace(usize),
    #[error("line {0}: unknown directive {1}")]
    UnknownDirective(usize, String),
    #[error("line {0}: root needs exactly one path")]
    InvalidRoot(usize),
}

/// One occurrence of a directive, with its name as the first token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Directive {
    pub name: String,
    pub tokens: Vec<Token>,
}

/// The addresses and the directives between one pair of braces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerBlock {
    pub keys: Vec<String>,
    pub directives: Vec<Directive>,
}

impl ServerBlock {
    /// A dispenser over every occurrence of the directive, in order.
    pub fn dispenser(&self, name: &str) -> Dispenser {
        Dispenser::new(
            self.directives
                .iter()
                .filter(|directive| directive.name == name)
                .flat_map(|directive| directive.tokens.iter().cloned())
                .collect(),
        )
    }

    /// The site root of the block, the last `root` wins.
    /// Relative roots are resolved against the default.
    pub fn root(&self, default: &Path) -> Result<PathBuf, ConfigError> {
        let mut root = default.to_path_buf();
        for directive in self.directives.iter().filter(|d| d.name == "root") {
            match directive.tokens.as_slice() {
                [_, path] => root = default.join(&path.text),
                [name, ..] => return Err(ConfigError::InvalidRoot(name.line)),
                [] => {}
            }
        }
        Ok(root)
    }
}

/// Read the server blocks from the configuration.
pub fn parse_config(input: &str) -> Result<Vec<ServerBlock>, ConfigError> {
    let mut tokens = lexer::tokenize(input)?.into_iter();
    let mut blocks = vec![];

    while let Some(first) = tokens.next() {
        let mut keys = vec![];
        let mut opening_line = first.line;
        let mut token = Some(first);
        loop {
            match token {
                None => return Err(ConfigError::MissingOpeningBrace(opening_line)),
                Some(t) if t.text == "{" => {
                    opening_line = t.line;
                    break;
                }
                Some(t) if t.text == "}" => {
                    return Err(ConfigError::UnexpectedClosingBrace(t.line))
                }
                Some(t) => {
                    opening_line = t.line;
                    keys.extend(
                        t.text
                            .split(',')
                            .filter(|key| !key.is_empty())
                            .map(String::from),
                    );
                }
            }
            token = tokens.next();
        }
        if keys.is_empty() {
            return Err(ConfigError::MissingKeys(opening_line));
        }

        let mut body = vec![];
        let mut depth = 0;
        loop {
            let Some(t) = tokens.next() else {
                return Err(ConfigError::UnclosedBlock(opening_line));
            };
            match t.text.as_str() {
                "{" => depth += 1,
                "}" if depth == 0 => break,
                "}" => depth -= 1,
                _ => {}
            }
            body.push(t);
        }

        blocks.push(ServerBlock {
            keys,
            directives: group_directives(body)?,
        });
    }

    Ok(blocks)
}

// A directive starts on a new line and lasts until the end of its block.
fn group_directives(body: Vec<Token>) -> Result<Vec<Directive>, ConfigError> {
    let mut directives: Vec<Directive> = vec![];
    let mut depth = 0;
    let mut last_line = 0;

    for token in body {
        let starts_directive = depth == 0 && (directives.is_empty() || token.line != last_line);
        last_line = token.line;
        match token.text.as_str() {
            "{" => depth += 1,
            "}" => depth -= 1,
            _ => {}
        }

        if starts_directive {
            if !DIRECTIVES.contains(&token.text.as_str()) {
                return Err(ConfigError::UnknownDirective(token.line, token.text));
            }
            directives.push(Directive {
                name: token.text.clone(),
                tokens: vec![token],
            });
        } else if let Some(directive) = directives.last_mut() {
            directive.tokens.push(token);
        }
    }

    Ok(directives)
}
