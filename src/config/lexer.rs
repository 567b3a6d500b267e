use super::ConfigError;

/// One word of the configuration with the line it was found on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub line: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Token {
            text: text.into(),
            line,
        }
    }
}

/// Split the configuration into words, keeping the line numbers (starting from 1).
///
/// Every line is split with POSIX shell rules, so quoting cannot span lines.
/// Empty lines and lines starting with `#` are skipped.
pub fn tokenize(input: &str) -> Result<Vec<Token>, ConfigError> {
    let mut tokens = vec![];
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let words = shlex::split(trimmed).ok_or(ConfigError::UnclosedQuote(line_number))?;
        tokens.extend(words.into_iter().map(|word| Token::new(word, line_number)));
    }

    Ok(tokens)
}
