use super::lexer::Token;

/// A cursor over the tokens of one directive, used by the directive parsers.
///
/// The tokens of every occurrence of the directive in the server block are
/// concatenated, so the parser can loop on [Dispenser::next] to visit each.
#[derive(Clone, Debug, Default)]
pub struct Dispenser {
    tokens: Vec<Token>,
    // Number of tokens consumed, the current one is before it.
    position: usize,
    nesting: usize,
}

impl Dispenser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Dispenser {
            tokens,
            position: 0,
            nesting: 0,
        }
    }

    fn current(&self) -> Option<&Token> {
        self.position
            .checked_sub(1)
            .and_then(|index| self.tokens.get(index))
    }

    /// Load the next token, wherever it is. Returns false at the end.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        if self.position < self.tokens.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Load the next token if it is on the same line as the current one.
    pub fn next_arg(&mut self) -> bool {
        if self.position == 0 {
            return self.next();
        }
        match (self.current(), self.tokens.get(self.position)) {
            (Some(current), Some(next)) if current.line == next.line => {
                self.position += 1;
                true
            }
            _ => false,
        }
    }

    /// Collect the rest of the arguments on the line, stopping before a `{`.
    pub fn remaining_args(&mut self) -> Vec<String> {
        let mut args = vec![];
        while self.next_arg() {
            if self.val() == "{" {
                self.position -= 1;
                break;
            }
            args.push(self.val().to_string());
        }
        args
    }

    /// Enter the block after the current line or move to the next line in it.
    ///
    /// Returns true with the first token of a line in the block loaded. Tokens left
    /// on the previous line are skipped. Returns false when the block closes or if
    /// there is no block.
    pub fn next_block(&mut self) -> bool {
        if self.nesting > 0 {
            let line = self.line();
            loop {
                if !self.next() {
                    return false;
                }
                if self.val() == "}" {
                    self.nesting -= 1;
                    return false;
                }
                if self.line() != line {
                    return true;
                }
            }
        }

        if !self.next_arg() {
            return false;
        }
        if self.val() != "{" {
            self.position -= 1;
            return false;
        }
        if !self.next() || self.val() == "}" {
            return false;
        }
        self.nesting += 1;
        true
    }

    /// The text of the current token, empty if there is none.
    pub fn val(&self) -> &str {
        self.current().map_or("", |token| token.text.as_str())
    }

    /// The line of the current token, zero if there is none.
    pub fn line(&self) -> usize {
        self.current().map_or(0, |token| token.line)
    }
}
