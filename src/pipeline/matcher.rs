//! URL pattern matching for scope membership.
//!
//! Grammar:
//!
//! - `*` matches any run of characters within one path segment (never `/`)
//! - `**` matches any run of characters, crossing segments
//! - a pattern without wildcards is a plain prefix match, normalized like a
//!   page URL; a trailing `/` keeps it on segment boundaries
//!
//! Scheme and host compare case-insensitively, the path case-sensitively.
//! Wildcard patterns are anchored at both ends, and a trailing `/**` also
//! accepts the bare parent (`https://a.com/docs/**` matches `https://a.com/docs`).
//!
//! Matching simulates the pattern as an NFA over a state bitmap, so cost is
//! O(url length x pattern length) with no backtracking for any input.

use crate::error::{AppError, Result};
use crate::utils::url::{lowercase_authority, normalize};

/// Upper bound on pattern length accepted by [`Pattern::parse`].
pub const MAX_PATTERN_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    Star,
    DoubleStar,
}

impl Token {
    fn is_wildcard(self) -> bool {
        !matches!(self, Token::Literal(_))
    }
}

/// A compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    /// Normalized literal form, used for prefix patterns
    prefix: String,
    /// Prefix pattern written with a trailing `/`
    dir: bool,
    tokens: Vec<Token>,
    wildcard: bool,
    bare_parent: bool,
}

impl Pattern {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("URL pattern must not be empty"));
        }
        if trimmed.len() > MAX_PATTERN_LEN {
            return Err(AppError::validation(format!(
                "URL pattern longer than {MAX_PATTERN_LEN} bytes"
            )));
        }

        let literal = lowercase_authority(trimmed);
        let mut tokens = Vec::with_capacity(literal.len());
        let mut chars = literal.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '*' {
                tokens.push(Token::Literal(c));
                continue;
            }
            // Any run of two or more stars collapses to `**`
            let mut run = 1;
            while chars.peek() == Some(&'*') {
                chars.next();
                run += 1;
            }
            tokens.push(if run == 1 { Token::Star } else { Token::DoubleStar });
        }

        let wildcard = tokens.iter().any(|t| t.is_wildcard());
        let bare_parent = tokens.ends_with(&[Token::Literal('/'), Token::DoubleStar]);

        let dir = !wildcard && trimmed.ends_with('/');
        let prefix = if wildcard {
            literal
        } else {
            let prefix = normalize(trimmed).unwrap_or(literal);
            prefix.trim_end_matches('/').to_string()
        };

        Ok(Self {
            raw: trimmed.to_string(),
            prefix,
            dir,
            tokens,
            wildcard,
            bare_parent,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Test a URL against this pattern.
    pub fn matches(&self, url: &str) -> bool {
        let url = lowercase_authority(url.trim());
        if !self.wildcard {
            return self.matches_prefix(&url);
        }
        if self.run(url.chars()) {
            return true;
        }
        self.bare_parent && self.run(url.chars().chain(std::iter::once('/')))
    }

    fn matches_prefix(&self, url: &str) -> bool {
        match url.strip_prefix(self.prefix.as_str()) {
            Some(rest) => !self.dir || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    fn run(&self, input: impl Iterator<Item = char>) -> bool {
        let n = self.tokens.len();
        let mut current = vec![false; n + 1];
        let mut next = vec![false; n + 1];
        current[0] = true;
        self.close(&mut current);

        for c in input {
            next.fill(false);
            let mut alive = false;
            for (i, token) in self.tokens.iter().enumerate() {
                if !current[i] {
                    continue;
                }
                match *token {
                    Token::Literal(l) if l == c => {
                        next[i + 1] = true;
                        alive = true;
                    }
                    Token::Star if c != '/' => {
                        next[i] = true;
                        alive = true;
                    }
                    Token::DoubleStar => {
                        next[i] = true;
                        alive = true;
                    }
                    _ => {}
                }
            }
            if !alive {
                return false;
            }
            self.close(&mut next);
            std::mem::swap(&mut current, &mut next);
        }

        current[n]
    }

    /// Wildcards may match the empty string, so a state at a wildcard also
    /// occupies the state after it. Forward order covers chained wildcards.
    fn close(&self, states: &mut [bool]) {
        for (i, token) in self.tokens.iter().enumerate() {
            if states[i] && token.is_wildcard() {
                states[i + 1] = true;
            }
        }
    }
}

/// The compiled pattern list of one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Compile every pattern, failing on the first invalid one.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::parse(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if any pattern matches. An empty set matches nothing.
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(url))
    }
}

/// Test a URL against a single pattern. Invalid patterns match nothing.
pub fn matches(url: &str, pattern: &str) -> bool {
    Pattern::parse(pattern)
        .map(|p| p.matches(url))
        .unwrap_or(false)
}

/// Test a URL against a pattern list. An empty list matches nothing.
pub fn matches_any(url: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches(url, p))
}
