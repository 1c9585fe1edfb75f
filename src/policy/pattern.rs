//! Action patterns used by policy statements.
//!
//! Grammar (whole-identifier match):
//! - literal characters `A-Z a-z 0-9 _ - : .`
//! - `*` matches any sequence, `.*` is accepted as the same wildcard
//!
//! Anything else is rejected when the policy is created, so the compiled regex
//! only ever contains escaped literals and `.*`.

use regex::Regex;
use thiserror::Error;

pub const MAX_PATTERN_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("action pattern cannot be empty")]
    Empty,

    #[error("action pattern is longer than {max} characters: {len}")]
    TooLong { len: usize, max: usize },

    #[error("action pattern '{pattern}' has unsupported character '{ch}' at position {pos}")]
    UnsupportedChar { pattern: String, ch: char, pos: usize },

    #[error("action pattern '{pattern}' failed to compile: {message}")]
    Compile { pattern: String, message: String },
}

fn is_literal(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.')
}

#[derive(Debug, Clone)]
pub struct ActionPattern {
    source: String,
    regex: Regex,
}

impl ActionPattern {
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(PatternError::TooLong { len: pattern.len(), max: MAX_PATTERN_LEN });
        }

        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::with_capacity(pattern.len() + 8);
        out.push('^');
        let mut last_was_wild = false;
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let wild_len = if c == '*' {
                1
            } else if c == '.' && chars.get(i + 1) == Some(&'*') {
                2
            } else {
                0
            };
            if wild_len > 0 {
                // collapse runs like `**` or `.*.*`
                if !last_was_wild { out.push_str(".*"); }
                last_was_wild = true;
                i += wild_len;
                continue;
            }
            if !is_literal(c) {
                return Err(PatternError::UnsupportedChar { pattern: pattern.to_string(), ch: c, pos: i });
            }
            out.push_str(&regex::escape(&c.to_string()));
            last_was_wild = false;
            i += 1;
        }
        out.push('$');

        let regex = Regex::new(&out)
            .map_err(|e| PatternError::Compile { pattern: pattern.to_string(), message: e.to_string() })?;
        Ok(ActionPattern { source: pattern.to_string(), regex })
    }

    pub fn matches(&self, action: &str) -> bool { self.regex.is_match(action) }

    pub fn as_str(&self) -> &str { &self.source }
}
