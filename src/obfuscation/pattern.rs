//! Pattern language used by tag match rules.
//!
//! `*` is the only wildcard. Every other character matches itself, including
//! the characters the glob engine would otherwise treat as syntax.

use std::fmt;

use crate::obfuscation::errors::PatternError;
use crate::obfuscation::glob::Glob;

/// Pattern substituted for an omitted service or operation.
pub const MATCH_ALL: &str = "*";

/// Glob syntax characters that must match literally. `*` is absent on purpose.
const RESERVED: [char; 7] = ['^', '?', '\\', '{', '}', '[', ']'];

/// A compiled, immutable pattern.
///
/// `Display` renders the canonical form, which is the escaped glob the pattern
/// compiled to.
pub trait PatternMatcher: fmt::Debug + fmt::Display + Send + Sync {
    fn matches(&self, candidate: &str) -> bool;
}

impl PatternMatcher for Glob {
    fn matches(&self, candidate: &str) -> bool {
        self.is_match(candidate)
    }
}

/// Prefixes every reserved character with `\` so the glob engine reads it as a literal.
#[must_use]
pub fn escape_meta_characters(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn compile(pattern: &str) -> Result<Box<dyn PatternMatcher>, PatternError> {
    let escaped = escape_meta_characters(pattern);
    match Glob::compile(&escaped) {
        Ok(glob) => Ok(Box::new(glob)),
        Err(source) => Err(PatternError {
            pattern: pattern.to_string(),
            source,
        }),
    }
}
