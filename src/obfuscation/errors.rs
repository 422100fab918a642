//! Error types for the `obfuscation` module

use std::fmt;

/// Failures from [`crate::obfuscation::glob::Glob::compile`]
#[derive(Debug, thiserror::Error)]
pub enum GlobError {
    /// A `\` was the last character, with nothing left to escape.
    #[error("dangling escape at end of pattern")]
    DanglingEscape,
    /// A `[` was never closed.
    #[error("unterminated character class")]
    UnterminatedClass,
    /// `[]` or `[!]` can never match anything.
    #[error("empty character class")]
    EmptyClass,
    /// A `{` was never closed.
    #[error("unterminated alternation")]
    UnterminatedAlternation,
    /// A `]` or `}` without its opening counterpart.
    #[error("unexpected `{0}`")]
    UnexpectedClose(char),
    /// The translated expression was rejected, usually for exceeding the
    /// compiled size limit.
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// A configured pattern could not be compiled after escaping.
#[derive(Debug, thiserror::Error)]
#[error("failed to compile pattern `{pattern}`: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: GlobError,
}

/// Which pattern of a rule configuration failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleField {
    Service,
    Operation,
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleField::Service => f.write_str("service"),
            RuleField::Operation => f.write_str("operation"),
        }
    }
}

/// Failure to build a [`crate::obfuscation::rule::RuleSet`]. Identifies the
/// configuration entry by position and field.
#[derive(Debug, thiserror::Error)]
#[error("invalid {field} pattern in tag match rule #{index}: {source}")]
pub struct RuleBuildError {
    pub index: usize,
    pub field: RuleField,
    #[source]
    pub source: PatternError,
}
