//! A small glob engine backed by `regex`.
//!
//! Supported syntax:
//! - `*` matches any run of characters, including none
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]` and the negated `[!a-z]` / `[^a-z]` match one character of a class
//! - `{one,two}` matches any of the comma separated alternatives
//! - `\x` matches `x` literally
//!
//! Everything else matches itself. Matching is anchored on both ends.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use regex::{Regex, RegexBuilder};

use crate::obfuscation::errors::GlobError;

/// Upper bound, in bytes, on the compiled form of a single glob.
pub const MAX_COMPILED_SIZE: usize = 1 << 20;

#[derive(Clone, Debug)]
pub struct Glob {
    source: String,
    regex: Regex,
}

impl Glob {
    pub fn compile(glob: &str) -> Result<Self, GlobError> {
        let translated = translate(glob)?;
        let regex = RegexBuilder::new(&translated)
            .size_limit(MAX_COMPILED_SIZE)
            .build()?;

        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    /// The glob text this matcher was compiled from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn translate(glob: &str) -> Result<String, GlobError> {
    let mut out = String::with_capacity(glob.len() * 2 + 8);
    out.push_str("(?s)^");

    let mut chars = glob.chars().peekable();
    let mut open_alternations = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next().ok_or(GlobError::DanglingEscape)?;
                push_literal(&mut out, escaped);
            }
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => translate_class(&mut chars, &mut out)?,
            '{' => {
                open_alternations += 1;
                out.push_str("(?:");
            }
            ',' if open_alternations > 0 => out.push('|'),
            '}' if open_alternations > 0 => {
                open_alternations -= 1;
                out.push(')');
            }
            '}' | ']' => return Err(GlobError::UnexpectedClose(c)),
            _ => push_literal(&mut out, c),
        }
    }

    if open_alternations > 0 {
        return Err(GlobError::UnterminatedAlternation);
    }

    out.push('$');
    Ok(out)
}

fn translate_class(chars: &mut Peekable<Chars<'_>>, out: &mut String) -> Result<(), GlobError> {
    out.push('[');
    if matches!(chars.peek(), Some('!' | '^')) {
        chars.next();
        out.push('^');
    }

    let mut members = 0usize;
    loop {
        match chars.next() {
            None => return Err(GlobError::UnterminatedClass),
            Some(']') => {
                if members == 0 {
                    return Err(GlobError::EmptyClass);
                }
                break;
            }
            Some('\\') => {
                let escaped = chars.next().ok_or(GlobError::DanglingEscape)?;
                push_literal(out, escaped);
            }
            // a range dash sits between two members, anywhere else it is literal
            Some('-') if members > 0 && !matches!(chars.peek(), Some(']') | None) => {
                out.push('-');
            }
            Some(c) => push_literal(out, c),
        }
        members += 1;
    }

    out.push(']');
    Ok(())
}

fn push_literal(out: &mut String, c: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}
