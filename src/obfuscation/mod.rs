//! Span obfuscation driven by tag match rules.
//!
//! A rule pairs a service pattern and an operation pattern with a list of tag
//! names. Patterns use `*` as the only wildcard; see [`pattern`].

pub mod errors;
pub mod evaluator;
pub mod glob;
pub mod handle;
pub mod obfuscator;
pub mod pattern;
pub mod removal;
pub mod rule;

pub use errors::{PatternError, RuleBuildError, RuleField};
pub use handle::RuleSetHandle;
pub use obfuscator::SpanTagObfuscation;
pub use pattern::PatternMatcher;
pub use removal::SpanTagRemoval;
pub use rule::{Rule, RuleSet, TagMatchRuleConfig};
