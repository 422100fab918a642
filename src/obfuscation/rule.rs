use serde::Deserialize;

use crate::obfuscation::errors::{RuleBuildError, RuleField};
use crate::obfuscation::pattern::{self, MATCH_ALL, PatternMatcher};

/// One configured tag match rule. `service` and `operation` default to `*`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TagMatchRuleConfig {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug)]
pub struct Rule {
    service: Box<dyn PatternMatcher>,
    operation: Box<dyn PatternMatcher>,
    tags: Vec<String>,
}

impl Rule {
    #[must_use]
    pub fn service(&self) -> &dyn PatternMatcher {
        self.service.as_ref()
    }

    #[must_use]
    pub fn operation(&self) -> &dyn PatternMatcher {
        self.operation.as_ref()
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[must_use]
    pub fn matches(&self, service: &str, operation: &str) -> bool {
        self.service.matches(service) && self.operation.matches(operation)
    }
}

/// Compiled rules in declaration order. Immutable once built.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compiles every configuration entry, in order. The first bad pattern
    /// aborts the whole build.
    pub fn build(configs: &[TagMatchRuleConfig]) -> Result<Self, RuleBuildError> {
        let mut rules = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let service = compile_field(index, RuleField::Service, config.service.as_deref())?;
            let operation =
                compile_field(index, RuleField::Operation, config.operation.as_deref())?;
            rules.push(Rule {
                service,
                operation,
                tags: config.tags.clone(),
            });
        }
        Ok(Self { rules })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

fn compile_field(
    index: usize,
    field: RuleField,
    pattern: Option<&str>,
) -> Result<Box<dyn PatternMatcher>, RuleBuildError> {
    pattern::compile(pattern.unwrap_or(MATCH_ALL)).map_err(|source| RuleBuildError {
        index,
        field,
        source,
    })
}
