//! Per-span evaluation of a [`RuleSet`].
//!
//! Every rule is evaluated and the tag lists of all matching rules are
//! unioned. Evaluation never fails; an absent service or operation is the
//! empty string.

use std::collections::{HashMap, HashSet};
use std::hash::BuildHasher;

use crate::obfuscation::rule::RuleSet;

impl RuleSet {
    /// Union of the tag lists of every rule matching `service` and `operation`.
    #[must_use]
    pub fn matching_tags(&self, service: &str, operation: &str) -> HashSet<&str> {
        let mut selected = HashSet::new();
        for rule in self {
            if rule.matches(service, operation) {
                selected.extend(rule.tags().iter().map(String::as_str));
            }
        }
        selected
    }

    /// Removes the selected tags in place and returns how many were present.
    pub fn remove_tags<V, S: BuildHasher>(
        &self,
        service: &str,
        operation: &str,
        tags: &mut HashMap<String, V, S>,
    ) -> usize {
        if self.is_empty() || tags.is_empty() {
            return 0;
        }
        self.matching_tags(service, operation)
            .into_iter()
            .filter(|tag| tags.remove(*tag).is_some())
            .count()
    }

    /// Returns `tags` without the tags selected for this span.
    #[must_use]
    pub fn filter_tags<V, S: BuildHasher>(
        &self,
        service: &str,
        operation: &str,
        mut tags: HashMap<String, V, S>,
    ) -> HashMap<String, V, S> {
        self.remove_tags(service, operation, &mut tags);
        tags
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::obfuscation::rule::TagMatchRuleConfig;

    fn rule(service: Option<&str>, operation: Option<&str>, tags: &[&str]) -> TagMatchRuleConfig {
        TagMatchRuleConfig {
            service: service.map(ToString::to_string),
            operation: operation.map(ToString::to_string),
            tags: tags.iter().map(ToString::to_string).collect(),
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_all_matching_rules_are_unioned() {
        let rules = RuleSet::build(&[
            rule(Some("*"), Some("*"), &["password"]),
            rule(Some("checkout"), Some("*"), &["user.email"]),
        ])
        .unwrap();

        let filtered = rules.filter_tags(
            "checkout",
            "charge",
            tags(&[("password", "x"), ("user.email", "y"), ("amount", "5")]),
        );

        assert_eq!(filtered, tags(&[("amount", "5")]));
    }

    #[test]
    fn test_non_matching_rule_leaves_tags() {
        let rules = RuleSet::build(&[
            rule(None, None, &["password"]),
            rule(Some("checkout"), None, &["user.email"]),
        ])
        .unwrap();

        let filtered = rules.filter_tags(
            "cart",
            "add",
            tags(&[("password", "x"), ("user.email", "y")]),
        );

        assert_eq!(filtered, tags(&[("user.email", "y")]));
    }

    #[test]
    fn test_operation_must_match_too() {
        let rules = RuleSet::build(&[rule(Some("checkout"), Some("charge*"), &["card"])]).unwrap();

        let refund = rules.filter_tags("checkout", "refund", tags(&[("card", "4111")]));
        assert_eq!(refund, tags(&[("card", "4111")]));

        let charge = rules.filter_tags("checkout", "charge.v2", tags(&[("card", "4111")]));
        assert!(charge.is_empty());
    }

    #[test]
    fn test_duplicate_tags_across_rules() {
        let rules = RuleSet::build(&[
            rule(None, None, &["secret", "secret"]),
            rule(None, None, &["secret"]),
        ])
        .unwrap();

        assert_eq!(
            rules.matching_tags("svc", "op"),
            HashSet::from(["secret"])
        );
        let mut span_tags = tags(&[("secret", "s"), ("keep", "k")]);
        assert_eq!(rules.remove_tags("svc", "op", &mut span_tags), 1);
        assert_eq!(span_tags, tags(&[("keep", "k")]));
    }

    #[test]
    fn test_absent_tags_are_ignored() {
        let rules = RuleSet::build(&[rule(None, None, &["missing"])]).unwrap();
        let mut span_tags = tags(&[("present", "p")]);
        assert_eq!(rules.remove_tags("svc", "op", &mut span_tags), 0);
        assert_eq!(span_tags, tags(&[("present", "p")]));
    }

    #[test]
    fn test_empty_names_only_match_wildcard_or_empty_pattern() {
        let rules = RuleSet::build(&[
            rule(Some("checkout"), None, &["a"]),
            rule(Some(""), None, &["b"]),
            rule(None, None, &["c"]),
        ])
        .unwrap();

        assert_eq!(rules.matching_tags("", ""), HashSet::from(["b", "c"]));
    }

    #[test]
    fn test_empty_rule_set_is_a_no_op() {
        let rules = RuleSet::default();
        let filtered = rules.filter_tags("svc", "op", tags(&[("password", "x")]));
        assert_eq!(filtered, tags(&[("password", "x")]));
    }

    #[test]
    fn test_concurrent_evaluation() {
        let rules = std::sync::Arc::new(
            RuleSet::build(&[rule(Some("svc-*"), None, &["token"])]).unwrap(),
        );

        let workers: Vec<_> = (0..8)
            .map(|i| {
                let rules = std::sync::Arc::clone(&rules);
                std::thread::spawn(move || {
                    let service = format!("svc-{i}");
                    (0..1000).all(|_| {
                        rules
                            .filter_tags(&service, "op", tags(&[("token", "t"), ("id", "1")]))
                            .len()
                            == 1
                    })
                })
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }
    }
}
