use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::obfuscation::errors::RuleBuildError;
use crate::obfuscation::rule::{RuleSet, TagMatchRuleConfig};

/// Shared, atomically replaceable [`RuleSet`].
///
/// Readers always observe a complete rule set. A reload builds the new set
/// first and only swaps it in on success.
#[derive(Clone)]
pub struct RuleSetHandle {
    current: Arc<ArcSwap<RuleSet>>,
}

impl RuleSetHandle {
    #[must_use]
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(rules)),
        }
    }

    pub fn build(configs: &[TagMatchRuleConfig]) -> Result<Self, RuleBuildError> {
        Ok(Self::new(RuleSet::build(configs)?))
    }

    /// Snapshot of the active rule set.
    #[must_use]
    pub fn load(&self) -> Arc<RuleSet> {
        self.current.load_full()
    }

    /// Rebuilds from `configs` and swaps the result in. On error the active
    /// rule set is left untouched.
    pub fn reload(&self, configs: &[TagMatchRuleConfig]) -> Result<usize, RuleBuildError> {
        let rules = RuleSet::build(configs)?;
        let len = rules.len();
        self.store(rules);
        Ok(len)
    }

    /// Swaps in an already built rule set.
    pub fn store(&self, rules: RuleSet) {
        self.current.store(Arc::new(rules));
    }
}

impl Default for RuleSetHandle {
    fn default() -> Self {
        Self::new(RuleSet::default())
    }
}

impl fmt::Debug for RuleSetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSetHandle")
            .field("rules", &self.current.load().len())
            .finish()
    }
}
