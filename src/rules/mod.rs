//! Dynamic-Priority Rule Engine.
//!
//! An ordered list of rules, evaluated left-to-right against a
//! [`SystemSnapshot`]. Each matching rule contributes a [`PartialPlan`];
//! later matches overwrite earlier ones on key conflict. `predicate` and
//! `action` are plain closures, not a heap-allocated callback object crossing
//! a lock boundary.

pub mod defaults;

use crate::types::{PartialPlan, SystemSnapshot};

/// `{predicate: Snapshot → bool, action: Snapshot → PartialPlan, label}`.
pub struct Rule {
    pub label: &'static str,
    predicate: Box<dyn Fn(&SystemSnapshot) -> bool + Send + Sync>,
    action: Box<dyn Fn(&SystemSnapshot) -> PartialPlan + Send + Sync>,
}

impl Rule {
    pub fn new(
        label: &'static str,
        predicate: impl Fn(&SystemSnapshot) -> bool + Send + Sync + 'static,
        action: impl Fn(&SystemSnapshot) -> PartialPlan + Send + Sync + 'static,
    ) -> Self {
        Rule { label, predicate: Box::new(predicate), action: Box::new(action) }
    }
}

/// Holds an ordered list of rules and evaluates them deterministically.
pub struct RuleEngine {
    rules: Vec<Rule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>) -> Self {
        RuleEngine { rules }
    }

    pub fn with_default_rules() -> Self {
        RuleEngine::new(defaults::default_rules())
    }

    /// Evaluates every rule in declaration order; later matches overwrite
    /// earlier ones on key conflict. The result is a pure function of the
    /// snapshot.
    pub fn evaluate(&self, snapshot: &SystemSnapshot) -> PartialPlan {
        let mut plan = PartialPlan::default();
        for rule in &self.rules {
            if (rule.predicate)(snapshot) {
                tracing::debug!(rule = rule.label, "rule matched");
                plan = plan.merge((rule.action)(snapshot));
            }
        }
        plan
    }

    pub fn rule_labels(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.label).collect()
    }
}
