use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use attend_core::RuleId;

use crate::schema::RuleDefinition;

use super::{ordered_ids, Result, RuleLoader};

/// Map-backed rule store for embedding services and tests.
#[derive(Debug, Default)]
pub struct InMemoryRuleLoader {
    rules: RwLock<HashMap<RuleId, RuleDefinition>>,
}

impl InMemoryRuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: impl IntoIterator<Item = RuleDefinition>) -> Self {
        let loader = Self::new();
        for rule in rules {
            loader.upsert(rule);
        }
        loader
    }

    /// Insert or replace a rule, returning the previous definition.
    pub fn upsert(&self, rule: RuleDefinition) -> Option<RuleDefinition> {
        self.rules.write().expect("rules lock poisoned").insert(rule.id, rule)
    }

    pub fn remove(&self, rule_id: RuleId) -> Option<RuleDefinition> {
        self.rules.write().expect("rules lock poisoned").remove(&rule_id)
    }

    /// Flip the enabled flag; returns false when the rule does not exist.
    pub fn set_enabled(&self, rule_id: RuleId, enabled: bool) -> bool {
        match self.rules.write().expect("rules lock poisoned").get_mut(&rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("rules lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RuleLoader for InMemoryRuleLoader {
    async fn load_rule_config(&self, rule_id: RuleId) -> Result<Option<RuleDefinition>> {
        Ok(self.rules.read().expect("rules lock poisoned").get(&rule_id).cloned())
    }

    async fn applicable_rule_ids(&self, category: &str) -> Result<Vec<RuleId>> {
        let rules = self.rules.read().expect("rules lock poisoned");
        Ok(ordered_ids(rules.values(), Some(category)))
    }

    async fn active_rule_ids(&self) -> Result<Vec<RuleId>> {
        let rules = self.rules.read().expect("rules lock poisoned");
        Ok(ordered_ids(rules.values(), None))
    }
}
