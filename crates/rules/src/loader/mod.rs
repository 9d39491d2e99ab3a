//! Rule stores the engine loads definitions from.
//!
//! [`RuleLoader`] is the seam to whatever persistence the host uses.
//! [`YamlRuleLoader`] reads a directory of YAML files and hot-reloads it
//! through a `notify` watcher; [`InMemoryRuleLoader`] holds rules in a map.

mod error;
mod memory;
mod watcher;
mod yaml;


use async_trait::async_trait;
use attend_core::RuleId;

use crate::schema::RuleDefinition;

pub use self::error::{LoadResult, LoadStatus, LoaderError, Result};
pub use self::memory::InMemoryRuleLoader;
pub use self::yaml::YamlRuleLoader;

/// Source of rule definitions.
///
/// Id listings return enabled rules only, ordered by ascending priority
/// and then id.
#[async_trait]
pub trait RuleLoader: Send + Sync {
    /// Current definition of one rule; `Ok(None)` when it does not exist.
    async fn load_rule_config(&self, rule_id: RuleId) -> Result<Option<RuleDefinition>>;

    /// Enabled rules of one category.
    async fn applicable_rule_ids(&self, category: &str) -> Result<Vec<RuleId>>;

    /// Every enabled rule.
    async fn active_rule_ids(&self) -> Result<Vec<RuleId>>;
}

/// A change observed in a watched rule store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleChange {
    Upserted(RuleId),
    Removed(RuleId),
}

impl RuleChange {
    pub fn rule_id(&self) -> RuleId {
        match self {
            Self::Upserted(id) | Self::Removed(id) => *id,
        }
    }
}

/// Enabled rule ids, optionally limited to one category, in evaluation order.
pub(crate) fn ordered_ids<'a>(
    rules: impl Iterator<Item = &'a RuleDefinition>,
    category: Option<&str>,
) -> Vec<RuleId> {
    let mut selected: Vec<(i32, RuleId)> = rules
        .filter(|r| r.enabled)
        .filter(|r| category.map_or(true, |c| r.category == c))
        .map(|r| (r.priority, r.id))
        .collect();
    selected.sort_unstable();
    selected.into_iter().map(|(_, id)| id).collect()
}
