//! Deterministic ordering of matched rules.

use std::collections::HashMap;

use attend_core::RuleId;

use crate::schema::RuleEvaluationResult;

/// Stable ascending sort by rule priority; ties keep their input order.
pub fn sort_by_priority(mut results: Vec<RuleEvaluationResult>) -> Vec<RuleEvaluationResult> {
    results.sort_by_key(|r| r.rule_priority);
    results
}

/// Sort by priority, then mark every `SUCCESS` result that follows an
/// earlier `SUCCESS` in the same category as overridden by it.
///
/// Results without a category never override or get overridden.
pub fn resolve_overrides(results: Vec<RuleEvaluationResult>) -> Vec<RuleEvaluationResult> {
    let mut winners: HashMap<String, RuleId> = HashMap::new();
    let mut sorted = sort_by_priority(results);

    for result in sorted.iter_mut().filter(|r| r.is_success()) {
        let Some(category) = result.rule_category.clone() else {
            continue;
        };
        match winners.get(&category) {
            Some(&winner) => result.overridden_by = Some(winner),
            None => {
                winners.insert(category, result.rule_id);
            }
        }
    }
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rule_id: RuleId, priority: i32, category: &str, met: bool) -> RuleEvaluationResult {
        RuleEvaluationResult::evaluated(rule_id, met, None).with_rule_meta(category, priority)
    }

    #[test]
    fn sorts_ascending() {
        let sorted = sort_by_priority(vec![result(1, 5, "a", true), result(2, 1, "a", true), result(3, 3, "a", true)]);
        let priorities: Vec<i32> = sorted.iter().map(|r| r.rule_priority).collect();
        assert_eq!(priorities, vec![1, 3, 5]);
    }

    #[test]
    fn ties_keep_input_order() {
        let sorted = sort_by_priority(vec![result(9, 2, "a", true), result(4, 1, "a", true), result(7, 2, "a", true)]);
        let ids: Vec<RuleId> = sorted.iter().map(|r| r.rule_id).collect();
        assert_eq!(ids, vec![4, 9, 7]);
    }

    #[test]
    fn first_success_per_category_wins() {
        let resolved = resolve_overrides(vec![
            result(1, 20, "punch", true),
            result(2, 10, "punch", false),
            result(3, 15, "punch", true),
            result(4, 30, "overtime", true),
        ]);
        let ids: Vec<RuleId> = resolved.iter().map(|r| r.rule_id).collect();
        assert_eq!(ids, vec![2, 3, 1, 4]);

        assert_eq!(resolved[0].overridden_by, None);
        assert_eq!(resolved[1].overridden_by, None);
        assert_eq!(resolved[2].overridden_by, Some(3));
        assert_eq!(resolved[3].overridden_by, None);
    }
}
