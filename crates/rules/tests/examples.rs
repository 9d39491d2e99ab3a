//! Integration tests that verify every example YAML rule in
//! `data/rules/examples/` loads and passes validation.

use std::path::PathBuf;
use std::sync::Arc;

use attend_rules::loader::{LoadStatus, YamlRuleLoader};
use attend_rules::schema::{ActionConfig, AlertLevel, ConditionConfig};
use attend_rules::RuleExecutionService;

/// Integration tests run from the crate directory, so go up two levels.
fn examples_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/rules/examples")
}

fn loaded_ids(loader: &YamlRuleLoader) -> Vec<u64> {
    let results = loader.load_all().expect("scan examples");
    let mut ids: Vec<u64> = results
        .iter()
        .map(|r| match &r.status {
            LoadStatus::Loaded { rule_id } => *rule_id,
            other => panic!("{} did not load: {other:?}", r.path.display()),
        })
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn every_example_file_loads() {
    let loader = YamlRuleLoader::new(examples_dir());
    assert_eq!(loaded_ids(&loader), vec![101, 102, 103, 104, 105, 106]);
}

#[test]
fn late_arrival_example_decodes() {
    let loader = YamlRuleLoader::new(examples_dir());
    let rule = loader.load_file(&examples_dir().join("late-arrival.yml")).unwrap();

    assert_eq!(rule.category, "punch");
    assert_eq!(rule.policy.as_ref().unwrap().late_grace_minutes, 5);
    assert_eq!(rule.decode_condition().unwrap(), ConditionConfig::Late);
    match rule.decode_action().unwrap() {
        Some(ActionConfig::Sequence { actions }) => {
            assert_eq!(actions.len(), 2);
            assert_eq!(actions[0], ActionConfig::Classify);
            assert!(matches!(actions[1], ActionConfig::Alert { level: AlertLevel::Warning, .. }));
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn device_status_example_has_no_condition() {
    let loader = YamlRuleLoader::new(examples_dir());
    let rule = loader.load_file(&examples_dir().join("device-status.yml")).unwrap();

    assert_eq!(rule.decode_condition().unwrap(), ConditionConfig::Always);
    match rule.decode_action().unwrap() {
        Some(ActionConfig::DeviceStatusCheck { normal_statuses, level, .. }) => {
            assert_eq!(normal_statuses, vec!["ONLINE".to_string(), "IDLE".to_string()]);
            assert_eq!(level, AlertLevel::Critical);
        }
        other => panic!("unexpected action {other:?}"),
    }
}

#[test]
fn holiday_example_is_scoped_to_departments() {
    let loader = YamlRuleLoader::new(examples_dir());
    let rule = loader.load_file(&examples_dir().join("holiday-punch.yml")).unwrap();
    assert_eq!(rule.scope.departments, vec![10, 20]);
    assert!(rule.fingerprint_inputs().unwrap().contains("department_id"));
}

#[tokio::test]
async fn every_example_passes_validation() {
    let loader = YamlRuleLoader::new(examples_dir());
    let ids = loaded_ids(&loader);
    let service = RuleExecutionService::builder(Arc::new(loader)).build().unwrap();

    for id in ids {
        let result = service.validator().validate_rule(id).await;
        assert!(result.valid, "rule {id}: {:?}", result.error_message());
        assert!(result.warnings.is_empty(), "rule {id}: {:?}", result.warnings);
    }
}
