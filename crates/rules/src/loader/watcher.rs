//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::yaml::{is_rule_file, parse_rule, RuleIndex};
use super::{LoaderError, RuleChange};

/// Apply one watcher event to the index and report what changed.
pub(super) fn handle_fs_event(event: &Event, index: &RuleIndex) -> Vec<RuleChange> {
    let mut changes = Vec::new();

    for path in &event.paths {
        if !is_rule_file(path) {
            continue;
        }

        match &event.kind {
            EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any) => {
                if !path.exists() {
                    // Rename away from this path.
                    if let Some(id) = index.remove_path(path) {
                        changes.push(RuleChange::Removed(id));
                    }
                    continue;
                }
                let parsed = fs::read_to_string(path).map_err(LoaderError::from).and_then(|c| parse_rule(&c));
                match parsed {
                    Ok(rule) => {
                        let rule_id = rule.id;
                        if index.path_of(rule_id).is_some_and(|owner| owner != *path) {
                            warn!(rule_id, path = %path.display(), "duplicate rule id during hot-reload, ignoring file");
                            continue;
                        }
                        if let Some(old) = index.insert(path.clone(), rule) {
                            changes.push(RuleChange::Removed(old));
                        }
                        info!(rule_id, path = %path.display(), "hot-reloaded rule");
                        changes.push(RuleChange::Upserted(rule_id));
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to parse rule during hot-reload, keeping previous version"
                        );
                    }
                }
            }
            EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
                if let Some(rule_id) = index.remove_path(path) {
                    info!(rule_id, path = %path.display(), "removed rule after file deletion");
                    changes.push(RuleChange::Removed(rule_id));
                }
            }
            _ => {}
        }
    }

    changes
}
