//! [`YamlRuleLoader`]: filesystem-backed rule store with optional hot-reload.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use attend_core::config::StoreConfig;
use attend_core::RuleId;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::schema::RuleDefinition;

use super::error::{LoadResult, LoadStatus, LoaderError, Result};
use super::watcher::handle_fs_event;
use super::{ordered_ids, RuleChange, RuleLoader};

/// Loaded definitions plus the file each one came from.
#[derive(Debug, Default)]
pub(super) struct RuleIndex {
    rules: RwLock<HashMap<RuleId, RuleDefinition>>,
    paths: RwLock<HashMap<PathBuf, RuleId>>,
}

impl RuleIndex {
    /// Record `rule` as loaded from `path`. Returns the id the path held
    /// before, when a file was edited to carry a different id.
    pub(super) fn insert(&self, path: PathBuf, rule: RuleDefinition) -> Option<RuleId> {
        let id = rule.id;
        let previous = self.paths.write().expect("paths lock poisoned").insert(path, id);
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let displaced = previous.filter(|old| *old != id);
        if let Some(old) = displaced {
            rules.remove(&old);
        }
        rules.insert(id, rule);
        displaced
    }

    pub(super) fn remove_path(&self, path: &Path) -> Option<RuleId> {
        let id = self.paths.write().expect("paths lock poisoned").remove(path)?;
        self.rules.write().expect("rules lock poisoned").remove(&id);
        Some(id)
    }

    /// File a rule id is currently loaded from.
    pub(super) fn path_of(&self, id: RuleId) -> Option<PathBuf> {
        self.paths
            .read()
            .expect("paths lock poisoned")
            .iter()
            .find(|(_, owner)| **owner == id)
            .map(|(path, _)| path.clone())
    }

    fn get(&self, id: RuleId) -> Option<RuleDefinition> {
        self.rules.read().expect("rules lock poisoned").get(&id).cloned()
    }
}

/// Parse one rule file's contents and check the fields the loader relies on.
pub(super) fn parse_rule(contents: &str) -> Result<RuleDefinition> {
    let rule: RuleDefinition = serde_yaml::from_str(contents)?;
    if rule.name.trim().is_empty() {
        return Err(LoaderError::Validation(format!("rule {} has an empty name", rule.id)));
    }
    if rule.category.trim().is_empty() {
        return Err(LoaderError::Validation(format!("rule {} has an empty category", rule.id)));
    }
    Ok(rule)
}

pub(super) fn is_rule_file(path: &Path) -> bool {
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false);
    let is_dotfile = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false);
    is_yaml && !is_dotfile
}

/// Filesystem-backed rule store.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, one rule
/// per file, and keeps them in memory keyed by rule id.
pub struct YamlRuleLoader {
    rules_dir: PathBuf,
    pub(super) index: Arc<RuleIndex>,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl YamlRuleLoader {
    /// Create a loader for the given directory, creating it if needed.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        let rules_dir = fs::canonicalize(&rules_dir).unwrap_or(rules_dir);
        Self { rules_dir, index: Arc::new(RuleIndex::default()), _watcher: None }
    }

    /// Loader for the configured `rules_dir`.
    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.rules_dir.clone())
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse errors and duplicate
    /// ids are reported per file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths: Vec<PathBuf> = entries.map(|e| e.map(|e| e.path())).collect::<std::io::Result<_>>()?;
        paths.sort();

        for path in paths {
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with('.'))
                .unwrap_or(false);

            if path.is_dir() {
                if !hidden {
                    self.scan_dir_recursive(&path, results)?;
                }
                continue;
            }

            if !is_rule_file(&path) {
                let reason = if hidden { "dotfile" } else { "not a YAML file" };
                results.push(LoadResult { path, status: LoadStatus::Skipped { reason: reason.to_string() } });
                continue;
            }

            let status = match self.load_file(&path) {
                Ok(rule) => match self.index.path_of(rule.id).filter(|owner| *owner != path) {
                    Some(owner) => {
                        let error = format!("duplicate rule id {} (already loaded from {})", rule.id, owner.display());
                        warn!(path = %path.display(), %error, "skipping rule file");
                        LoadStatus::Failed { error }
                    }
                    None => {
                        let rule_id = rule.id;
                        info!(rule_id, category = %rule.category, path = %path.display(), "loaded rule");
                        self.index.insert(path.clone(), rule);
                        LoadStatus::Loaded { rule_id }
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    LoadStatus::Failed { error: e.to_string() }
                }
            };
            results.push(LoadResult { path, status });
        }

        Ok(())
    }

    /// Parse a single rule file without registering it.
    pub fn load_file(&self, path: &Path) -> Result<RuleDefinition> {
        parse_rule(&fs::read_to_string(path)?)
    }

    /// Start a filesystem watcher and return the stream of changes it applies.
    ///
    /// Created or modified files are re-parsed and upserted; deleted files
    /// drop their rule. Parse errors keep the previous version.
    pub fn watch(&mut self) -> Result<mpsc::UnboundedReceiver<RuleChange>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let index = Arc::clone(&self.index);

        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    for change in handle_fs_event(&event, &index) {
                        // Receiver dropped means nobody is listening; the index is still updated.
                        let _ = tx.send(change);
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;
        let _ = watcher.configure(notify::Config::default().with_poll_interval(Duration::from_millis(500)));

        info!(path = %self.rules_dir.display(), "watching rules directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(rx)
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    pub fn get(&self, rule_id: RuleId) -> Option<RuleDefinition> {
        self.index.get(rule_id)
    }

    pub fn len(&self) -> usize {
        self.index.rules.read().expect("rules lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically write a rule to its YAML file (`rule-{id}.yml` for new rules).
    ///
    /// Writes to a `.tmp` file first, then renames over the final path.
    pub fn write_rule(&self, rule: &RuleDefinition) -> Result<PathBuf> {
        let final_path = self
            .index
            .path_of(rule.id)
            .unwrap_or_else(|| self.rules_dir.join(format!("rule-{}.yml", rule.id)));
        let tmp_path = self.rules_dir.join(format!(".rule-{}.tmp", rule.id));

        let yaml = serde_yaml::to_string(rule)?;
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;

        info!(rule_id = rule.id, path = %final_path.display(), "wrote rule file");
        self.index.insert(final_path.clone(), rule.clone());
        Ok(final_path)
    }

    /// Delete a rule's file and its in-memory entry.
    pub fn delete_rule(&self, rule_id: RuleId) -> Result<()> {
        let path = self
            .index
            .path_of(rule_id)
            .ok_or_else(|| LoaderError::Validation(format!("no rule file found for id {rule_id}")))?;
        fs::remove_file(&path)?;
        self.index.remove_path(&path);
        info!(rule_id, "deleted rule");
        Ok(())
    }
}

#[async_trait]
impl RuleLoader for YamlRuleLoader {
    async fn load_rule_config(&self, rule_id: RuleId) -> Result<Option<RuleDefinition>> {
        Ok(self.index.get(rule_id))
    }

    async fn applicable_rule_ids(&self, category: &str) -> Result<Vec<RuleId>> {
        let rules = self.index.rules.read().expect("rules lock poisoned");
        Ok(ordered_ids(rules.values(), Some(category)))
    }

    async fn active_rule_ids(&self) -> Result<Vec<RuleId>> {
        let rules = self.index.rules.read().expect("rules lock poisoned");
        Ok(ordered_ids(rules.values(), None))
    }
}
