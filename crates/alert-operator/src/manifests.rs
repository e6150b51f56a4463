//! Declared resources read from a directory of JSON manifests.
//!
//! Each `*.json` file holds one document tagged by `kind`:
//!
//! ```json
//! {"kind": "AlertPolicy", "metadata": {"name": "cpu"}, "spec": {"conditions": []}}
//! ```
//!
//! The directory is the source of truth: a resource whose manifest
//! disappears is deleted from the store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use alert_model::{AlertPolicy, NotificationChannel, Resource, ResourceId, ResourceKind};
use alert_reconciler::{MemoryStore, StoreError};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{OperatorError, Result};

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    /// An alert policy.
    AlertPolicy(AlertPolicy),
    /// A notification channel.
    NotificationChannel(NotificationChannel),
}

impl Manifest {
    /// Kind of the declared resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::AlertPolicy(_) => ResourceKind::AlertPolicy,
            Self::NotificationChannel(_) => ResourceKind::NotificationChannel,
        }
    }

    /// Identity of the declared resource.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        match self {
            Self::AlertPolicy(p) => p.id(),
            Self::NotificationChannel(c) => c.id(),
        }
    }

    /// Validates the declared resource.
    ///
    /// # Errors
    ///
    /// Returns the model's validation error.
    pub fn validate(&self) -> alert_model::Result<()> {
        match self {
            Self::AlertPolicy(p) => p.validate(),
            Self::NotificationChannel(c) => c.validate(),
        }
    }

    fn apply(self, store: &MemoryStore) -> std::result::Result<(), StoreError> {
        match self {
            Self::AlertPolicy(p) => store.apply(p).map(drop),
            Self::NotificationChannel(c) => store.apply(c).map(drop),
        }
    }
}

/// Parses one manifest document.
///
/// # Errors
///
/// Returns `OperatorError::Manifest` naming `path` if the JSON is invalid.
pub fn parse(path: &Path, content: &str) -> Result<Manifest> {
    serde_json::from_str(content).map_err(|e| OperatorError::manifest(path, e.to_string()))
}

/// Lists the `*.json` files directly inside `dir`, sorted by name.
///
/// # Errors
///
/// Returns an IO error if the directory cannot be read.
pub fn manifest_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Manifests read from a directory.
#[derive(Debug, Default)]
pub struct LoadedManifests {
    /// Parsed manifests with their source files.
    pub manifests: Vec<(PathBuf, Manifest)>,
    /// Files that could not be used.
    pub errors: Vec<OperatorError>,
}

/// Reads and parses every manifest in `dir`.
///
/// Unreadable or unparseable files and duplicate identities are collected
/// as errors; the rest are returned.
///
/// # Errors
///
/// Returns an IO error if the directory itself cannot be read.
pub fn load_dir(dir: &Path) -> Result<LoadedManifests> {
    let mut loaded = LoadedManifests::default();
    let mut seen: BTreeMap<(ResourceKind, ResourceId), PathBuf> = BTreeMap::new();

    for path in manifest_paths(dir)? {
        let manifest = match std::fs::read_to_string(&path) {
            Ok(content) => parse(&path, &content),
            Err(e) => Err(OperatorError::manifest(&path, e.to_string())),
        };
        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(e) => {
                loaded.errors.push(e);
                continue;
            }
        };

        let key = (manifest.kind(), manifest.id());
        if let Some(first) = seen.get(&key) {
            loaded.errors.push(OperatorError::manifest(
                &path,
                format!("{} {} is already declared in '{}'", key.0, key.1, first.display()),
            ));
            continue;
        }
        seen.insert(key, path.clone());
        loaded.manifests.push((path, manifest));
    }

    Ok(loaded)
}

/// Outcome of validating a manifest directory.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Resources that parsed and validated.
    pub valid: Vec<(ResourceKind, ResourceId)>,
    /// Everything that did not.
    pub invalid: Vec<OperatorError>,
}

impl ValidationReport {
    /// Returns true if no manifest was rejected.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Parses and validates every manifest in `dir` without applying anything.
///
/// # Errors
///
/// Returns an IO error if the directory itself cannot be read.
pub fn validate_dir(dir: &Path) -> Result<ValidationReport> {
    let loaded = load_dir(dir)?;
    let mut report = ValidationReport {
        invalid: loaded.errors,
        ..ValidationReport::default()
    };
    for (path, manifest) in loaded.manifests {
        match manifest.validate() {
            Ok(()) => report.valid.push((manifest.kind(), manifest.id())),
            Err(e) => report.invalid.push(OperatorError::manifest(&path, e.to_string())),
        }
    }
    Ok(report)
}

/// Counts from one [`ManifestWatcher::sync`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Manifests applied to the store.
    pub applied: usize,
    /// Resources whose manifest disappeared.
    pub deleted: usize,
    /// Manifests that could not be used.
    pub errors: usize,
}

/// Mirrors a manifest directory into the store.
#[derive(Debug)]
pub struct ManifestWatcher {
    dir: PathBuf,
    store: MemoryStore,
    declared: BTreeSet<(ResourceKind, ResourceId)>,
}

impl ManifestWatcher {
    /// Creates a watcher. Everything already in the store counts as
    /// declared, so manifests removed while the operator was down are
    /// deleted on the first pass.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, store: MemoryStore) -> Self {
        let declared = store
            .ids::<AlertPolicy>()
            .into_iter()
            .map(|id| (ResourceKind::AlertPolicy, id))
            .chain(
                store
                    .ids::<NotificationChannel>()
                    .into_iter()
                    .map(|id| (ResourceKind::NotificationChannel, id)),
            )
            .collect();
        Self {
            dir: dir.into(),
            store,
            declared,
        }
    }

    /// Directory being mirrored.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Applies every manifest and deletes resources whose manifest is gone.
    ///
    /// Deletions are skipped for a pass in which any file failed to load,
    /// since its resource cannot be told apart from a removed one.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be read.
    pub fn sync(&mut self) -> Result<SyncReport> {
        let loaded = load_dir(&self.dir)?;
        let mut report = SyncReport {
            errors: loaded.errors.len(),
            ..SyncReport::default()
        };
        for error in &loaded.errors {
            warn!(error = %error, "skipping manifest");
        }

        let mut present = BTreeSet::new();
        for (path, manifest) in loaded.manifests {
            let key = (manifest.kind(), manifest.id());
            match manifest.apply(&self.store) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to apply manifest");
                    report.errors += 1;
                }
            }
            present.insert(key);
        }

        if report.errors > 0 {
            if self.declared.iter().any(|key| !present.contains(key)) {
                warn!("manifest errors present; deferring deletions");
            }
            self.declared.extend(present);
            return Ok(report);
        }

        for (kind, id) in self.declared.difference(&present) {
            let result = match kind {
                ResourceKind::AlertPolicy => self.store.request_delete::<AlertPolicy>(id),
                ResourceKind::NotificationChannel => {
                    self.store.request_delete::<NotificationChannel>(id)
                }
            };
            match result {
                Ok(()) => {
                    info!(kind = %kind, resource = %id, "manifest removed; deleting resource");
                    report.deleted += 1;
                }
                Err(e) if e.is_not_found() => debug!(resource = %id, "already gone"),
                Err(e) => warn!(resource = %id, error = %e, "failed to request deletion"),
            }
        }
        self.declared = present;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const CPU_POLICY: &str = r#"{
        "kind": "AlertPolicy",
        "metadata": {"name": "cpu", "namespace": "monitoring", "labels": {"team": "infra"}},
        "spec": {"conditions": [{
            "kind": "apm",
            "name": "cpu high",
            "type": "apm_app_metric",
            "metric": "cpu",
            "entities": [42],
            "criticalThreshold": {"operator": "above", "value": 80, "durationMinutes": 5}
        }]}
    }"#;

    const TEAM_CHANNEL: &str = r##"{
        "kind": "NotificationChannel",
        "metadata": {"name": "team", "namespace": "monitoring"},
        "spec": {
            "config": {"type": "slack", "url": "https://hooks.slack.com/services/T/B/X", "channel": "#alerts"},
            "policySelector": {"matchLabels": {"team": "infra"}}
        }
    }"##;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn parses_both_kinds() {
            let policy = parse(Path::new("cpu.json"), CPU_POLICY).unwrap();
            assert_eq!(policy.kind(), ResourceKind::AlertPolicy);
            assert_eq!(policy.id(), ResourceId::new("monitoring", "cpu"));
            assert!(policy.validate().is_ok());

            let channel = parse(Path::new("team.json"), TEAM_CHANNEL).unwrap();
            assert_eq!(channel.kind(), ResourceKind::NotificationChannel);
            assert!(channel.validate().is_ok());
        }

        #[test]
        fn unknown_kind_names_file() {
            let err = parse(Path::new("/m/x.json"), r#"{"kind": "Dashboard", "metadata": {"name": "x"}}"#)
                .unwrap_err();
            assert!(err.to_string().contains("/m/x.json"));
        }
    }

    mod load_tests {
        use super::*;

        #[test]
        fn only_json_files_are_read() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "cpu.json", CPU_POLICY);
            write(dir.path(), "README.md", "not a manifest");
            fs::create_dir(dir.path().join("nested.json")).unwrap();

            let loaded = load_dir(dir.path()).unwrap();
            assert_eq!(loaded.manifests.len(), 1);
            assert!(loaded.errors.is_empty());
        }

        #[test]
        fn duplicates_are_errors() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "a.json", CPU_POLICY);
            write(dir.path(), "b.json", CPU_POLICY);

            let loaded = load_dir(dir.path()).unwrap();
            assert_eq!(loaded.manifests.len(), 1);
            assert_eq!(loaded.errors.len(), 1);
            assert!(loaded.errors[0].to_string().contains("already declared"));
        }

        #[test]
        fn validation_report_lists_invalid() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "cpu.json", CPU_POLICY);
            write(
                dir.path(),
                "bad.json",
                r#"{"kind": "NotificationChannel", "metadata": {"name": "mail"},
                    "spec": {"config": {"type": "email", "recipients": []}}}"#,
            );
            write(dir.path(), "broken.json", "{");

            let report = validate_dir(dir.path()).unwrap();
            assert!(!report.is_ok());
            assert_eq!(report.valid.len(), 1);
            assert_eq!(report.invalid.len(), 2);
        }

        #[test]
        fn missing_dir_is_io_error() {
            assert!(matches!(
                load_dir(Path::new("/definitely/not/here")),
                Err(OperatorError::Io(_))
            ));
        }
    }

    mod watcher_tests {
        use super::*;

        #[test]
        fn applies_then_deletes_removed() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "cpu.json", CPU_POLICY);
            write(dir.path(), "team.json", TEAM_CHANNEL);
            let store = MemoryStore::new();
            let mut watcher = ManifestWatcher::new(dir.path(), store.clone());

            let report = watcher.sync().unwrap();
            assert_eq!(report.applied, 2);
            assert_eq!(store.ids::<AlertPolicy>().len(), 1);

            fs::remove_file(dir.path().join("cpu.json")).unwrap();
            let report = watcher.sync().unwrap();
            assert_eq!(report.deleted, 1);
            assert!(store.ids::<AlertPolicy>().is_empty());
            assert_eq!(store.ids::<NotificationChannel>().len(), 1);
        }

        #[test]
        fn unchanged_directory_is_quiet() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "cpu.json", CPU_POLICY);
            let store = MemoryStore::new();
            let mut watcher = ManifestWatcher::new(dir.path(), store.clone());
            watcher.sync().unwrap();

            let mut events = store.subscribe();
            let report = watcher.sync().unwrap();
            assert_eq!(report.deleted, 0);
            assert!(events.try_recv().is_err());
        }

        #[test]
        fn broken_file_defers_deletions() {
            let dir = tempfile::tempdir().unwrap();
            write(dir.path(), "cpu.json", CPU_POLICY);
            let store = MemoryStore::new();
            let mut watcher = ManifestWatcher::new(dir.path(), store.clone());
            watcher.sync().unwrap();

            write(dir.path(), "cpu.json", "{ truncated");
            let report = watcher.sync().unwrap();
            assert_eq!(report.errors, 1);
            assert_eq!(report.deleted, 0);
            assert_eq!(store.ids::<AlertPolicy>().len(), 1);
        }

        #[test]
        fn resources_from_previous_run_are_pruned() {
            let dir = tempfile::tempdir().unwrap();
            let store = MemoryStore::new();
            store
                .apply(AlertPolicy::new(alert_model::ObjectMeta::new("monitoring", "stale")))
                .unwrap();

            let mut watcher = ManifestWatcher::new(dir.path(), store.clone());
            let report = watcher.sync().unwrap();
            assert_eq!(report.deleted, 1);
            assert!(store.ids::<AlertPolicy>().is_empty());
        }
    }
}
