//! Durable per-operation progress documents
//!
//! Each operation is stored as `<storage_dir>/<operation_id>.<json|yaml>`.
//! Every write goes to its own temp file in the same directory and is renamed
//! into place, so concurrent saves of one operation never share a temp file.
//! Loading accepts either format regardless of the configured one.

use crate::error::{ProgressError, ProgressResult};
use crate::models::MigrationProgress;
use kubeshift_config::{PersistFormat, ProgressConfig};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::Builder;
use tracing::debug;

const KNOWN_EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Reads and writes progress documents under one directory
#[derive(Debug, Clone)]
pub struct ProgressStore {
    root: PathBuf,
    format: PersistFormat,
}

impl ProgressStore {
    /// Store rooted at `root`, writing `format`
    pub fn new(root: impl Into<PathBuf>, format: PersistFormat) -> Self {
        Self {
            root: root.into(),
            format,
        }
    }

    /// Store configured from the `[progress]` section
    pub fn from_config(config: &ProgressConfig) -> ProgressResult<Self> {
        Ok(Self::new(config.resolved_storage_dir()?, config.format))
    }

    /// Storage directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Format used for writes
    pub fn format(&self) -> PersistFormat {
        self.format
    }

    /// Path the operation is written to
    pub fn path_for(&self, operation_id: &str) -> ProgressResult<PathBuf> {
        validate_operation_id(operation_id)?;
        Ok(self
            .root
            .join(format!("{}.{}", operation_id, self.format.extension())))
    }

    /// Existing document for the operation in any known format
    fn existing_path(&self, operation_id: &str) -> ProgressResult<Option<PathBuf>> {
        let preferred = self.path_for(operation_id)?;
        if preferred.is_file() {
            return Ok(Some(preferred));
        }
        Ok(KNOWN_EXTENSIONS
            .iter()
            .map(|ext| self.root.join(format!("{}.{}", operation_id, ext)))
            .find(|path| path.is_file()))
    }

    /// Write the document atomically and return its path
    pub fn save(&self, progress: &MigrationProgress) -> ProgressResult<PathBuf> {
        let path = self.path_for(&progress.operation_id)?;
        fs::create_dir_all(&self.root)?;

        let content = match self.format {
            PersistFormat::Json => serde_json::to_string_pretty(progress)?,
            PersistFormat::Yaml => serde_yaml::to_string(progress)?,
        };

        // dropped (and removed) on any error before persist
        let mut temp = Builder::new()
            .prefix(&format!(".{}.", progress.operation_id))
            .suffix(".tmp")
            .tempfile_in(&self.root)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|err| err.error)?;

        // a document in the other format would shadow nothing but confuse listings
        for ext in KNOWN_EXTENSIONS {
            if ext != self.format.extension() {
                let stale = self.root.join(format!("{}.{}", progress.operation_id, ext));
                if stale.is_file() {
                    let _ = fs::remove_file(stale);
                }
            }
        }

        debug!(operation_id = %progress.operation_id, path = %path.display(), "Persisted progress");
        Ok(path)
    }

    /// Read and validate the document for an operation
    pub fn load(&self, operation_id: &str) -> ProgressResult<MigrationProgress> {
        let path = self
            .existing_path(operation_id)?
            .ok_or_else(|| ProgressError::PersistedStateNotFound(operation_id.to_string()))?;
        let content = fs::read_to_string(&path)?;

        let progress: MigrationProgress = match serde_json::from_str(&content) {
            Ok(progress) => progress,
            Err(json_err) => match serde_yaml::from_str(&content) {
                Ok(progress) => progress,
                Err(yaml_err) => {
                    return Err(if path.extension().is_some_and(|ext| ext == "json") {
                        ProgressError::Serialization(json_err)
                    } else {
                        ProgressError::Yaml(yaml_err)
                    })
                }
            },
        };

        if progress.operation_id != operation_id {
            return Err(ProgressError::Validation(format!(
                "document at {} belongs to operation {}",
                path.display(),
                progress.operation_id
            )));
        }
        progress.validate().map_err(ProgressError::Validation)?;

        debug!(operation_id = %operation_id, path = %path.display(), "Loaded persisted progress");
        Ok(progress)
    }

    /// Whether a document exists for the operation
    pub fn exists(&self, operation_id: &str) -> bool {
        matches!(self.existing_path(operation_id), Ok(Some(_)))
    }

    /// Delete every document for the operation; false if there was none
    pub fn delete(&self, operation_id: &str) -> ProgressResult<bool> {
        validate_operation_id(operation_id)?;
        let mut deleted = false;
        for ext in KNOWN_EXTENSIONS {
            let path = self.root.join(format!("{}.{}", operation_id, ext));
            if path.is_file() {
                fs::remove_file(path)?;
                deleted = true;
            }
        }
        Ok(deleted)
    }

    /// Ids of every persisted operation, sorted
    pub fn list(&self) -> ProgressResult<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let known = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| KNOWN_EXTENSIONS.contains(&ext));
            let stem = path.file_stem().and_then(|stem| stem.to_str());
            if let (true, Some(stem)) = (known, stem) {
                if !stem.starts_with('.') {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

/// Reject ids that are empty or could address a path outside the storage directory
pub fn validate_operation_id(operation_id: &str) -> ProgressResult<()> {
    let invalid = operation_id.trim().is_empty()
        || operation_id.starts_with('.')
        || operation_id.contains("..")
        || operation_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control());
    if invalid {
        return Err(ProgressError::InvalidOperationId(operation_id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RepositoryProgress;
    use chrono::Utc;
    use kubeshift_domain::{LogEntry, MigrationStatus, MigrationStep};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample(operation_id: &str) -> MigrationProgress {
        let mut repo = RepositoryProgress::new("https://github.com/acme/api.git");
        repo.completed_steps.insert(MigrationStep::Cloning);
        repo.current_step = Some(MigrationStep::Analyzing);
        repo.logs.push(LogEntry::info("Starting step: Cloning repository"));

        let mut repositories = BTreeMap::new();
        repositories.insert(repo.repository_id.clone(), repo);

        MigrationProgress {
            operation_id: operation_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: MigrationStatus::Queued,
            repositories,
            logs: vec![LogEntry::info("Operation started"), LogEntry::error("One repository failed")],
            total_repositories: 1,
            completed_repositories: 0,
            failed_repositories: 0,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        let progress = sample("op-json");

        let path = store.save(&progress).unwrap();
        assert_eq!(path, dir.path().join("op-json.json"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(store.load("op-json").unwrap(), progress);
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Yaml);
        let progress = sample("op-yaml");

        store.save(&progress).unwrap();
        assert!(dir.path().join("op-yaml.yaml").exists());
        assert_eq!(store.load("op-yaml").unwrap(), progress);
    }

    #[test]
    fn test_load_detects_other_format() {
        let dir = TempDir::new().unwrap();
        ProgressStore::new(dir.path(), PersistFormat::Yaml)
            .save(&sample("op-1"))
            .unwrap();

        let json_store = ProgressStore::new(dir.path(), PersistFormat::Json);
        assert!(json_store.exists("op-1"));
        assert_eq!(json_store.load("op-1").unwrap().operation_id, "op-1");
    }

    #[test]
    fn test_format_switch_removes_stale_document() {
        let dir = TempDir::new().unwrap();
        ProgressStore::new(dir.path(), PersistFormat::Yaml)
            .save(&sample("op-1"))
            .unwrap();
        ProgressStore::new(dir.path(), PersistFormat::Json)
            .save(&sample("op-1"))
            .unwrap();

        assert!(!dir.path().join("op-1.yaml").exists());
        assert!(dir.path().join("op-1.json").exists());
    }

    #[test]
    fn test_concurrent_saves_of_one_operation() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);

        let mut progress = sample("op-busy");
        for i in 0..50 {
            let mut repo = RepositoryProgress::new(format!("https://github.com/acme/svc-{}.git", i));
            repo.logs.push(LogEntry::info("x".repeat(200)));
            progress.repositories.insert(repo.repository_id.clone(), repo);
        }
        progress.total_repositories = progress.repositories.len();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let (store, progress) = (&store, &progress);
                scope.spawn(move || {
                    for _ in 0..50 {
                        store.save(progress).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.load("op-busy").unwrap(), progress);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name != "op-busy.json")
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }

    #[test]
    fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        assert!(matches!(
            store.load("nope"),
            Err(ProgressError::PersistedStateNotFound(_))
        ));
        assert!(!store.delete("nope").unwrap());
    }

    #[test]
    fn test_corrupt_document() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        assert!(matches!(store.load("bad"), Err(ProgressError::Serialization(_))));
    }

    #[test]
    fn test_inconsistent_document_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        let mut progress = sample("op-1");
        progress.completed_repositories = 1;
        store.save(&progress).unwrap();

        assert!(matches!(store.load("op-1"), Err(ProgressError::Validation(_))));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        for id in ["", "  ", "../escape", "a/b", "a\\b", ".hidden", "c:evil"] {
            assert!(
                matches!(store.path_for(id), Err(ProgressError::InvalidOperationId(_))),
                "{id:?} should be rejected"
            );
        }
        assert!(store.path_for("migration-2024.05.01").is_ok());
    }

    #[test]
    fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path(), PersistFormat::Json);
        assert!(store.list().unwrap().is_empty());

        store.save(&sample("op-b")).unwrap();
        store.save(&sample("op-a")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["op-a", "op-b"]);
        assert!(store.delete("op-a").unwrap());
        assert_eq!(store.list().unwrap(), vec!["op-b"]);
    }

    #[test]
    fn test_list_missing_directory() {
        let dir = TempDir::new().unwrap();
        let store = ProgressStore::new(dir.path().join("absent"), PersistFormat::Json);
        assert!(store.list().unwrap().is_empty());
    }
}
