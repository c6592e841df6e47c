//! Snapshot Registry - Store validation runs for stable paging
//!
//! Each saved `ErrorData` gets an id and is never modified afterwards, so
//! metadata and page requests made against that id always agree.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::logs::log_warning;
use crate::error::{RegistryError, RegistryResult};
use crate::models::ErrorData;

/// Directory where snapshots are stored (relative to current dir)
pub const DEFAULT_REGISTRY_DIR: &str = ".flightcheck/snapshots";

/// Metadata of a stored snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Unique identifier
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Creation timestamp
    pub created_at: String,
    /// Number of violation instances
    pub total_errors: usize,
    /// Number of distinct rows in error
    pub error_rows: usize,
    /// Category names, in order
    pub categories: Vec<String>,
}

/// A loaded snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub info: SnapshotInfo,
    pub data: Arc<ErrorData>,
}

/// On-disk layout
#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    info: SnapshotInfo,
    data: ErrorData,
}

/// Registry for immutable error snapshots
pub struct SnapshotRegistry {
    /// Directory where snapshots are stored
    registry_dir: PathBuf,
    /// Loaded snapshots (id -> snapshot)
    snapshots: HashMap<String, Snapshot>,
}

impl SnapshotRegistry {
    /// Create a new registry, loading existing snapshots from disk
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_REGISTRY_DIR)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: PathBuf::from(dir.as_ref()),
            snapshots: HashMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Load all snapshots from the registry directory
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            match Self::read_file(&path) {
                Ok(file) => {
                    if let Err(e) = file.data.validate() {
                        log_warning(format!("Skipping snapshot {}: {}", path.display(), e));
                        continue;
                    }
                    self.snapshots.insert(
                        file.info.id.clone(),
                        Snapshot {
                            info: file.info,
                            data: Arc::new(file.data),
                        },
                    );
                }
                Err(e) => log_warning(format!("Skipping snapshot {}: {}", path.display(), e)),
            }
        }
    }

    fn read_file(path: &Path) -> RegistryResult<SnapshotFile> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Metadata of all snapshots, oldest first
    pub fn list(&self) -> Vec<&SnapshotInfo> {
        let mut infos: Vec<&SnapshotInfo> = self.snapshots.values().map(|s| &s.info).collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Get a snapshot by ID
    pub fn get(&self, id: &str) -> RegistryResult<&Snapshot> {
        self.snapshots
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Save a new snapshot and return its ID
    pub fn save(&mut self, data: ErrorData, name: &str) -> RegistryResult<String> {
        fs::create_dir_all(&self.registry_dir)?;

        let id = self.generate_id(name);
        let info = SnapshotInfo {
            id: id.clone(),
            name: name.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            total_errors: data.summary.total_errors,
            error_rows: data.summary.error_rows,
            categories: data.categories.iter().map(|c| c.name.clone()).collect(),
        };

        let file = SnapshotFile { info, data };
        let path = self.path_for(&id);
        fs::write(&path, serde_json::to_string(&file)?)?;

        self.snapshots.insert(
            id.clone(),
            Snapshot {
                info: file.info,
                data: Arc::new(file.data),
            },
        );
        Ok(id)
    }

    /// Delete a snapshot from the registry
    ///
    /// The file goes first; if it cannot be removed the snapshot stays listed.
    pub fn delete(&mut self, id: &str) -> RegistryResult<()> {
        if !self.snapshots.contains_key(id) {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.snapshots.remove(id);
        Ok(())
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.registry_dir.join(format!("{}.json", id))
    }

    /// Generate a unique ID from a name
    fn generate_id(&self, name: &str) -> String {
        let slug: String = name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        let slug = if slug.is_empty() { "snapshot".to_string() } else { slug };

        let timestamp = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", slug, timestamp, &suffix[..8])
    }
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::sample_data;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let id = {
            let mut registry = SnapshotRegistry::with_dir(dir.path());
            registry.save(sample_data(), "Summer Schedule 2024").unwrap()
        };
        assert!(id.starts_with("summer-schedule-2024-"));

        let registry = SnapshotRegistry::with_dir(dir.path());
        let snapshot = registry.get(&id).unwrap();
        assert_eq!(*snapshot.data, sample_data());
        assert_eq!(snapshot.info.total_errors, 6);
        assert_eq!(snapshot.info.categories, vec!["SEQUENCE_ERRORS", "DATA_ERRORS"]);
    }

    #[test]
    fn test_ids_unique_for_same_name() {
        let dir = tempdir().unwrap();
        let mut registry = SnapshotRegistry::with_dir(dir.path());
        let a = registry.save(sample_data(), "run").unwrap();
        let b = registry.save(sample_data(), "run").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn test_delete() {
        let dir = tempdir().unwrap();
        let mut registry = SnapshotRegistry::with_dir(dir.path());
        let id = registry.save(sample_data(), "run").unwrap();
        registry.delete(&id).unwrap();
        assert!(matches!(registry.get(&id), Err(RegistryError::NotFound(_))));
        assert!(matches!(registry.delete(&id), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_failed_delete_keeps_snapshot() {
        let dir = tempdir().unwrap();
        let mut registry = SnapshotRegistry::with_dir(dir.path());
        let id = registry.save(sample_data(), "run").unwrap();

        // a directory in place of the file makes remove_file fail
        let path = dir.path().join(format!("{}.json", id));
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        assert!(matches!(registry.delete(&id), Err(RegistryError::IoError(_))));
        assert!(registry.get(&id).is_ok());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_delete_tolerates_missing_file() {
        let dir = tempdir().unwrap();
        let mut registry = SnapshotRegistry::with_dir(dir.path());
        let id = registry.save(sample_data(), "run").unwrap();
        fs::remove_file(dir.path().join(format!("{}.json", id))).unwrap();

        registry.delete(&id).unwrap();
        assert!(registry.get(&id).is_err());
    }

    #[test]
    fn test_corrupt_files_skipped() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let mut bad = sample_data();
        bad.rows_data.remove(&42);
        let file = SnapshotFile {
            info: SnapshotInfo {
                id: "bad".into(),
                name: "bad".into(),
                created_at: "2024-01-01T00:00:00Z".into(),
                total_errors: 0,
                error_rows: 0,
                categories: vec![],
            },
            data: bad,
        };
        fs::write(dir.path().join("bad.json"), serde_json::to_string(&file).unwrap()).unwrap();

        let registry = SnapshotRegistry::with_dir(dir.path());
        assert!(registry.list().is_empty());
    }
}
