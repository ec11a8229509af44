//! Deployment record persistence.
//!
//! Records are checkpointed after every step, so a crash mid-deployment
//! leaves an inspectable partial record behind. The on-disk layout is:
//!
//! ```text
//! <data_dir>/deployments/
//!   ├── <id>.json
//!   └── <id>.json
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use utoken::{DeploymentRecord, Error, Result};

/// Durable storage for [`DeploymentRecord`]s.
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Insert or replace a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written.
    fn save(&self, record: &DeploymentRecord) -> Result<()>;

    /// Load a record by ID. Returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn load(&self, id: &str) -> Result<Option<DeploymentRecord>>;

    /// All records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> Result<Vec<DeploymentRecord>>;
}

/// One pretty-printed JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store rooted at `<data_dir>/deployments`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("deployments"),
        }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(Error::validation(format!("invalid deployment id `{id}`")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl RecordStore for JsonFileStore {
    /// Persist atomically via a temp file and rename.
    fn save(&self, record: &DeploymentRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Storage(format!("creating {}: {e}", self.dir.display())))?;

        let path = self.path_for(&record.id)?;
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, serde_json::to_vec_pretty(record)?)
            .map_err(|e| Error::Storage(format!("writing {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            Error::Storage(format!(
                "renaming {} -> {}: {e}",
                tmp.display(),
                path.display()
            ))
        })?;

        tracing::debug!(id = %record.id, status = %record.overall_status(), "record saved");
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<DeploymentRecord>> {
        let path = self.path_for(id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)
            .map_err(|e| Error::Storage(format!("reading {}: {e}", path.display())))?;
        Ok(Some(serde_json::from_slice(&data)?))
    }

    /// Unreadable files are logged and skipped.
    fn list(&self) -> Result<Vec<DeploymentRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| Error::Storage(format!("listing {}: {e}", self.dir.display())))?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|d| serde_json::from_slice::<DeploymentRecord>(&d).map_err(Error::from))
            {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DeploymentRecord>>,
    saves: Mutex<Vec<DeploymentRecord>>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot ever saved, in save order.
    #[must_use]
    pub fn history(&self) -> Vec<DeploymentRecord> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn save(&self, record: &DeploymentRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|_| Error::Storage("record map poisoned".into()))?
            .insert(record.id.clone(), record.clone());
        self.saves
            .lock()
            .map_err(|_| Error::Storage("history poisoned".into()))?
            .push(record.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<DeploymentRecord>> {
        Ok(self
            .records
            .lock()
            .map_err(|_| Error::Storage("record map poisoned".into()))?
            .get(id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<DeploymentRecord>> {
        let mut records: Vec<_> = self
            .records
            .lock()
            .map_err(|_| Error::Storage("record map poisoned".into()))?
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}
