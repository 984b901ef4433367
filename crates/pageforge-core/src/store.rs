//! Persistence boundary for generation records.
//!
//! The substrate behind the trait is a collaborator: anything that can hold
//! one JSON document per id works. Two implementations are provided: an
//! in-memory map for tests and embedding, and a directory of JSON files for
//! real restart-resume. All mutations are scoped to a single id's record, so
//! last-writer-wins per id is the only consistency requirement.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use crate::record::GenerationRecord;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Async persistence for one record per generation id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Writes the record, replacing any previous snapshot for its id.
    async fn save(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    /// Reads the record for `id`, if any.
    async fn load(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError>;

    /// Removes the resumable record for `id`. Unknown ids are not an error.
    async fn clear(&self, id: &str) -> Result<(), StoreError>;

    /// Ids of records still marked running (resume candidates).
    async fn list_running(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory implementation for development and testing.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: RwLock<HashMap<String, GenerationRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn save(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(records.get(id).cloned())
    }

    async fn clear(&self, id: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        records.remove(id);
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<String>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(records
            .values()
            .filter(|r| r.is_running)
            .map(|r| r.id.clone())
            .collect())
    }
}

/// File-backed implementation: one `<id>.json` per record under a directory.
pub struct JsonFileRecordStore {
    dir: PathBuf,
}

impl JsonFileRecordStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty()
            || id.contains('/')
            || id.contains('\\')
            || id.contains("..")
        {
            return Err(StoreError::Internal(format!(
                "record id is not a valid file name: {id:?}"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn save(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn load(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError> {
        let path = self.record_path(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn clear(&self, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn list_running(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };
        let mut running = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = tokio::fs::read(&path).await else {
                continue;
            };
            // Records another writer is mid-update on may fail to parse; skip
            // them rather than failing the whole listing.
            if let Ok(record) = serde_json::from_slice::<GenerationRecord>(&bytes)
                && record.is_running
            {
                running.push(record.id);
            }
        }
        Ok(running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::Stage;

    #[tokio::test]
    async fn in_memory_store_round_trips_and_clears() {
        let store = InMemoryRecordStore::new();
        let record = GenerationRecord::new("g1", "topic");
        store.save(&record).await.expect("save");
        let loaded = store.load("g1").await.expect("load").expect("present");
        assert_eq!(loaded, record);

        store.clear("g1").await.expect("clear");
        assert!(store.load("g1").await.expect("load").is_none());
    }

    #[tokio::test]
    async fn in_memory_store_lists_only_running_records() {
        let store = InMemoryRecordStore::new();
        let running = GenerationRecord::new("a", "t");
        let mut stopped = GenerationRecord::new("b", "t");
        stopped.is_running = false;
        store.save(&running).await.expect("save");
        store.save(&stopped).await.expect("save");
        assert_eq!(store.list_running().await.expect("list"), vec!["a"]);
    }

    #[tokio::test]
    async fn file_store_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        let mut record = GenerationRecord::new("g1", "topic");
        record.stage = Stage::ApplyChecklist;
        record.document = "<!doctype html><html></html>".into();
        store.save(&record).await.expect("save");

        // A separate instance over the same directory sees the record, the
        // same way a restarted process would.
        let reopened = JsonFileRecordStore::new(dir.path());
        let loaded = reopened.load("g1").await.expect("load").expect("present");
        assert_eq!(loaded, record);
        assert_eq!(reopened.list_running().await.expect("list"), vec!["g1"]);
    }

    #[tokio::test]
    async fn file_store_clear_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        store.clear("missing").await.expect("clear unknown id");
    }

    #[tokio::test]
    async fn file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileRecordStore::new(dir.path());
        let record = GenerationRecord::new("../escape", "topic");
        assert!(store.save(&record).await.is_err());
    }
}
