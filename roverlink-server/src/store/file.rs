//! Saved rovers as JSON files in the local data directory.
//!
//! Storage path: `{data_dir}/rovers/{owner}.json`

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use roverlink_core::{ConfigUpdate, NewRecord, RemoteId, RemoteRecord};

use super::{RemoteStore, StoreError};

pub struct FileStore {
    base_dir: PathBuf,
    /// Records per owner, loaded lazily
    cache: Mutex<HashMap<String, Vec<RemoteRecord>>>,
}

impl FileStore {
    pub fn new(data_dir: &Path) -> Result<Self, StoreError> {
        let base_dir = data_dir.join("rovers");
        fs::create_dir_all(&base_dir)?;
        debug!("Rover store directory: {}", base_dir.display());

        Ok(FileStore {
            base_dir,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn file_path(&self, owner: &str) -> PathBuf {
        // Sanitize owner for filesystem (replace / with __)
        let safe_owner = owner.replace('/', "__");
        self.base_dir.join(format!("{}.json", safe_owner))
    }

    fn load<'a>(
        &self,
        cache: &'a mut HashMap<String, Vec<RemoteRecord>>,
        owner: &str,
    ) -> Result<&'a mut Vec<RemoteRecord>, StoreError> {
        if !cache.contains_key(owner) {
            let path = self.file_path(owner);
            let records = if path.exists() {
                let reader = BufReader::new(fs::File::open(&path)?);
                let records: Vec<RemoteRecord> = serde_json::from_reader(reader)?;
                debug!("Loaded {} saved rovers from {}", records.len(), path.display());
                records
            } else {
                Vec::new()
            };
            cache.insert(owner.to_string(), records);
        }
        Ok(cache.entry(owner.to_string()).or_default())
    }

    fn persist(&self, owner: &str, records: &[RemoteRecord]) -> Result<(), StoreError> {
        let path = self.file_path(owner);
        let mut writer = BufWriter::new(fs::File::create(&path)?);
        serde_json::to_writer_pretty(&mut writer, records)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FileStore {
    async fn fetch(&self, owner: &str) -> Result<Vec<RemoteRecord>, StoreError> {
        let mut cache = self.cache.lock().unwrap();
        let records = self.load(&mut cache, owner)?;

        // Newest first; among equal timestamps the later insert wins
        let mut out: Vec<RemoteRecord> = records.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn create(&self, record: NewRecord) -> Result<RemoteId, StoreError> {
        let mut cache = self.cache.lock().unwrap();
        let records = self.load(&mut cache, &record.owner_id)?;

        if records
            .iter()
            .any(|r| r.host == record.host && r.port == record.port)
        {
            return Err(StoreError::Conflict);
        }

        let id = RemoteId::new(Uuid::new_v4().to_string());
        let mut next = records.clone();
        next.push(RemoteRecord {
            id: id.clone(),
            name: record.name,
            host: record.host,
            port: record.port,
            nav_config: Some(record.nav_config),
            sdr_config: Some(record.sdr_config),
            created_at: Utc::now(),
        });
        self.persist(&record.owner_id, &next)?;
        *records = next;

        info!("Created saved rover {} for {}", id, record.owner_id);
        Ok(id)
    }

    async fn update(&self, owner: &str, update: ConfigUpdate) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().unwrap();
        let records = self.load(&mut cache, owner)?;

        let mut next = records.clone();
        let record = next
            .iter_mut()
            .find(|r| r.id == update.id)
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        record.nav_config = Some(update.nav_config);
        record.sdr_config = Some(update.sdr_config);

        self.persist(owner, &next)?;
        *records = next;
        info!("Updated saved rover {} for {}", update.id, owner);
        Ok(())
    }

    async fn delete(&self, owner: &str, id: &RemoteId) -> Result<(), StoreError> {
        let mut cache = self.cache.lock().unwrap();
        let records = self.load(&mut cache, owner)?;

        let index = records
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let mut next = records.clone();
        next.remove(index);

        self.persist(owner, &next)?;
        *records = next;
        info!("Deleted saved rover {} for {}", id, owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store() -> (FileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn new_record(owner: &str, host: &str, port: u16) -> NewRecord {
        NewRecord {
            owner_id: owner.to_string(),
            name: format!("Rover at {}", host),
            host: host.to_string(),
            port,
            nav_config: json!({"baseSpeed": 0.6}),
            sdr_config: json!({"frequency": 2400.0}),
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let (store, _temp) = create_test_store();

        let first = store.create(new_record("alice", "10.0.0.1", 8000)).await.unwrap();
        let second = store.create(new_record("alice", "10.0.0.2", 8000)).await.unwrap();
        assert_ne!(first, second);

        let records = store.fetch("alice").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second);
        assert_eq!(records[1].id, first);

        assert!(store.fetch("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_endpoint_conflicts() {
        let (store, _temp) = create_test_store();

        store.create(new_record("alice", "10.0.0.1", 8000)).await.unwrap();
        let err = store
            .create(new_record("alice", "10.0.0.1", 8000))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(err.to_string(), "Rover with this IP and port already exists");

        // Same endpoint under another owner is fine
        store.create(new_record("bob", "10.0.0.1", 8000)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_is_owner_scoped() {
        let (store, _temp) = create_test_store();
        let id = store.create(new_record("alice", "10.0.0.1", 8000)).await.unwrap();

        let update = ConfigUpdate {
            id: id.clone(),
            nav_config: json!({"baseSpeed": 1.5}),
            sdr_config: json!({}),
        };
        assert!(matches!(
            store.update("bob", update.clone()).await,
            Err(StoreError::NotFound(_))
        ));
        store.update("alice", update).await.unwrap();

        let records = store.fetch("alice").await.unwrap();
        assert_eq!(records[0].nav_config, Some(json!({"baseSpeed": 1.5})));
    }

    #[tokio::test]
    async fn test_records_survive_reload() {
        let temp_dir = TempDir::new().unwrap();
        let id = {
            let store = FileStore::new(temp_dir.path()).unwrap();
            store.create(new_record("team/a", "10.0.0.1", 8000)).await.unwrap()
        };
        assert!(temp_dir.path().join("rovers").join("team__a.json").exists());

        let store = FileStore::new(temp_dir.path()).unwrap();
        let records = store.fetch("team/a").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);

        store.delete("team/a", &id).await.unwrap();
        assert!(store.fetch("team/a").await.unwrap().is_empty());
        assert!(matches!(
            store.delete("team/a", &id).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
