//! Remote store for saved rover configurations.
//!
//! Records are scoped by owner id. Two backends are provided:
//! - [`FileStore`]: one JSON file per owner in the local data directory
//! - [`PostgrestStore`]: a PostgREST / Supabase `rover_instances` table

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use roverlink_core::{ConfigUpdate, NewRecord, RemoteId, RemoteRecord};

use crate::config::StoreConfig;

mod file;
mod postgrest;

pub use file::FileStore;
pub use postgrest::PostgrestStore;

pub const CONFLICT_MESSAGE: &str = "Rover with this IP and port already exists";

#[derive(Error, Debug)]
pub enum StoreError {
    /// `(owner, host, port)` is already taken
    #[error("{}", CONFLICT_MESSAGE)]
    Conflict,

    /// No record with this id for this owner
    #[error("Saved rover '{0}' not found")]
    NotFound(RemoteId),

    #[error("Store unreachable: {0}")]
    Transport(String),

    #[error("Store rejected request: {0}")]
    Rejected(String),

    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store data is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Owner-scoped CRUD on saved rovers.
///
/// Update and delete are ownership-checked: a record that exists but belongs
/// to another owner is reported as [`StoreError::NotFound`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All records for `owner`, newest first
    async fn fetch(&self, owner: &str) -> Result<Vec<RemoteRecord>, StoreError>;

    async fn create(&self, record: NewRecord) -> Result<RemoteId, StoreError>;

    async fn update(&self, owner: &str, update: ConfigUpdate) -> Result<(), StoreError>;

    async fn delete(&self, owner: &str, id: &RemoteId) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<dyn RemoteStore>;

pub fn create_store(config: &StoreConfig) -> Result<SharedStore, StoreError> {
    match config {
        StoreConfig::File { dir } => Ok(Arc::new(FileStore::new(dir)?)),
        StoreConfig::Postgrest { url, api_key } => {
            Ok(Arc::new(PostgrestStore::new(url, api_key.clone())?))
        }
    }
}
