//! Saved rover records as held by the remote store.
//!
//! The configuration columns are kept as raw JSON: whatever shape the store
//! hands back is only turned into typed configuration by
//! [`crate::config::NavConfig::decode`] and [`crate::config::SdrConfig::decode`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier of a row in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        RemoteId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A saved rover as fetched from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub nav_config: Option<Value>,
    #[serde(default)]
    pub sdr_config: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating a record. `(owner_id, host, port)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub owner_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub nav_config: Value,
    pub sdr_config: Value,
}

/// Payload for updating the configuration of an existing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub id: RemoteId,
    pub nav_config: Value,
    pub sdr_config: Value,
}
