//! Saved rovers in a PostgREST / Supabase `rover_instances` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use roverlink_core::{ConfigUpdate, NewRecord, RemoteId, RemoteRecord};

use super::{RemoteStore, StoreError};

const TABLE: &str = "rover_instances";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const UNIQUE_VIOLATION: &str = "23505";

/// Row as stored in the table
#[derive(Debug, Deserialize)]
struct Row {
    id: String,
    name: String,
    ip_address: String,
    port: u16,
    #[serde(default)]
    nav_config: Option<Value>,
    #[serde(default)]
    sdr_config: Option<Value>,
    created_at: DateTime<Utc>,
}

impl From<Row> for RemoteRecord {
    fn from(row: Row) -> Self {
        RemoteRecord {
            id: RemoteId(row.id),
            name: row.name,
            host: row.ip_address,
            port: row.port,
            nav_config: row.nav_config,
            sdr_config: row.sdr_config,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    user_id: &'a str,
    name: &'a str,
    ip_address: &'a str,
    port: u16,
    nav_config: &'a Value,
    sdr_config: &'a Value,
}

#[derive(Debug, Serialize)]
struct ConfigColumns<'a> {
    nav_config: &'a Value,
    sdr_config: &'a Value,
}

/// PostgREST error body
#[derive(Debug, Default, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub struct PostgrestStore {
    client: Client,
    table_url: String,
}

impl PostgrestStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&key)
                .map_err(|_| StoreError::Rejected("API key is not a valid header value".into()))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| StoreError::Rejected("API key is not a valid header value".into()))?;
            headers.insert("apikey", value);
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        Ok(PostgrestStore {
            client,
            table_url: table_url(base_url),
        })
    }

    /// Send a request and decode the returned rows
    async fn rows(&self, request: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn table_url(base_url: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), TABLE)
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

/// Map a failed response to a store error; unique violations are conflicts
fn classify_error(status: StatusCode, body: &str) -> StoreError {
    let api_error: ApiError = serde_json::from_str(body).unwrap_or_default();
    if status == StatusCode::CONFLICT || api_error.code.as_deref() == Some(UNIQUE_VIOLATION) {
        return StoreError::Conflict;
    }
    let message = api_error.message.unwrap_or_else(|| body.to_string());
    StoreError::Rejected(format!("HTTP {}: {}", status.as_u16(), message))
}

#[async_trait]
impl RemoteStore for PostgrestStore {
    async fn fetch(&self, owner: &str) -> Result<Vec<RemoteRecord>, StoreError> {
        let request = self.client.get(&self.table_url).query(&[
            ("select", "*".to_string()),
            ("user_id", eq(owner)),
            ("order", "created_at.desc".to_string()),
        ]);
        let rows = self.rows(request).await?;
        debug!("Fetched {} saved rovers for {}", rows.len(), owner);
        Ok(rows.into_iter().map(RemoteRecord::from).collect())
    }

    async fn create(&self, record: NewRecord) -> Result<RemoteId, StoreError> {
        let insert = InsertRow {
            user_id: &record.owner_id,
            name: &record.name,
            ip_address: &record.host,
            port: record.port,
            nav_config: &record.nav_config,
            sdr_config: &record.sdr_config,
        };
        let request = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&[insert]);

        let row = self
            .rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected("Insert returned no row".to_string()))?;

        info!("Created saved rover {} for {}", row.id, record.owner_id);
        Ok(RemoteId(row.id))
    }

    async fn update(&self, owner: &str, update: ConfigUpdate) -> Result<(), StoreError> {
        let request = self
            .client
            .patch(&self.table_url)
            .query(&[("id", eq(update.id.as_str())), ("user_id", eq(owner))])
            .header("Prefer", "return=representation")
            .json(&ConfigColumns {
                nav_config: &update.nav_config,
                sdr_config: &update.sdr_config,
            });

        if self.rows(request).await?.is_empty() {
            return Err(StoreError::NotFound(update.id));
        }
        info!("Updated saved rover {} for {}", update.id, owner);
        Ok(())
    }

    async fn delete(&self, owner: &str, id: &RemoteId) -> Result<(), StoreError> {
        let request = self
            .client
            .delete(&self.table_url)
            .query(&[("id", eq(id.as_str())), ("user_id", eq(owner))])
            .header("Prefer", "return=representation");

        if self.rows(request).await?.is_empty() {
            return Err(StoreError::NotFound(id.clone()));
        }
        info!("Deleted saved rover {} for {}", id, owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_url() {
        assert_eq!(
            table_url("https://x.supabase.co/rest/v1/"),
            "https://x.supabase.co/rest/v1/rover_instances"
        );
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint"}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, body),
            StoreError::Conflict
        ));
        assert!(matches!(
            classify_error(StatusCode::CONFLICT, ""),
            StoreError::Conflict
        ));

        match classify_error(StatusCode::UNAUTHORIZED, r#"{"message":"JWT expired"}"#) {
            StoreError::Rejected(msg) => assert_eq!(msg, "HTTP 401: JWT expired"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_row_to_record() {
        let row: Row = serde_json::from_value(json!({
            "id": "7c1e",
            "user_id": "alice",
            "name": "Scout",
            "ip_address": "10.0.0.5",
            "port": 8000,
            "nav_config": {"baseSpeed": 0.9},
            "sdr_config": null,
            "created_at": "2024-05-01T12:00:00+00:00"
        }))
        .unwrap();

        let record = RemoteRecord::from(row);
        assert_eq!(record.id, RemoteId::new("7c1e"));
        assert_eq!(record.host, "10.0.0.5");
        assert_eq!(record.nav_config, Some(json!({"baseSpeed": 0.9})));
        assert_eq!(record.sdr_config, None);
    }

    #[test]
    fn test_rejects_bad_api_key() {
        assert!(PostgrestStore::new("http://localhost", Some("bad\nkey".into())).is_err());
        assert!(PostgrestStore::new("http://localhost", Some("good".into())).is_ok());
    }
}
