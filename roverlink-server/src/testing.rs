//! Scripted store and rover for manager tests.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use roverlink_core::{ConfigUpdate, NewRecord, RemoteId, RemoteRecord, RoverSessionRegistry};

use crate::endpoint::{EndpointCallError, RoverEndpoint, SdrApplyPayload};
use crate::store::{RemoteStore, StoreError};
use crate::sync::SharedRegistry;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Fetch(String),
    Create(NewRecord),
    Update(String, ConfigUpdate),
    Delete(String, RemoteId),
}

/// In-memory store that records every call
#[derive(Default)]
pub struct MockStore {
    pub calls: Mutex<Vec<StoreCall>>,
    records: Mutex<Vec<(String, RemoteRecord)>>,
    pub unreachable: AtomicBool,
    /// How long `update` takes to answer
    pub update_delay: Mutex<Duration>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MockStore::default())
    }

    /// Seed a record for `owner`, `age_minutes` old
    pub fn seed(&self, owner: &str, id: &str, host: &str, age_minutes: i64) -> RemoteRecord {
        let record = RemoteRecord {
            id: RemoteId::new(id),
            name: format!("Saved {}", id),
            host: host.to_string(),
            port: 8000,
            nav_config: Some(json!({"baseSpeed": 0.9})),
            sdr_config: None,
            created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
        };
        self.records
            .lock()
            .unwrap()
            .push((owner.to_string(), record.clone()));
        record
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<ConfigUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Update(_, u) => Some(u),
                _ => None,
            })
            .collect()
    }

    pub fn creates(&self) -> Vec<NewRecord> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Create(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    async fn fetch(&self, owner: &str) -> Result<Vec<RemoteRecord>, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Fetch(owner.to_string()));
        self.check_reachable()?;
        let mut out: Vec<RemoteRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, r)| r.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn create(&self, record: NewRecord) -> Result<RemoteId, StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Create(record.clone()));
        self.check_reachable()?;
        let mut records = self.records.lock().unwrap();
        if records
            .iter()
            .any(|(o, r)| o == &record.owner_id && r.host == record.host && r.port == record.port)
        {
            return Err(StoreError::Conflict);
        }
        let id = RemoteId::new(format!("remote-{}", records.len() + 1));
        records.push((
            record.owner_id.clone(),
            RemoteRecord {
                id: id.clone(),
                name: record.name,
                host: record.host,
                port: record.port,
                nav_config: Some(record.nav_config),
                sdr_config: Some(record.sdr_config),
                created_at: Utc::now(),
            },
        ));
        Ok(id)
    }

    async fn update(&self, owner: &str, update: ConfigUpdate) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Update(owner.to_string(), update.clone()));
        let delay = *self.update_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_reachable()?;
        let mut records = self.records.lock().unwrap();
        let (_, record) = records
            .iter_mut()
            .find(|(o, r)| o == owner && r.id == update.id)
            .ok_or_else(|| StoreError::NotFound(update.id.clone()))?;
        record.nav_config = Some(update.nav_config);
        record.sdr_config = Some(update.sdr_config);
        Ok(())
    }

    async fn delete(&self, owner: &str, id: &RemoteId) -> Result<(), StoreError> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::Delete(owner.to_string(), id.clone()));
        self.check_reachable()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|(o, r)| !(o == owner && &r.id == id));
        if records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoverCall {
    Handshake(SocketAddrV4),
    MovementTest(SocketAddrV4),
    Stop(SocketAddrV4),
    Release(SocketAddrV4),
    ApplySdr(SocketAddrV4, SdrApplyPayload),
    VerifySdr(SocketAddrV4, String),
    TransmitGps(SocketAddrV4),
}

/// Rover whose answers and delays are set by the test
pub struct MockEndpoint {
    pub calls: Mutex<Vec<RoverCall>>,
    pub reachable: AtomicBool,
    pub test_passes: AtomicBool,
    pub handshake_delay: Mutex<Duration>,
    pub test_delay: Mutex<Duration>,
}

impl Default for MockEndpoint {
    fn default() -> Self {
        MockEndpoint {
            calls: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
            test_passes: AtomicBool::new(true),
            handshake_delay: Mutex::new(Duration::from_millis(50)),
            test_delay: Mutex::new(Duration::from_millis(500)),
        }
    }
}

impl MockEndpoint {
    pub fn new() -> Arc<Self> {
        Arc::new(MockEndpoint::default())
    }

    pub fn calls(&self) -> Vec<RoverCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RoverCall) -> Result<(), EndpointCallError> {
        self.calls.lock().unwrap().push(call);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(EndpointCallError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RoverEndpoint for MockEndpoint {
    async fn handshake(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        let delay = *self.handshake_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.record(RoverCall::Handshake(addr))
    }

    async fn movement_test(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        let delay = *self.test_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.record(RoverCall::MovementTest(addr))?;
        if !self.test_passes.load(Ordering::SeqCst) {
            return Err(EndpointCallError::Status {
                status: 500,
                body: "motor fault".to_string(),
            });
        }
        Ok(())
    }

    async fn force_stop(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.record(RoverCall::Stop(addr))
    }

    async fn release(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.record(RoverCall::Release(addr))
    }

    async fn apply_sdr(
        &self,
        addr: SocketAddrV4,
        payload: &SdrApplyPayload,
    ) -> Result<Value, EndpointCallError> {
        self.record(RoverCall::ApplySdr(addr, payload.clone()))?;
        Ok(json!({"status": "applied"}))
    }

    async fn verify_sdr(&self, addr: SocketAddrV4, uri: &str) -> Result<Value, EndpointCallError> {
        self.record(RoverCall::VerifySdr(addr, uri.to_string()))?;
        Ok(json!({"found": true}))
    }

    async fn transmit_gps(&self, addr: SocketAddrV4) -> Result<(), EndpointCallError> {
        self.record(RoverCall::TransmitGps(addr))
    }
}

pub fn shared_registry() -> SharedRegistry {
    Arc::new(RwLock::new(RoverSessionRegistry::new()))
}
