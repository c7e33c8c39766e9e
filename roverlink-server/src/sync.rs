//! Persistence synchronizer.
//!
//! Keeps saved sessions in step with the remote store:
//!
//! ```text
//!   explicit save ──► save() ──► create (no remote id) ──► assign remote id
//!                              └► update (remote id set)
//!
//!   nav/sdr edit ──► schedule(id) ──► [quiet period] ──► update
//!                         ▲                 │
//!                         └── next edit ────┘ (restarts the timer)
//! ```
//!
//! There is at most one pending timer per session. Each edit replaces the
//! previous timer, so a burst of edits produces a single write carrying the
//! final state.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use roverlink_core::{
    ConfigUpdate, EndpointError, NewRecord, RegistryError, RemoteId, RoverSession,
    RoverSessionRegistry, SessionId,
};

use crate::store::{SharedStore, StoreError};

pub type SharedRegistry = Arc<RwLock<RoverSessionRegistry>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First save; the session now carries this id
    Created(RemoteId),
    Updated,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct PendingSave {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Synchronizer {
    store: SharedStore,
    registry: SharedRegistry,
    owner_id: Arc<str>,
    quiet_period: Duration,
    pending: Arc<Mutex<HashMap<SessionId, PendingSave>>>,
    generation: Arc<AtomicU64>,
}

impl Synchronizer {
    pub fn new(
        store: SharedStore,
        registry: SharedRegistry,
        owner_id: &str,
        quiet_period: Duration,
    ) -> Self {
        Synchronizer {
            store,
            registry,
            owner_id: Arc::from(owner_id),
            quiet_period,
            pending: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Write the session to the store now.
    ///
    /// An unsaved session is created and gets its remote id assigned; a saved
    /// one has its configuration updated. Either way the endpoint must be valid.
    pub async fn save(&self, target: Option<SessionId>) -> Result<SaveOutcome, SyncError> {
        let session = self.registry.read().unwrap().session(target)?;
        let addr = session.endpoint.validate()?;

        if let Some(remote_id) = &session.remote_id {
            self.update(&session, remote_id).await?;
            return Ok(SaveOutcome::Updated);
        }

        let record = NewRecord {
            owner_id: self.owner_id.to_string(),
            name: session.display_name.clone(),
            host: addr.ip().to_string(),
            port: addr.port(),
            nav_config: session.nav.to_value(),
            sdr_config: session.sdr.to_value(),
        };
        let remote_id = self.store.create(record).await?;

        let assigned = self
            .registry
            .write()
            .unwrap()
            .patch(Some(session.id), |s| s.assign_remote_id(remote_id.clone()));
        match assigned {
            Ok((_, true)) => info!("Saved {} as {}", session.id, remote_id),
            Ok((current, false)) => warn!(
                "Session {} was already saved as {:?}, ignoring {}",
                session.id, current.remote_id, remote_id
            ),
            Err(e) => warn!("Saved {} as {} but {}", session.id, remote_id, e),
        }
        Ok(SaveOutcome::Created(remote_id))
    }

    async fn update(&self, session: &RoverSession, remote_id: &RemoteId) -> Result<(), StoreError> {
        let update = ConfigUpdate {
            id: remote_id.clone(),
            nav_config: session.nav.to_value(),
            sdr_config: session.sdr.to_value(),
        };
        self.store.update(&self.owner_id, update).await
    }

    /// (Re)start the auto-save timer for a session.
    pub fn schedule(&self, id: SessionId) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut pending = self.pending.lock().unwrap();

        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(this.quiet_period).await;
            if this.take_pending(id, generation) {
                this.autosave(id).await;
            }
        });

        if let Some(previous) = pending.insert(id, PendingSave { generation, handle }) {
            previous.handle.abort();
        }
        debug!("Auto-save for {} in {:?}", id, self.quiet_period);
    }

    /// Drop a pending auto-save without writing it
    pub fn cancel(&self, id: SessionId) {
        if let Some(previous) = self.pending.lock().unwrap().remove(&id) {
            previous.handle.abort();
            debug!("Cancelled auto-save for {}", id);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Stop all timers and write whatever they were waiting to write.
    pub async fn shutdown(&self) {
        let drained: Vec<(SessionId, PendingSave)> =
            self.pending.lock().unwrap().drain().collect();
        if drained.is_empty() {
            return;
        }

        info!("Flushing {} pending auto-saves", drained.len());
        for (id, pending) in drained {
            pending.handle.abort();
            self.autosave(id).await;
        }
    }

    /// Claim the pending slot; false when a newer edit has taken it over
    fn take_pending(&self, id: SessionId, generation: u64) -> bool {
        let mut pending = self.pending.lock().unwrap();
        match pending.get(&id) {
            Some(p) if p.generation == generation => {
                pending.remove(&id);
                true
            }
            _ => false,
        }
    }

    async fn autosave(&self, id: SessionId) {
        let session = self.registry.read().unwrap().get(id);
        let Some(session) = session else {
            debug!("Session {} is gone, skipping auto-save", id);
            return;
        };
        let Some(remote_id) = session.remote_id.clone() else {
            return;
        };

        match self.update(&session, &remote_id).await {
            Ok(()) => debug!("Auto-saved {} to {}", id, remote_id),
            Err(e) => warn!("Auto-save of {} failed: {}", id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{shared_registry, MockStore, StoreCall};
    use roverlink_core::{NavPatch, SessionPatch};

    const QUIET: Duration = Duration::from_millis(800);

    fn fixture() -> (Synchronizer, SharedRegistry, Arc<MockStore>) {
        let registry = shared_registry();
        let store = MockStore::new();
        let sync = Synchronizer::new(store.clone(), registry.clone(), "alice", QUIET);
        (sync, registry, store)
    }

    fn saved_session(registry: &SharedRegistry, store: &MockStore) -> SessionId {
        let record = store.seed("alice", "r1", "10.0.0.1", 5);
        registry.write().unwrap().hydrate_from_saved(&record).id
    }

    fn set_speed(registry: &SharedRegistry, id: SessionId, speed: f64) {
        registry
            .write()
            .unwrap()
            .update_nav(
                Some(id),
                &NavPatch {
                    base_speed: Some(speed),
                    ..Default::default()
                },
            )
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_coalesce_into_one_update() {
        let (sync, registry, store) = fixture();
        let id = saved_session(&registry, &store);

        for speed in [0.7, 0.8, 0.9, 1.0, 1.1] {
            set_speed(&registry, id, speed);
            sync.schedule(id);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(store.updates().is_empty());
        assert_eq!(sync.pending_count(), 1);

        tokio::time::sleep(QUIET).await;
        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, RemoteId::new("r1"));
        assert_eq!(updates[0].nav_config["baseSpeed"], 1.1);
        assert_eq!(sync.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_debounce_independently() {
        let (sync, registry, store) = fixture();
        let first = saved_session(&registry, &store);
        let record = store.seed("alice", "r2", "10.0.0.2", 1);
        let second = registry.write().unwrap().hydrate_from_saved(&record).id;

        sync.schedule(first);
        sync.schedule(second);
        tokio::time::sleep(QUIET + Duration::from_millis(50)).await;

        let mut ids: Vec<RemoteId> = store.updates().into_iter().map(|u| u.id).collect();
        ids.sort();
        assert_eq!(ids, vec![RemoteId::new("r1"), RemoteId::new("r2")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_save() {
        let (sync, registry, store) = fixture();
        let id = saved_session(&registry, &store);

        sync.schedule(id);
        sync.cancel(id);
        tokio::time::sleep(QUIET * 2).await;
        assert!(store.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_pending() {
        let (sync, registry, store) = fixture();
        let id = saved_session(&registry, &store);
        set_speed(&registry, id, 1.4);

        sync.schedule(id);
        sync.shutdown().await;
        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].nav_config["baseSpeed"], 1.4);

        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(store.updates().len(), 1);
    }

    #[tokio::test]
    async fn test_first_save_creates_and_assigns_id() {
        let (sync, registry, store) = fixture();
        let id = registry.read().unwrap().active_id();
        registry
            .write()
            .unwrap()
            .update_session(
                None,
                &SessionPatch {
                    host: Some("10.0.0.8".to_string()),
                    port: Some("8080".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = sync.save(None).await.unwrap();
        let remote_id = match outcome {
            SaveOutcome::Created(remote_id) => remote_id,
            other => panic!("unexpected {:?}", other),
        };
        let session = registry.read().unwrap().get(id).unwrap();
        assert_eq!(session.remote_id, Some(remote_id.clone()));

        let creates = store.creates();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].owner_id, "alice");
        assert_eq!(creates[0].host, "10.0.0.8");
        assert_eq!(creates[0].port, 8080);

        // Second save updates the same record
        assert_eq!(sync.save(None).await.unwrap(), SaveOutcome::Updated);
        assert_eq!(store.updates()[0].id, remote_id);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_endpoint_before_store() {
        let (sync, _registry, store) = fixture();

        let err = sync.save(None).await.unwrap_err();
        assert!(matches!(err, SyncError::Endpoint(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_also_requires_valid_endpoint() {
        let (sync, registry, store) = fixture();
        let id = saved_session(&registry, &store);
        registry
            .write()
            .unwrap()
            .update_session(
                Some(id),
                &SessionPatch {
                    port: Some("99999".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = sync.save(Some(id)).await.unwrap_err();
        assert!(matches!(err, SyncError::Endpoint(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_fires_while_explicit_save_in_flight() {
        let (sync, registry, store) = fixture();
        let id = saved_session(&registry, &store);
        *store.update_delay.lock().unwrap() = Duration::from_secs(3);
        set_speed(&registry, id, 1.0);

        let explicit = tokio::spawn({
            let sync = sync.clone();
            async move { sync.save(Some(id)).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        set_speed(&registry, id, 1.5);
        sync.schedule(id);
        tokio::time::sleep(QUIET + Duration::from_millis(50)).await;

        // Timer has fired and its write is in flight next to the explicit one
        assert!(!explicit.is_finished());
        assert_eq!(store.updates().len(), 2);
        assert_eq!(sync.pending_count(), 0);

        assert_eq!(explicit.await.unwrap().unwrap(), SaveOutcome::Updated);
        tokio::time::sleep(Duration::from_secs(3)).await;

        let speeds: Vec<f64> = store
            .updates()
            .iter()
            .map(|u| u.nav_config["baseSpeed"].as_f64().unwrap())
            .collect();
        assert_eq!(speeds, vec![1.0, 1.5]);
    }

    #[tokio::test]
    async fn test_conflict_leaves_session_unsaved() {
        let (sync, registry, store) = fixture();
        store.seed("alice", "r1", "10.0.0.1", 5);
        registry
            .write()
            .unwrap()
            .update_session(
                None,
                &SessionPatch {
                    host: Some("10.0.0.1".to_string()),
                    port: Some("8000".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let err = sync.save(None).await.unwrap_err();
        assert_eq!(err.to_string(), "Rover with this IP and port already exists");
        assert!(!registry.read().unwrap().active().is_saved());
        assert!(matches!(store.calls()[0], StoreCall::Create(_)));
    }
}
