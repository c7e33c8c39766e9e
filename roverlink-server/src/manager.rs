//! Rover session manager.
//!
//! [`RoverManager`] is the one owner of the session registry. The web layer
//! holds a clone of it as axum state; every operation addresses a session by
//! id, or the active session when no id is given.
//!
//! Registry access is synchronous and short. Network work (handshakes,
//! movement tests, store writes, radio commands) runs on spawned tasks, so a
//! dropped HTTP request never leaves a session half-way through a transition.
//! Results are applied as patches to whatever the session looks like when the
//! work completes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::net::SocketAddrV4;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;

use roverlink_core::{
    csv_import::parse_mission, CsvError, EndpointError, NavPatch, RegistryError,
    RegistrySnapshot, RemoteId, RemoteRecord, RoverSession, RoverSessionRegistry, SdrPatch,
    SessionId, SessionPatch, TestResult, Toggled,
};

use crate::config::ManagerConfig;
use crate::endpoint::{EndpointCallError, SdrApplyPayload, SharedEndpoint};
use crate::store::{SharedStore, StoreError, CONFLICT_MESSAGE};
use crate::sync::{SaveOutcome, SharedRegistry, SyncError, Synchronizer};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rover(#[from] EndpointCallError),

    #[error("Saved rover '{0}' not found")]
    NoSuchRecord(RemoteId),

    #[error("Invalid session id '{0}'")]
    BadSessionId(String),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl From<SyncError> for ManagerError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Registry(e) => ManagerError::Registry(e),
            SyncError::Endpoint(e) => ManagerError::Endpoint(e),
            SyncError::Store(e) => ManagerError::Store(e),
        }
    }
}

impl ManagerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ManagerError::Registry(e) => match e {
                RegistryError::NoSuchSession(_) => StatusCode::NOT_FOUND,
                RegistryError::DeleteWhileConnected(_)
                | RegistryError::NotConnected(_)
                | RegistryError::TestAlreadyRunning(_) => StatusCode::CONFLICT,
                RegistryError::Endpoint(_) | RegistryError::Waypoint(_) => StatusCode::BAD_REQUEST,
            },
            ManagerError::Csv(_) | ManagerError::Endpoint(_) | ManagerError::BadSessionId(_) => {
                StatusCode::BAD_REQUEST
            }
            ManagerError::Store(e) => match e {
                StoreError::Conflict => StatusCode::CONFLICT,
                StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                StoreError::Transport(_) | StoreError::Rejected(_) => StatusCode::BAD_GATEWAY,
                StoreError::Io(_) | StoreError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ManagerError::Rover(_) => StatusCode::BAD_GATEWAY,
            ManagerError::NoSuchRecord(_) => StatusCode::NOT_FOUND,
            ManagerError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Tell axum how to convert `ManagerError` into a response.
impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Handle on a movement test running in the background
pub type TestHandle = JoinHandle<Result<Arc<RoverSession>, ManagerError>>;

struct ManagerInner {
    registry: SharedRegistry,
    endpoint: SharedEndpoint,
    sync: Synchronizer,
    /// Last fetched list of saved rovers for this owner
    saved: RwLock<Vec<RemoteRecord>>,
    config: ManagerConfig,
}

#[derive(Clone)]
pub struct RoverManager {
    inner: Arc<ManagerInner>,
}

/// Run work to completion even if the caller goes away
async fn detached<F>(work: F) -> Result<F::Output, ManagerError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(work)
        .await
        .map_err(|e| ManagerError::TaskFailed(e.to_string()))
}

impl RoverManager {
    pub fn new(store: SharedStore, endpoint: SharedEndpoint, config: ManagerConfig) -> Self {
        let registry: SharedRegistry = Arc::new(RwLock::new(RoverSessionRegistry::new()));
        let sync = Synchronizer::new(
            store,
            registry.clone(),
            &config.owner_id,
            config.autosave_delay,
        );

        RoverManager {
            inner: Arc::new(ManagerInner {
                registry,
                endpoint,
                sync,
                saved: RwLock::new(Vec::new()),
                config,
            }),
        }
    }

    fn registry(&self) -> &RwLock<RoverSessionRegistry> {
        &self.inner.registry
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// Set the status line of a session that may have been deleted meanwhile
    fn set_status(&self, id: SessionId, status: impl Into<String>) {
        let status = status.into();
        if let Err(e) = self
            .registry()
            .write()
            .unwrap()
            .patch(Some(id), |s| s.set_status(status))
        {
            debug!("Dropping status for {}: {}", id, e);
        }
    }

    fn resolve(&self, target: Option<SessionId>) -> Result<SessionId, ManagerError> {
        Ok(self.registry().read().unwrap().resolve(target)?)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.registry().read().unwrap().snapshot()
    }

    pub fn session(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        Ok(self.registry().read().unwrap().session(target)?)
    }

    pub fn add_session(&self) -> Arc<RoverSession> {
        self.registry().write().unwrap().add_session()
    }

    pub fn select_session(&self, id: SessionId) -> Result<(), ManagerError> {
        self.registry().write().unwrap().select_session(id)?;
        debug!("Active session is now {}", id);
        Ok(())
    }

    pub fn update_session(
        &self,
        target: Option<SessionId>,
        patch: &SessionPatch,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        Ok(self.registry().write().unwrap().update_session(target, patch)?)
    }

    pub fn update_nav(
        &self,
        target: Option<SessionId>,
        patch: &NavPatch,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        let session = self.registry().write().unwrap().update_nav(target, patch)?;
        self.schedule_autosave(&session);
        Ok(session)
    }

    pub fn update_sdr(
        &self,
        target: Option<SessionId>,
        patch: &SdrPatch,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        let session = self.registry().write().unwrap().update_sdr(target, patch)?;
        self.schedule_autosave(&session);
        Ok(session)
    }

    fn schedule_autosave(&self, session: &RoverSession) {
        if session.is_saved() {
            self.inner.sync.schedule(session.id);
        }
    }

    /// Remove a session, and its saved record if it has one.
    ///
    /// The remote delete is best effort: a failure is logged and the local
    /// session stays deleted.
    pub async fn delete_session(
        &self,
        target: Option<SessionId>,
    ) -> Result<RegistrySnapshot, ManagerError> {
        let id = self.resolve(target)?;
        let removed = self.registry().write().unwrap().delete_session(id)?;
        self.inner.sync.cancel(id);

        if let Some(remote_id) = removed.remote_id.clone() {
            let sync = self.inner.sync.clone();
            let rid = remote_id.clone();
            let result =
                detached(async move { sync.store().delete(sync.owner_id(), &rid).await }).await?;
            match result {
                Ok(()) => {
                    self.inner
                        .saved
                        .write()
                        .unwrap()
                        .retain(|r| r.id != remote_id);
                    info!("Deleted saved rover {} with session {}", remote_id, id);
                }
                Err(e) => warn!("Could not delete saved rover {}: {}", remote_id, e),
            }
        }

        Ok(self.snapshot())
    }

    // =========================================================================
    // Waypoints
    // =========================================================================

    pub fn toggle_grid_waypoint(
        &self,
        target: Option<SessionId>,
        row: u8,
        col: u8,
    ) -> Result<(Arc<RoverSession>, Toggled), ManagerError> {
        Ok(self
            .registry()
            .write()
            .unwrap()
            .try_patch(target, |s| s.toggle_grid_waypoint(row, col))?)
    }

    /// Replace the mission with the coordinates in `text`; nothing changes on a bad file.
    pub fn import_mission_csv(
        &self,
        target: Option<SessionId>,
        text: &str,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        let id = self.resolve(target)?;
        match parse_mission(text) {
            Ok(points) => {
                let count = points.len();
                let (session, ()) = self.registry().write().unwrap().patch(Some(id), |s| {
                    s.set_mission_waypoints(points);
                    s.set_status(format!("Loaded {} waypoints", count));
                })?;
                Ok(session)
            }
            Err(e) => {
                warn!("Rejected mission file for {}: {}", id, e);
                self.set_status(id, "Invalid CSV format");
                Err(e.into())
            }
        }
    }

    pub fn clear_mission(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let (session, ()) = self
            .registry()
            .write()
            .unwrap()
            .patch(target, |s| s.clear_mission_waypoints())?;
        Ok(session)
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to the rover and wait for the handshake to resolve.
    ///
    /// An invalid endpoint is rejected without touching the state. An
    /// unreachable rover is not an error: the session falls back to
    /// disconnected with a status line saying why.
    pub async fn connect(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let (session, addr) = self
            .registry()
            .write()
            .unwrap()
            .try_patch(target, |s| s.begin_connect())?;
        let Some(addr) = addr else {
            debug!("{} is already {}", session.id, session.connection);
            return Ok(session);
        };

        let id = session.id;
        let endpoint = self.inner.endpoint.clone();
        let timeout = self.inner.config.connect_timeout;
        let manager = self.clone();
        debug!("Connecting {} to {}", id, addr);

        detached(async move {
            let reachable = match tokio::time::timeout(timeout, endpoint.handshake(addr)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("Handshake with {} failed: {}", addr, e);
                    false
                }
                Err(_) => {
                    warn!("Handshake with {} timed out after {:?}", addr, timeout);
                    false
                }
            };
            manager.resolve_connect(id, addr, reachable)
        })
        .await?
    }

    fn resolve_connect(
        &self,
        id: SessionId,
        addr: SocketAddrV4,
        reachable: bool,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        let (session, ()) = self.registry().write().unwrap().patch(Some(id), |s| {
            // A disconnect while the handshake was in flight wins
            if !s.connection.is_connecting() {
                return;
            }
            s.resolve_connect(reachable);
            if reachable {
                s.set_status(format!("Connected to {}", addr));
            } else {
                s.set_status(format!("Could not reach {}", addr));
            }
        })?;
        debug!("{} is {}", id, session.connection);
        Ok(session)
    }

    /// Drop the link immediately and tell the rover in the background.
    pub fn disconnect(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let (session, was_connected) = self.registry().write().unwrap().patch(target, |s| {
            let was_connected = s.connection.is_connected();
            s.disconnect();
            was_connected
        })?;

        if was_connected {
            if let Ok(addr) = session.endpoint.validate() {
                let endpoint = self.inner.endpoint.clone();
                tokio::spawn(async move {
                    if let Err(e) = endpoint.release(addr).await {
                        warn!("Release of {} failed: {}", addr, e);
                    }
                });
            }
        }
        Ok(session)
    }

    /// Find the address of a session that must be connected
    fn connected_addr(&self, target: Option<SessionId>) -> Result<(SessionId, SocketAddrV4), ManagerError> {
        let session = self.session(target)?;
        if !session.connection.is_connected() {
            return Err(RegistryError::NotConnected(session.id).into());
        }
        Ok((session.id, session.endpoint.validate()?))
    }

    // =========================================================================
    // Movement test
    // =========================================================================

    /// Mark a test as running and start it in the background.
    pub fn start_movement_test(
        &self,
        target: Option<SessionId>,
    ) -> Result<(Arc<RoverSession>, TestHandle), ManagerError> {
        let (session, addr) = self.registry().write().unwrap().try_patch(target, |s| {
            s.begin_test()?;
            s.endpoint.validate().map_err(RegistryError::from)
        })?;

        let id = session.id;
        let endpoint = self.inner.endpoint.clone();
        let timeout = self.inner.config.test_timeout;
        let manager = self.clone();
        info!("Movement test on {} at {}", id, addr);

        let handle = tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, endpoint.movement_test(addr)).await {
                Ok(Ok(())) => TestResult::Success,
                Ok(Err(e)) => {
                    warn!("Movement test on {} failed: {}", id, e);
                    TestResult::Error
                }
                Err(_) => {
                    warn!("Movement test on {} timed out after {:?}", id, timeout);
                    TestResult::Error
                }
            };
            let (session, ()) = manager.registry().write().unwrap().patch(Some(id), |s| {
                s.finish_test(result);
                s.set_status(match result {
                    TestResult::Success => "Movement test completed successfully",
                    TestResult::Error => "Movement test failed",
                });
            })?;
            Ok::<_, ManagerError>(session)
        });
        Ok((session, handle))
    }

    pub async fn run_movement_test(
        &self,
        target: Option<SessionId>,
    ) -> Result<Arc<RoverSession>, ManagerError> {
        let (_, handle) = self.start_movement_test(target)?;
        handle
            .await
            .map_err(|e| ManagerError::TaskFailed(e.to_string()))?
    }

    /// Stop the rover now; the local test state is cleared without waiting.
    pub fn force_stop(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let (id, addr) = self.connected_addr(target)?;
        let (session, ()) = self.registry().write().unwrap().patch(Some(id), |s| {
            s.abort_test();
            s.set_status("Movement stopped");
        })?;

        let endpoint = self.inner.endpoint.clone();
        tokio::spawn(async move {
            if let Err(e) = endpoint.force_stop(addr).await {
                warn!("Force stop of {} failed: {}", addr, e);
            }
        });
        Ok(session)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Explicit save. Creates the record on first save, updates it after.
    ///
    /// A pending auto-save for the session is left to run on its own timer.
    pub async fn save(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let id = self.resolve(target)?;
        let sync = self.inner.sync.clone();
        let outcome = detached(async move { sync.save(Some(id)).await }).await?;

        match outcome {
            Ok(SaveOutcome::Created(_)) => {
                self.set_status(id, "Rover saved");
                if let Err(e) = self.refresh_saved().await {
                    warn!("Could not refresh saved rovers: {}", e);
                }
            }
            Ok(SaveOutcome::Updated) => self.set_status(id, "Configuration updated"),
            Err(SyncError::Store(StoreError::Conflict)) => {
                self.set_status(id, CONFLICT_MESSAGE);
                return Err(StoreError::Conflict.into());
            }
            Err(SyncError::Endpoint(e)) => {
                self.set_status(id, e.to_string());
                return Err(e.into());
            }
            Err(SyncError::Registry(e)) => return Err(e.into()),
            Err(SyncError::Store(e)) => {
                warn!("Save of {} failed: {}", id, e);
                self.set_status(id, "Save failed");
                return Err(e.into());
            }
        }
        self.session(Some(id))
    }

    /// Fetch the saved rovers for this owner and cache them
    pub async fn refresh_saved(&self) -> Result<Vec<RemoteRecord>, ManagerError> {
        let sync = self.inner.sync.clone();
        let records =
            detached(async move { sync.store().fetch(sync.owner_id()).await }).await??;
        debug!("{} saved rovers", records.len());
        *self.inner.saved.write().unwrap() = records.clone();
        Ok(records)
    }

    pub fn saved(&self) -> Vec<RemoteRecord> {
        self.inner.saved.read().unwrap().clone()
    }

    /// Open a saved rover as a new active session
    pub async fn load_saved(&self, remote_id: &RemoteId) -> Result<Arc<RoverSession>, ManagerError> {
        let cached = self.find_saved(remote_id);
        let record = match cached {
            Some(record) => record,
            None => {
                self.refresh_saved().await?;
                self.find_saved(remote_id)
                    .ok_or_else(|| ManagerError::NoSuchRecord(remote_id.clone()))?
            }
        };
        Ok(self.registry().write().unwrap().hydrate_from_saved(&record))
    }

    fn find_saved(&self, remote_id: &RemoteId) -> Option<RemoteRecord> {
        self.inner
            .saved
            .read()
            .unwrap()
            .iter()
            .find(|r| &r.id == remote_id)
            .cloned()
    }

    // =========================================================================
    // Radio
    // =========================================================================

    /// Push the session's radio settings to the rover
    pub async fn apply_sdr(&self, target: Option<SessionId>, uri: &str) -> Result<Value, ManagerError> {
        let (id, addr) = self.connected_addr(target)?;
        let payload = SdrApplyPayload::new(uri, &self.session(Some(id))?.sdr);

        let endpoint = self.inner.endpoint.clone();
        let result = detached(async move { endpoint.apply_sdr(addr, &payload).await }).await?;
        self.report(id, result, "SDR settings applied", "SDR apply failed")
    }

    pub async fn verify_sdr(&self, target: Option<SessionId>, uri: &str) -> Result<Value, ManagerError> {
        let (id, addr) = self.connected_addr(target)?;

        let endpoint = self.inner.endpoint.clone();
        let uri = uri.to_string();
        let result = detached(async move { endpoint.verify_sdr(addr, &uri).await }).await?;
        self.report(id, result, "SDR verified", "SDR verify failed")
    }

    pub async fn transmit_gps(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, ManagerError> {
        let (id, addr) = self.connected_addr(target)?;

        let endpoint = self.inner.endpoint.clone();
        let result = detached(async move { endpoint.transmit_gps(addr).await }).await?;
        self.report(
            id,
            result,
            "GPS transmission sent",
            "Failed to trigger GPS transmission",
        )?;
        self.session(Some(id))
    }

    fn report<T>(
        &self,
        id: SessionId,
        result: Result<T, EndpointCallError>,
        ok: &str,
        failed: &str,
    ) -> Result<T, ManagerError> {
        match result {
            Ok(value) => {
                self.set_status(id, ok);
                Ok(value)
            }
            Err(e) => {
                warn!("{} on {}: {}", failed, id, e);
                self.set_status(id, format!("{}: {}", failed, e));
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Flush pending auto-saves
    pub async fn shutdown(&self) {
        self.inner.sync.shutdown().await;
        info!("Rover manager stopped");
    }
}
