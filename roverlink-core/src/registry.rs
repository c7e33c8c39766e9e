//! Session registry
//!
//! Owns the ordered list of rover sessions and the active selector. Every
//! change is an immutable patch: the addressed session is cloned, modified,
//! and swapped back in as a new `Arc`, so snapshots handed out earlier keep
//! describing the state they were taken from.
//!
//! The registry always holds at least one session and the active id always
//! names one of them.

use serde::Serialize;
use std::sync::Arc;

use crate::config::{NavPatch, SdrPatch};
use crate::error::RegistryError;
use crate::record::RemoteRecord;
use crate::session::{RoverSession, SessionId, SessionPatch};

/// Point-in-time view of the registry for the API
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub active: SessionId,
    pub sessions: Vec<Arc<RoverSession>>,
}

#[derive(Debug)]
pub struct RoverSessionRegistry {
    sessions: Vec<Arc<RoverSession>>,
    active: SessionId,
    next_id: u64,
}

impl Default for RoverSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoverSessionRegistry {
    /// Create a registry holding a single blank, active session.
    pub fn new() -> Self {
        let mut registry = RoverSessionRegistry {
            sessions: Vec::new(),
            active: SessionId(0),
            next_id: 1,
        };
        let first = registry.alloc_id();
        registry.sessions.push(Arc::new(RoverSession::blank(first)));
        registry.active = first;
        registry
    }

    fn alloc_id(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id += 1;
        id
    }

    fn index_of(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn sessions(&self) -> &[Arc<RoverSession>] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> SessionId {
        self.active
    }

    pub fn active(&self) -> Arc<RoverSession> {
        match self.get(self.active) {
            Some(session) => session,
            // The selector is only ever set to a present id
            None => panic!("active session {} missing from registry", self.active),
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<RoverSession>> {
        self.index_of(id).map(|i| self.sessions[i].clone())
    }

    /// Resolve an optional target to a present session id; `None` is the active one.
    pub fn resolve(&self, target: Option<SessionId>) -> Result<SessionId, RegistryError> {
        match target {
            None => Ok(self.active),
            Some(id) if self.index_of(id).is_some() => Ok(id),
            Some(id) => Err(RegistryError::NoSuchSession(id)),
        }
    }

    pub fn session(&self, target: Option<SessionId>) -> Result<Arc<RoverSession>, RegistryError> {
        let id = self.resolve(target)?;
        self.get(id).ok_or(RegistryError::NoSuchSession(id))
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            active: self.active,
            sessions: self.sessions.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Collection changes
    // -------------------------------------------------------------------------

    /// Append a blank session and make it active.
    pub fn add_session(&mut self) -> Arc<RoverSession> {
        let id = self.alloc_id();
        let session = Arc::new(RoverSession::blank(id));
        self.sessions.push(session.clone());
        self.active = id;
        log::debug!("Added rover session {}", id);
        session
    }

    pub fn select_session(&mut self, id: SessionId) -> Result<(), RegistryError> {
        self.resolve(Some(id))?;
        self.active = id;
        Ok(())
    }

    /// Open a saved record as a new session at the front of the list and make it active.
    pub fn hydrate_from_saved(&mut self, record: &RemoteRecord) -> Arc<RoverSession> {
        let id = self.alloc_id();
        let session = Arc::new(RoverSession::from_record(id, record));
        self.sessions.insert(0, session.clone());
        self.active = id;
        log::debug!("Loaded saved rover {} as session {}", record.id, id);
        session
    }

    /// Remove a session.
    ///
    /// A connected session is refused. Removing the last session leaves a
    /// fresh blank one in its place. Returns the removed session so the caller
    /// can clean up anything tied to it remotely.
    pub fn delete_session(&mut self, id: SessionId) -> Result<Arc<RoverSession>, RegistryError> {
        let index = self.index_of(id).ok_or(RegistryError::NoSuchSession(id))?;
        if self.sessions[index].connection.is_connected() {
            return Err(RegistryError::DeleteWhileConnected(id));
        }

        let removed = self.sessions.remove(index);

        if self.sessions.is_empty() {
            let fresh = self.alloc_id();
            self.sessions.push(Arc::new(RoverSession::blank(fresh)));
        }
        if self.active == id {
            self.active = self.sessions[0].id;
        }

        log::debug!("Deleted rover session {}", id);
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // Patches
    // -------------------------------------------------------------------------

    /// Apply a fallible edit to the addressed session.
    ///
    /// The edit runs on a copy; nothing is replaced if it fails.
    pub fn try_patch<T, E, F>(
        &mut self,
        target: Option<SessionId>,
        edit: F,
    ) -> Result<(Arc<RoverSession>, T), RegistryError>
    where
        F: FnOnce(&mut RoverSession) -> Result<T, E>,
        E: Into<RegistryError>,
    {
        let id = self.resolve(target)?;
        let index = self.index_of(id).ok_or(RegistryError::NoSuchSession(id))?;

        let mut next = RoverSession::clone(&self.sessions[index]);
        let out = edit(&mut next).map_err(Into::into)?;
        let next = Arc::new(next);
        self.sessions[index] = next.clone();
        Ok((next, out))
    }

    pub fn patch<T, F>(
        &mut self,
        target: Option<SessionId>,
        edit: F,
    ) -> Result<(Arc<RoverSession>, T), RegistryError>
    where
        F: FnOnce(&mut RoverSession) -> T,
    {
        self.try_patch(target, |s| Ok::<T, RegistryError>(edit(s)))
    }

    pub fn update_session(
        &mut self,
        target: Option<SessionId>,
        patch: &SessionPatch,
    ) -> Result<Arc<RoverSession>, RegistryError> {
        self.patch(target, |s| s.set_details(patch)).map(|(s, _)| s)
    }

    pub fn update_nav(
        &mut self,
        target: Option<SessionId>,
        patch: &NavPatch,
    ) -> Result<Arc<RoverSession>, RegistryError> {
        self.patch(target, |s| s.update_nav(patch)).map(|(s, _)| s)
    }

    pub fn update_sdr(
        &mut self,
        target: Option<SessionId>,
        patch: &SdrPatch,
    ) -> Result<Arc<RoverSession>, RegistryError> {
        self.patch(target, |s| s.update_sdr(patch)).map(|(s, _)| s)
    }
}

// =============================================================================
// Tests
// =============================================================================
