//! Rover session state.
//!
//! A [`RoverSession`] is everything the operator has open for one vehicle:
//! where it lives on the network, how far the link has come up, its
//! navigation and radio configuration, and the waypoints drawn or imported
//! for it. Sessions are plain values; the registry replaces them wholesale on
//! every change.

use serde::{Deserialize, Serialize, Serializer};
use std::net::SocketAddrV4;
use std::str::FromStr;

use crate::config::{NavConfig, NavPatch, SdrConfig, SdrPatch};
use crate::connection::{ConnectionState, Endpoint, TestResult, TestState};
use crate::error::{EndpointError, RegistryError, WaypointError};
use crate::record::{RemoteId, RemoteRecord};
use crate::waypoint::{GridCell, GridWaypoints, MissionWaypoint, Toggled};

const SESSION_ID_PREFIX: &str = "rover-";

/// Registry-local session identifier, rendered as `rover-N`.
///
/// Allocated from a counter that only moves forward, so an id is never
/// handed out twice in one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", SESSION_ID_PREFIX, self.0)
    }
}

impl FromStr for SessionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(SESSION_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(SessionId)
            .ok_or_else(|| format!("Invalid session id: {}", s))
    }
}

impl Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Edit of the free-text fields of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoverSession {
    pub id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub display_name: String,
    pub endpoint: Endpoint,
    pub connection: ConnectionState,
    pub grid_waypoints: GridWaypoints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_waypoints: Option<Vec<MissionWaypoint>>,
    pub nav: NavConfig,
    pub sdr: SdrConfig,
    pub test_state: TestState,
    /// Last user-facing status line for this rover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl RoverSession {
    /// A fresh, unsaved session with default configuration
    pub fn blank(id: SessionId) -> Self {
        RoverSession {
            id,
            remote_id: None,
            display_name: format!("Rover {}", id.0),
            endpoint: Endpoint::default(),
            connection: ConnectionState::Disconnected,
            grid_waypoints: GridWaypoints::new(),
            mission_waypoints: None,
            nav: NavConfig::default(),
            sdr: SdrConfig::default(),
            test_state: TestState::default(),
            status: None,
        }
    }

    /// A session restored from a saved record, configuration decoded field by field
    pub fn from_record(id: SessionId, record: &RemoteRecord) -> Self {
        RoverSession {
            remote_id: Some(record.id.clone()),
            display_name: record.name.clone(),
            endpoint: Endpoint::new(&record.host, &record.port.to_string()),
            nav: NavConfig::decode(record.nav_config.as_ref()),
            sdr: SdrConfig::decode(record.sdr_config.as_ref()),
            ..RoverSession::blank(id)
        }
    }

    pub fn is_saved(&self) -> bool {
        self.remote_id.is_some()
    }

    pub fn set_details(&mut self, patch: &SessionPatch) {
        if let Some(name) = &patch.display_name {
            self.display_name = name.clone();
        }
        if let Some(host) = &patch.host {
            self.endpoint.host = host.clone();
        }
        if let Some(port) = &patch.port {
            self.endpoint.port = port.clone();
        }
    }

    pub fn update_nav(&mut self, patch: &NavPatch) {
        self.nav = self.nav.apply(patch);
    }

    pub fn update_sdr(&mut self, patch: &SdrPatch) {
        self.sdr = self.sdr.apply(patch);
    }

    pub fn toggle_grid_waypoint(&mut self, row: u8, col: u8) -> Result<Toggled, WaypointError> {
        self.grid_waypoints.toggle(GridCell::new(row, col))
    }

    pub fn set_mission_waypoints(&mut self, points: Vec<MissionWaypoint>) {
        self.mission_waypoints = Some(points);
    }

    pub fn clear_mission_waypoints(&mut self) {
        self.mission_waypoints = None;
    }

    /// Start a connection attempt.
    ///
    /// Returns the address to dial when a new attempt was started, `None`
    /// when one is already in flight or the link is up.
    pub fn begin_connect(&mut self) -> Result<Option<SocketAddrV4>, EndpointError> {
        let addr = self.endpoint.validate()?;
        if self.connection != ConnectionState::Disconnected {
            return Ok(None);
        }
        self.connection = self.connection.connect();
        Ok(Some(addr))
    }

    pub fn resolve_connect(&mut self, reachable: bool) {
        self.connection = self.connection.resolved(reachable);
    }

    pub fn disconnect(&mut self) {
        self.connection = self.connection.disconnect();
    }

    /// Mark a movement test as running.
    pub fn begin_test(&mut self) -> Result<(), RegistryError> {
        if !self.connection.is_connected() {
            return Err(RegistryError::NotConnected(self.id));
        }
        if self.test_state.running {
            return Err(RegistryError::TestAlreadyRunning(self.id));
        }
        self.test_state = self.test_state.started();
        Ok(())
    }

    pub fn finish_test(&mut self, result: TestResult) {
        self.test_state = self.test_state.finished(result);
    }

    pub fn abort_test(&mut self) {
        self.test_state = self.test_state.aborted();
    }

    /// Record the store id after the first successful save.
    ///
    /// Returns false, leaving the session untouched, if an id is already set.
    pub fn assign_remote_id(&mut self, id: RemoteId) -> bool {
        if self.remote_id.is_some() {
            return false;
        }
        self.remote_id = Some(id);
        true
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }
}
