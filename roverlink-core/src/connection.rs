//! Connection state machine for rover sessions.
//!
//! This module provides the platform-independent half of a rover connection:
//! endpoint validation and the pure state transitions. The server drives the
//! transitions from its async I/O layer.
//!
//! # Architecture
//!
//! ```text
//!              connect() [endpoint valid]
//! ┌──────────────┐ ─────────────────────▶ ┌────────────┐
//! │ Disconnected │                        │ Connecting │
//! └──────────────┘ ◀───────────────────── └────────────┘
//!        ▲          resolved(unreachable)        │
//!        │                                       │ resolved(reachable)
//!        │            disconnect()               ▼
//!        └─────────────────────────────────  ┌───────────┐
//!                                            │ Connected │
//!                                            └───────────┘
//! ```
//!
//! # Usage
//!
//! ```rust
//! use roverlink_core::connection::{ConnectionState, Endpoint};
//!
//! let endpoint = Endpoint::new("192.168.0.159", "8000");
//! assert!(endpoint.validate().is_ok());
//!
//! let state = ConnectionState::Disconnected.connect();
//! assert!(state.is_connecting());
//! let state = state.resolved(true);
//! assert!(state.is_connected());
//! ```

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::EndpointError;

// =============================================================================
// Endpoint
// =============================================================================

/// Network address of a rover as typed by the operator.
///
/// Both parts are kept as free text so half-typed values survive editing;
/// [`Endpoint::validate`] decides whether a connection attempt is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(host: &str, port: &str) -> Self {
        Endpoint {
            host: host.to_string(),
            port: port.to_string(),
        }
    }

    /// Check host and port, returning the socket address to dial.
    pub fn validate(&self) -> Result<SocketAddrV4, EndpointError> {
        let ip = parse_host(&self.host)?;
        let port = parse_port(&self.port)?;
        Ok(SocketAddrV4::new(ip, port))
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Base URL for HTTP requests to this rover
    pub fn base_url(&self) -> Result<String, EndpointError> {
        let addr = self.validate()?;
        Ok(format!("http://{}:{}", addr.ip(), addr.port()))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a dotted-quad IPv4 address. Octets with leading zeros are rejected.
pub fn parse_host(host: &str) -> Result<Ipv4Addr, EndpointError> {
    host.parse::<Ipv4Addr>()
        .map_err(|_| EndpointError::InvalidHost(host.to_string()))
}

/// Parse a TCP port in 1..=65535. Only plain decimal digits are accepted.
pub fn parse_port(port: &str) -> Result<u16, EndpointError> {
    let invalid = || EndpointError::InvalidPort(port.to_string());
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match port.parse::<u16>() {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(invalid()),
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle of a rover session's link to its vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected, no connection attempt in progress
    #[default]
    Disconnected,
    /// Handshake in flight
    Connecting,
    /// Handshake succeeded; commands may be sent
    Connected,
}

impl ConnectionState {
    /// Check if the connection is usable for sending commands
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Check if connection attempt is in progress
    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }

    /// Begin a connection attempt.
    ///
    /// Only leaves `Disconnected`; connecting twice is a no-op. Endpoint
    /// validation happens before this is called.
    pub fn connect(self) -> Self {
        match self {
            ConnectionState::Disconnected => ConnectionState::Connecting,
            other => other,
        }
    }

    /// Apply the outcome of a handshake.
    ///
    /// Only applies while still `Connecting`, so a handshake that completes
    /// after the operator disconnected is dropped.
    pub fn resolved(self, reachable: bool) -> Self {
        match (self, reachable) {
            (ConnectionState::Connecting, true) => ConnectionState::Connected,
            (ConnectionState::Connecting, false) => ConnectionState::Disconnected,
            (other, _) => other,
        }
    }

    /// Drop the link. Always permitted.
    pub fn disconnect(self) -> Self {
        ConnectionState::Disconnected
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

// =============================================================================
// Movement test
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    Success,
    Error,
}

/// Outcome of the most recent movement test. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestState {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<TestResult>,
}

impl TestState {
    pub fn started(self) -> Self {
        TestState {
            running: true,
            last_result: self.last_result,
        }
    }

    pub fn finished(self, result: TestResult) -> Self {
        TestState {
            running: false,
            last_result: Some(result),
        }
    }

    /// Operator pressed stop; the test counts as failed.
    pub fn aborted(self) -> Self {
        self.finished(TestResult::Error)
    }
}

// =============================================================================
// Tests
// =============================================================================
