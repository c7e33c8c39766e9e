//! Error types for local validation
//!
//! Everything in here is rejected before any network call is made, so these
//! errors are returned as values and surfaced to the operator inline.

use thiserror::Error;

use crate::session::SessionId;

/// Errors from validating a rover's network endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// Host is not a dotted-quad IPv4 address
    #[error("Invalid IPv4 address '{0}'")]
    InvalidHost(String),

    /// Port is not an integer in 1..=65535
    #[error("Invalid port '{0}'")]
    InvalidPort(String),
}

/// Errors from editing the grid waypoint set
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaypointError {
    /// The cell holds the vehicle marker
    #[error("Cell ({row}, {col}) is occupied by the rover marker")]
    MarkerCell { row: u8, col: u8 },

    /// The cell lies outside the preview grid
    #[error("Cell ({row}, {col}) is outside the {size}x{size} grid")]
    OutOfGrid { row: u8, col: u8, size: u8 },
}

/// A coordinate file that could not be imported.
///
/// The import is all-or-nothing, so a single bad line rejects the whole file.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid coordinate on line {line}: {reason}")]
pub struct CsvError {
    /// 1-based line number in the file
    pub line: u64,
    pub reason: String,
}

/// Errors from registry operations and state transitions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No such rover session '{0}'")]
    NoSuchSession(SessionId),

    #[error("Disconnect rover '{0}' before deleting")]
    DeleteWhileConnected(SessionId),

    #[error("Rover '{0}' is not connected")]
    NotConnected(SessionId),

    #[error("A movement test is already running on rover '{0}'")]
    TestAlreadyRunning(SessionId),

    #[error("{0}")]
    Endpoint(#[from] EndpointError),

    #[error("{0}")]
    Waypoint(#[from] WaypointError),
}
