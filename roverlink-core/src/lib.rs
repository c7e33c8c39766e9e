//! # Roverlink Core
//!
//! Platform-independent session model for managing several rovers at once.
//!
//! This crate contains the pure state and validation logic with **zero I/O
//! dependencies**. Everything that touches the network (handshakes, the remote
//! store, timers) lives in `roverlink-server`, which drives the transitions
//! defined here.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  roverlink-core (no tokio, no sockets)                      │
//! │  ├── config/      (nav + SDR settings, defaults, decode)    │
//! │  ├── waypoint/    (grid preview + mission waypoints)        │
//! │  ├── csv_import/  (coordinate file parser)                  │
//! │  ├── connection/  (endpoint validation, state machine)      │
//! │  ├── session/     (RoverSession value)                      │
//! │  └── registry/    (ordered sessions, active selector)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                 ┌────────────┴────────────┐
//!                 │  roverlink-server       │
//!                 │  (tokio, axum, reqwest) │
//!                 └─────────────────────────┘
//! ```
//!
//! ## Example: Managing Sessions
//!
//! ```rust
//! use roverlink_core::{NavPatch, RoverSessionRegistry};
//!
//! let mut registry = RoverSessionRegistry::new();
//! let second = registry.add_session();
//! assert_eq!(registry.active_id(), second.id);
//!
//! registry
//!     .update_nav(None, &NavPatch { base_speed: Some(1.2), ..Default::default() })
//!     .unwrap();
//! assert_eq!(registry.active().nav.base_speed, 1.2);
//! ```
//!
//! ## Example: Importing a Mission
//!
//! ```rust
//! use roverlink_core::csv_import::parse_mission;
//!
//! let mission = parse_mission("1,2\n3,4").unwrap();
//! assert_eq!(mission.len(), 2);
//!
//! let err = parse_mission("1,2\nbad").unwrap_err();
//! assert_eq!(err.line, 2);
//! ```

pub mod config;
pub mod connection;
pub mod csv_import;
pub mod error;
pub mod record;
pub mod registry;
pub mod session;
pub mod waypoint;

// Re-export commonly used types
pub use config::{Direction, GainMode, NavConfig, NavPatch, SdrConfig, SdrPatch};
pub use connection::{ConnectionState, Endpoint, TestResult, TestState};
pub use error::{CsvError, EndpointError, RegistryError, WaypointError};
pub use record::{ConfigUpdate, NewRecord, RemoteId, RemoteRecord};
pub use registry::{RegistrySnapshot, RoverSessionRegistry};
pub use session::{RoverSession, SessionId, SessionPatch};
pub use waypoint::{GridCell, GridWaypoints, MissionWaypoint, Toggled, GRID_SIZE, MARKER_CELL};
