//! # Roverlink Server
//!
//! Rover session manager with a REST API.
//!
//! This crate runs the asynchronous half of Roverlink:
//! - Drives each session's connection handshake against its rover
//! - Runs movement tests and radio commands on the rover's HTTP endpoint
//! - Saves rover configurations to a remote store, with debounced auto-save
//! - Exposes everything over a JSON REST API
//!
//! ## Architecture
//!
//! The server is built on top of [`roverlink_core`] for the pure session
//! model, with [`tokio`] providing the async runtime.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   roverlink-server                      │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │ REST API (axum)                                     ││
//! │  └──────────────────────────┬──────────────────────────┘│
//! │                             ▼                           │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │ RoverManager                                        ││
//! │  │  - RoverSessionRegistry (Arc<RwLock>)               ││
//! │  │  - Synchronizer (save, debounced auto-save)         ││
//! │  └──────────┬───────────────────────────┬──────────────┘│
//! │             ▼                           ▼               │
//! │  ┌────────────────────┐     ┌────────────────────────┐  │
//! │  │ RoverEndpoint      │     │ RemoteStore            │  │
//! │  │ (HttpRoverClient)  │     │ (FileStore, Postgrest) │  │
//! │  └────────────────────┘     └────────────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## REST API
//!
//! | Endpoint | Description |
//! |----------|-------------|
//! | `GET /v1/api/rovers` | List sessions and the active id |
//! | `POST /v1/api/rovers` | Add a blank session |
//! | `PUT /v1/api/selection` | Change the active session |
//! | `POST /v1/api/rovers/{id}/connect` | Connect (`{id}` may be `active`) |
//! | `POST /v1/api/rovers/{id}/save` | Save to the remote store |
//! | `GET /v1/api/saved` | Saved rovers for this owner |
//!
//! See [`web`] for the full route table.
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-p, --port` - HTTP server port (default: 6510)
//! - `-v` - Increase verbosity (use multiple times)
//! - `--owner` - Owner id for saved rovers
//! - `--store` - `file` (default) or `postgrest`

use clap::Parser;
use std::path::PathBuf;

pub mod config;
pub mod endpoint;
pub mod manager;
pub mod store;
pub mod sync;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

pub use manager::{ManagerError, RoverManager};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(clap::ValueEnum, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum StoreKind {
    /// JSON files in the local data directory
    #[default]
    File,
    /// PostgREST / Supabase `rover_instances` table
    Postgrest,
}

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Port for webserver
    #[arg(short, long, default_value_t = 6510)]
    pub port: u16,

    /// Owner id used to scope saved rovers
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Where saved rovers are kept
    #[arg(long, default_value_t, value_enum)]
    pub store: StoreKind,

    /// Base URL of the PostgREST endpoint, e.g. https://<project>.supabase.co/rest/v1
    #[arg(long)]
    pub store_url: Option<String>,

    /// API key sent to the PostgREST endpoint
    #[arg(long, env = "ROVERLINK_STORE_KEY")]
    pub store_key: Option<String>,

    /// Directory for the file store
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Quiet period before configuration edits are auto-saved
    #[arg(long, default_value_t = 800)]
    pub autosave_ms: u64,

    /// Give up on a connection handshake after this long
    #[arg(long, default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Give up on a movement test after this long
    #[arg(long, default_value_t = 30000)]
    pub test_timeout_ms: u64,
}
