//! Runtime configuration derived from the command line.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::{Cli, StoreKind};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("--store postgrest requires --store-url")]
    MissingStoreUrl,
    #[error("Cannot determine a data directory, use --data-dir")]
    NoDataDir,
}

pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "roverlink", "roverlink")
}

/// Directory that holds the file store, from `--data-dir` or the platform default.
pub fn data_dir(args: &Cli) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = &args.data_dir {
        return Ok(dir.clone());
    }
    get_project_dirs()
        .map(|dirs| dirs.data_dir().to_owned())
        .ok_or(ConfigError::NoDataDir)
}

/// Timing and identity knobs for the session manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Owner of every record this instance creates in the remote store
    pub owner_id: String,
    /// Quiet period before an edited configuration is written back
    pub autosave_delay: Duration,
    /// Upper bound on a connection handshake
    pub connect_timeout: Duration,
    /// Upper bound on a movement test request
    pub test_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            owner_id: "local".to_string(),
            autosave_delay: Duration::from_millis(800),
            connect_timeout: Duration::from_secs(5),
            test_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&Cli> for ManagerConfig {
    fn from(args: &Cli) -> Self {
        ManagerConfig {
            owner_id: args.owner.clone(),
            autosave_delay: Duration::from_millis(args.autosave_ms),
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            test_timeout: Duration::from_millis(args.test_timeout_ms),
        }
    }
}

/// Where saved rovers live
#[derive(Clone, PartialEq)]
pub enum StoreConfig {
    File { dir: PathBuf },
    Postgrest { url: String, api_key: Option<String> },
}

// The API key never reaches the log
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreConfig::File { dir } => f.debug_struct("File").field("dir", dir).finish(),
            StoreConfig::Postgrest { url, api_key } => f
                .debug_struct("Postgrest")
                .field("url", url)
                .field("api_key", &api_key.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

impl StoreConfig {
    pub fn from_cli(args: &Cli) -> Result<Self, ConfigError> {
        match args.store {
            StoreKind::File => Ok(StoreConfig::File {
                dir: data_dir(args)?,
            }),
            StoreKind::Postgrest => Ok(StoreConfig::Postgrest {
                url: args.store_url.clone().ok_or(ConfigError::MissingStoreUrl)?,
                api_key: args.store_key.clone(),
            }),
        }
    }
}
