//! Managed state: which bundles the engine owns on each target, plus an
//! append-only deployment history.
//!
//! One JSON document is kept per environment. Runs load it once, and only the
//! run's single writer commits results into it after every worker has
//! finished.

mod lock;
mod storage;
mod types;

use std::io;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

pub use lock::{LockMetadata, LockMode, StateLock, StateLockError};
pub use storage::StateFiles;
pub use types::{DeploymentEvent, LastDeployment, ManagedAppRecord, StateStore};

#[derive(Debug, Error)]
pub enum StateError {
  #[error("invalid environment name '{0}'")]
  InvalidEnvironment(String),

  #[error("failed to create state directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read state file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("state file {path} is corrupt: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize state: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write state file {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Current time as seconds since the Unix epoch.
pub fn now_unix() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}
