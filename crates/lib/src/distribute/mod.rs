//! Distribution contract.
//!
//! The engine decides what goes where; a [`Transport`] moves the bytes and
//! controls services. For each target the engine hands the transport an
//! ordered plan:
//!
//! 1. sync the full desired bundle set,
//! 2. remove exactly the orphan set, when cleanup is authorized,
//! 3. issue the one trigger appropriate to the target's category.
//!
//! The trigger is never issued when step 1 failed. Triggers for
//! cluster-scoped categories are issued by the reconciler once every member
//! of the cluster has finished steps 1 and 2.

mod directory;

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::bundle::AppBundle;
use crate::target::{Target, Trigger};
use crate::util::hash::DirHashError;

pub use directory::DirectoryTransport;

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("{target}: I/O error at {path}: {source}")]
  Io {
    target: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{target}: {source}")]
  Hash {
    target: String,
    #[source]
    source: DirHashError,
  },

  #[error("{target}: {message}")]
  Rejected { target: String, message: String },
}

/// Moves bundles to targets and controls services on them.
///
/// Implementations must be idempotent: syncing the same bundle set twice
/// leaves the target in the same state as syncing it once.
pub trait Transport: Send + Sync {
  /// Make every bundle in `bundles` present on `target` with exactly the
  /// given contents. Bundles not listed are left alone.
  fn sync(&self, target: &Target, bundles: &[AppBundle]) -> Result<SyncSummary, TransportError>;

  /// Remove the named bundles from `target`. Missing names are not an error.
  fn remove(&self, target: &Target, names: &[String]) -> Result<(), TransportError>;

  /// Issue a post-action trigger on `target`.
  fn trigger(&self, target: &Target, trigger: Trigger) -> Result<(), TransportError>;
}

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
  /// Bundles written because they were missing or different.
  pub written: Vec<String>,
  /// Bundles already present with identical contents.
  pub unchanged: Vec<String>,
}

/// Ordered work for one target.
#[derive(Debug, Clone)]
pub struct TargetPlan {
  pub target: Target,
  pub bundles: Vec<AppBundle>,
  /// Names to remove; empty unless cleanup is authorized.
  pub remove: Vec<String>,
  /// Trigger issued by the worker itself. `None` for cluster-scoped
  /// categories, whose trigger is deferred to the cluster barrier.
  pub trigger: Option<Trigger>,
}

/// Step of the per-target plan that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
  Sync,
  Remove,
  Trigger,
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      Stage::Sync => "sync",
      Stage::Remove => "remove",
      Stage::Trigger => "trigger",
    })
  }
}

/// A failed plan step.
#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct StageError {
  pub stage: Stage,
  #[source]
  pub source: TransportError,
}

/// Result of executing one target's plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Executed {
  pub sync: SyncSummary,
  pub removed: Vec<String>,
  pub triggered: Option<Trigger>,
}

/// Run steps 1-3 of `plan` against `transport`, stopping at the first failure.
pub fn execute_plan(transport: &dyn Transport, plan: &TargetPlan) -> Result<Executed, StageError> {
  let target = &plan.target;

  let sync = transport
    .sync(target, &plan.bundles)
    .map_err(|source| StageError {
      stage: Stage::Sync,
      source,
    })?;
  debug!(
    target = %target,
    written = sync.written.len(),
    unchanged = sync.unchanged.len(),
    "synced bundles"
  );

  if !plan.remove.is_empty() {
    transport
      .remove(target, &plan.remove)
      .map_err(|source| StageError {
        stage: Stage::Remove,
        source,
      })?;
    info!(target = %target, removed = ?plan.remove, "removed orphaned bundles");
  }

  if let Some(trigger) = plan.trigger {
    transport.trigger(target, trigger).map_err(|source| StageError {
      stage: Stage::Trigger,
      source,
    })?;
    info!(target = %target, trigger = %trigger, "issued trigger");
  }

  Ok(Executed {
    sync,
    removed: plan.remove.clone(),
    triggered: plan.trigger,
  })
}

#[cfg(test)]
pub(crate) mod testing {
  //! Recording transport for tests.

  use std::collections::HashSet;
  use std::sync::Mutex;

  use super::*;

  /// One recorded transport call.
  #[derive(Debug, Clone, PartialEq, Eq)]
  pub enum Call {
    Sync(Target, Vec<String>),
    Remove(Target, Vec<String>),
    Trigger(Target, Trigger),
  }

  /// Records calls; can be told to fail a stage for specific hosts.
  #[derive(Debug, Default)]
  pub struct RecordingTransport {
    pub calls: Mutex<Vec<Call>>,
    pub fail_sync: HashSet<String>,
    pub fail_trigger: HashSet<String>,
  }

  impl RecordingTransport {
    pub fn new() -> Self {
      Self::default()
    }

    pub fn failing_sync(hosts: &[&str]) -> Self {
      Self {
        fail_sync: hosts.iter().map(|h| h.to_string()).collect(),
        ..Self::default()
      }
    }

    pub fn failing_trigger(hosts: &[&str]) -> Self {
      Self {
        fail_trigger: hosts.iter().map(|h| h.to_string()).collect(),
        ..Self::default()
      }
    }

    pub fn calls(&self) -> Vec<Call> {
      self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, host: &str) -> Vec<Call> {
      self
        .calls()
        .into_iter()
        .filter(|c| match c {
          Call::Sync(t, _) | Call::Remove(t, _) | Call::Trigger(t, _) => t.host == host,
        })
        .collect()
    }
  }

  fn rejected(target: &Target, message: &str) -> TransportError {
    TransportError::Rejected {
      target: target.to_string(),
      message: message.to_string(),
    }
  }

  impl Transport for RecordingTransport {
    fn sync(&self, target: &Target, bundles: &[AppBundle]) -> Result<SyncSummary, TransportError> {
      if self.fail_sync.contains(&target.host) {
        return Err(rejected(target, "connection refused"));
      }
      let names: Vec<String> = bundles.iter().map(|b| b.name.clone()).collect();
      self.calls.lock().unwrap().push(Call::Sync(target.clone(), names.clone()));
      Ok(SyncSummary {
        written: names,
        unchanged: Vec::new(),
      })
    }

    fn remove(&self, target: &Target, names: &[String]) -> Result<(), TransportError> {
      self.calls.lock().unwrap().push(Call::Remove(target.clone(), names.to_vec()));
      Ok(())
    }

    fn trigger(&self, target: &Target, trigger: Trigger) -> Result<(), TransportError> {
      if self.fail_trigger.contains(&target.host) {
        return Err(rejected(target, "service control failed"));
      }
      self.calls.lock().unwrap().push(Call::Trigger(target.clone(), trigger));
      Ok(())
    }
  }
}
