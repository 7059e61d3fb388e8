//! Reconciliation runs.
//!
//! A run moves through `Loaded → Desired → Diffed → Distributed → Committed →
//! Persisted`:
//!
//! - **Loaded**: the environment lock is taken and the state document read.
//! - **Desired**: static bundles and materialized templates per target.
//! - **Diffed**: previous record vs desired set per target.
//! - **Distributed**: bounded per-target workers run the transport plan;
//!   cluster triggers wait for every member of their cluster.
//! - **Committed**: the run's single writer updates records of successful
//!   targets and appends history.
//! - **Persisted**: one atomic write of the state document.
//!
//! A dry run stops after `Diffed`.

mod desired;
mod diff;
mod report;
mod run;

use thiserror::Error;

use crate::inventory::TargetSelector;
use crate::overlay::OverlayError;
use crate::source::SourceError;
use crate::state::{StateError, StateLockError};
use crate::template::TemplateError;

pub use desired::{DesiredInputs, DesiredTarget, StaticBundles, desired_for_host};
pub use diff::TargetDiff;
pub use report::{BundleFailureReport, RunReport, TargetOutcome, TargetReport};
pub use run::{PlannedTarget, Reconciler, RunPlan};

#[derive(Debug, Error)]
pub enum RunError {
  #[error(transparent)]
  Lock(#[from] StateLockError),

  #[error(transparent)]
  State(#[from] StateError),

  #[error(transparent)]
  Template(#[from] TemplateError),

  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Overlay(#[from] OverlayError),

  #[error("duplicate bundle '{name}' for {target}: produced by {first} and {second}")]
  DuplicateBundle {
    target: String,
    name: String,
    first: String,
    second: String,
  },

  #[error("host not found in inventory: {0}")]
  UnknownHost(String),
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
  pub environment: String,
  /// Remove orphaned bundles.
  pub cleanup: bool,
  pub selector: TargetSelector,
  /// Deploy static bundles only.
  pub skip_templates: bool,
  /// Stop after computing the diff.
  pub dry_run: bool,
  /// Maximum concurrent target workers.
  pub parallelism: usize,
  /// Initiating user recorded in history.
  pub user: String,
}

impl RunOptions {
  pub fn new(environment: impl Into<String>) -> Self {
    Self {
      environment: environment.into(),
      cleanup: false,
      selector: TargetSelector::all(),
      skip_templates: false,
      dry_run: false,
      parallelism: default_parallelism(),
      user: crate::platform::current_user(),
    }
  }
}

/// Default worker count: available CPUs, at least 1.
pub fn default_parallelism() -> usize {
  std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
