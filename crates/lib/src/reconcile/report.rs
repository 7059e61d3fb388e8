//! Run reports.

use serde::Serialize;

use crate::distribute::Stage;
use crate::target::{Target, Trigger};

/// A bundle that failed to materialize on one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleFailureReport {
  pub bundle: String,
  pub template: String,
  pub error: String,
}

/// How a target finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TargetOutcome {
  /// Dry run: nothing was sent.
  Planned,
  /// Nothing desired and nothing previously managed.
  Skipped,
  /// Distributed and committed to state.
  Succeeded,
  /// Distribution failed; the target's record is unchanged.
  Failed { stage: Stage, error: String },
}

impl TargetOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, TargetOutcome::Failed { .. })
  }
}

/// Per-target results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetReport {
  pub target: Target,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cluster: Option<String>,
  /// Full desired set synchronized to the target.
  pub deployed: Vec<String>,
  /// Desired bundles not previously managed.
  pub added: Vec<String>,
  /// Bundles whose contents were written this run.
  pub written: Vec<String>,
  /// Orphans removed from the target.
  pub removed: Vec<String>,
  /// Orphans left in place because cleanup was not authorized.
  pub orphaned_retained: Vec<String>,
  /// Previously managed bundles kept because they failed to materialize.
  pub held: Vec<String>,
  pub bundle_failures: Vec<BundleFailureReport>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub trigger: Option<Trigger>,
  pub outcome: TargetOutcome,
}

/// Aggregate report of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub run_id: String,
  pub environment: String,
  pub dry_run: bool,
  pub cleanup: bool,
  pub targets: Vec<TargetReport>,
}

impl RunReport {
  pub fn target(&self, host: &str) -> Option<&TargetReport> {
    self.targets.iter().find(|t| t.target.host == host)
  }

  pub fn succeeded(&self) -> usize {
    self
      .targets
      .iter()
      .filter(|t| t.outcome == TargetOutcome::Succeeded)
      .count()
  }

  pub fn failed(&self) -> usize {
    self.targets.iter().filter(|t| t.outcome.is_failed()).count()
  }

  pub fn bundle_failures(&self) -> usize {
    self.targets.iter().map(|t| t.bundle_failures.len()).sum()
  }

  /// Whether anything went wrong: failed targets or failed bundles.
  pub fn has_failures(&self) -> bool {
    self.failed() > 0 || self.bundle_failures() > 0
  }
}
