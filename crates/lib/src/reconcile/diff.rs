//! Per-target drift computation.

use std::collections::BTreeSet;

use serde::Serialize;

/// Difference between what a target should have and what the store says the
/// engine put there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetDiff {
  /// Names recorded as managed before this run.
  pub previous: BTreeSet<String>,
  /// Names this run wants present.
  pub desired: BTreeSet<String>,
  /// Desired but not previously managed.
  pub added: BTreeSet<String>,
  /// Desired and previously managed.
  pub unchanged: BTreeSet<String>,
  /// Previously managed, no longer desired, eligible for removal.
  pub orphaned: BTreeSet<String>,
  /// Previously managed, not desired because materialization failed.
  /// Never removed.
  pub held: BTreeSet<String>,
}

impl TargetDiff {
  /// Compute the diff for one target.
  ///
  /// `failed` holds names of bundles that failed to materialize for this
  /// target in this run.
  pub fn compute(previous: &BTreeSet<String>, desired: &BTreeSet<String>, failed: &BTreeSet<String>) -> Self {
    let added = desired.difference(previous).cloned().collect();
    let unchanged = desired.intersection(previous).cloned().collect();

    let mut orphaned = BTreeSet::new();
    let mut held = BTreeSet::new();
    for name in previous.difference(desired) {
      if failed.contains(name) {
        held.insert(name.clone());
      } else {
        orphaned.insert(name.clone());
      }
    }

    Self {
      previous: previous.clone(),
      desired: desired.clone(),
      added,
      unchanged,
      orphaned,
      held,
    }
  }

  /// The record to commit after a successful distribution.
  ///
  /// With cleanup the orphans are dropped; without it they stay so the drift
  /// is still visible next run.
  pub fn next_record(&self, cleanup: bool) -> BTreeSet<String> {
    let mut next: BTreeSet<String> = if cleanup {
      self.previous.difference(&self.orphaned).cloned().collect()
    } else {
      self.previous.clone()
    };
    next.extend(self.desired.iter().cloned());
    next
  }

  /// Names the transport is asked to remove.
  pub fn removals(&self, cleanup: bool) -> Vec<String> {
    if cleanup {
      self.orphaned.iter().cloned().collect()
    } else {
      Vec::new()
    }
  }

  pub fn is_noop(&self) -> bool {
    self.previous.is_empty() && self.desired.is_empty()
  }
}
