//! Deployment targets.
//!
//! A [`Target`] is the identity key of managed state: a host plus the
//! deployment-path category its bundles are synchronized into.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Destination directory class on a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathCategory {
  /// Deployment server, served to forwarders.
  #[serde(rename = "deployment-apps")]
  DeploymentApps,
  /// Indexer cluster manager, pushed to peers.
  #[serde(rename = "manager-apps")]
  ManagerApps,
  /// Search-head cluster deployer, pushed to members.
  #[serde(rename = "shcluster/apps")]
  ShclusterApps,
  /// Standalone instance, used in place.
  #[serde(rename = "apps")]
  Apps,
}

impl PathCategory {
  pub const ALL: [PathCategory; 4] = [
    PathCategory::DeploymentApps,
    PathCategory::ManagerApps,
    PathCategory::ShclusterApps,
    PathCategory::Apps,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      PathCategory::DeploymentApps => "deployment-apps",
      PathCategory::ManagerApps => "manager-apps",
      PathCategory::ShclusterApps => "shcluster/apps",
      PathCategory::Apps => "apps",
    }
  }

  /// Post-sync action required for this category.
  pub fn trigger(self) -> Trigger {
    match self {
      PathCategory::ManagerApps | PathCategory::ShclusterApps => Trigger::ClusterBundleApply,
      PathCategory::DeploymentApps => Trigger::Reload,
      PathCategory::Apps => Trigger::Restart,
    }
  }

  /// Whether the trigger applies to a whole cluster rather than one host.
  pub fn is_cluster_scoped(self) -> bool {
    matches!(self, PathCategory::ManagerApps | PathCategory::ShclusterApps)
  }
}

impl fmt::Display for PathCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for PathCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    PathCategory::ALL
      .into_iter()
      .find(|c| c.as_str() == s)
      .ok_or_else(|| format!("unknown deployment path category '{s}'"))
  }
}

/// Service action issued after a successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
  ClusterBundleApply,
  Reload,
  Restart,
}

impl Trigger {
  pub fn as_str(self) -> &'static str {
    match self {
      Trigger::ClusterBundleApply => "cluster-bundle-apply",
      Trigger::Reload => "reload",
      Trigger::Restart => "restart",
    }
  }
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A `(host, category)` pair receiving bundles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
  pub host: String,
  pub category: PathCategory,
}

impl Target {
  pub fn new(host: impl Into<String>, category: PathCategory) -> Self {
    Self {
      host: host.into(),
      category,
    }
  }
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.category)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn category_roundtrips_through_str() {
    for category in PathCategory::ALL {
      assert_eq!(category.as_str().parse::<PathCategory>().unwrap(), category);
    }
  }

  #[test]
  fn category_serializes_as_path() {
    assert_eq!(
      serde_json::to_string(&PathCategory::ShclusterApps).unwrap(),
      "\"shcluster/apps\""
    );
  }

  #[test]
  fn triggers_by_category() {
    assert_eq!(PathCategory::ManagerApps.trigger(), Trigger::ClusterBundleApply);
    assert_eq!(PathCategory::ShclusterApps.trigger(), Trigger::ClusterBundleApply);
    assert_eq!(PathCategory::DeploymentApps.trigger(), Trigger::Reload);
    assert_eq!(PathCategory::Apps.trigger(), Trigger::Restart);
  }

  #[test]
  fn only_cluster_categories_are_cluster_scoped() {
    assert!(PathCategory::ManagerApps.is_cluster_scoped());
    assert!(PathCategory::ShclusterApps.is_cluster_scoped());
    assert!(!PathCategory::DeploymentApps.is_cluster_scoped());
    assert!(!PathCategory::Apps.is_cluster_scoped());
  }

  #[test]
  fn target_display() {
    let target = Target::new("cm01", PathCategory::ManagerApps);
    assert_eq!(target.to_string(), "cm01:manager-apps");
  }
}
