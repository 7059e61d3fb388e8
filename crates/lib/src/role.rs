//! Host roles and the template role sections they consume.
//!
//! A host declares exactly one [`HostRole`] in the inventory. The role decides
//! the host's deployment-path category (see [`crate::target::PathCategory`])
//! and which [`TemplateRole`] sections of an app template are materialized
//! for it: a cluster manager receives the indexer bundles it pushes to its
//! peers, a deployment server receives the forwarder bundles it serves.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::target::PathCategory;

/// Role a host plays in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
  #[serde(alias = "cluster_master")]
  ClusterManager,
  #[serde(alias = "deployer")]
  ShcDeployer,
  DeploymentServer,
  Indexer,
  SearchHead,
  HeavyForwarder,
  UniversalForwarder,
  Standalone,
}

impl HostRole {
  pub const ALL: [HostRole; 8] = [
    HostRole::ClusterManager,
    HostRole::ShcDeployer,
    HostRole::DeploymentServer,
    HostRole::Indexer,
    HostRole::SearchHead,
    HostRole::HeavyForwarder,
    HostRole::UniversalForwarder,
    HostRole::Standalone,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      HostRole::ClusterManager => "cluster_manager",
      HostRole::ShcDeployer => "shc_deployer",
      HostRole::DeploymentServer => "deployment_server",
      HostRole::Indexer => "indexer",
      HostRole::SearchHead => "search_head",
      HostRole::HeavyForwarder => "heavy_forwarder",
      HostRole::UniversalForwarder => "universal_forwarder",
      HostRole::Standalone => "standalone",
    }
  }

  /// Deployment-path category bundles for this host land in.
  pub fn category(self) -> PathCategory {
    match self {
      HostRole::ClusterManager => PathCategory::ManagerApps,
      HostRole::ShcDeployer => PathCategory::ShclusterApps,
      HostRole::DeploymentServer => PathCategory::DeploymentApps,
      HostRole::Indexer
      | HostRole::SearchHead
      | HostRole::HeavyForwarder
      | HostRole::UniversalForwarder
      | HostRole::Standalone => PathCategory::Apps,
    }
  }

  /// Template role sections materialized for a host of this role, in order.
  pub fn template_roles(self) -> &'static [TemplateRole] {
    match self {
      HostRole::ClusterManager | HostRole::Indexer => &[TemplateRole::Indexer],
      HostRole::ShcDeployer | HostRole::SearchHead => &[TemplateRole::SearchHead],
      HostRole::DeploymentServer => &[
        TemplateRole::UniversalForwarder,
        TemplateRole::HeavyForwarder,
        TemplateRole::DeploymentServer,
      ],
      HostRole::HeavyForwarder => &[TemplateRole::HeavyForwarder],
      HostRole::UniversalForwarder => &[TemplateRole::UniversalForwarder],
      HostRole::Standalone => &[TemplateRole::Indexer, TemplateRole::SearchHead],
    }
  }
}

impl fmt::Display for HostRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for HostRole {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "cluster_master" => return Ok(HostRole::ClusterManager),
      "deployer" => return Ok(HostRole::ShcDeployer),
      _ => {}
    }
    HostRole::ALL
      .into_iter()
      .find(|r| r.as_str() == s)
      .ok_or_else(|| format!("unknown host role '{s}'"))
  }
}

/// Role section of an app template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateRole {
  Indexer,
  SearchHead,
  UniversalForwarder,
  HeavyForwarder,
  /// Serverclass routing on a deployment server.
  DeploymentServer,
}

impl TemplateRole {
  pub fn as_str(self) -> &'static str {
    match self {
      TemplateRole::Indexer => "indexer",
      TemplateRole::SearchHead => "search_head",
      TemplateRole::UniversalForwarder => "universal_forwarder",
      TemplateRole::HeavyForwarder => "heavy_forwarder",
      TemplateRole::DeploymentServer => "deployment_server",
    }
  }

  /// Name suffix of the implicit bundle a role section produces.
  pub fn implicit_suffix(self) -> &'static str {
    match self {
      TemplateRole::Indexer => "indexes",
      TemplateRole::SearchHead => "search",
      TemplateRole::UniversalForwarder => "inputs",
      TemplateRole::HeavyForwarder => "hf",
      TemplateRole::DeploymentServer => "serverclass",
    }
  }

  /// Parse a role name from a legacy `splunk_roles` list.
  ///
  /// Legacy documents use inventory group names, so plural and short forms
  /// are accepted.
  pub fn from_legacy(name: &str) -> Option<Self> {
    match name.trim().to_ascii_lowercase().as_str() {
      "indexer" | "indexers" | "idx" => Some(TemplateRole::Indexer),
      "search" | "search_head" | "search_heads" | "searchhead" | "searchheads" | "sh" => {
        Some(TemplateRole::SearchHead)
      }
      "universal_forwarder" | "universal_forwarders" | "forwarder" | "forwarders" | "uf" => {
        Some(TemplateRole::UniversalForwarder)
      }
      "heavy_forwarder" | "heavy_forwarders" | "hf" => Some(TemplateRole::HeavyForwarder),
      "deployment_server" | "deploymentserver" | "serverclass" | "ds" => Some(TemplateRole::DeploymentServer),
      _ => None,
    }
  }
}

impl fmt::Display for TemplateRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
