//! Target inventory.
//!
//! The inventory is handed over by the orchestration layer. It names each
//! host, the single role it plays, and the variable scopes that apply to it.
//!
//! # Format
//!
//! ```yaml
//! environments:          # environment-level defaults, keyed by environment name
//!   production:
//!     splunk_home: /opt/splunk
//! groups:                # group defaults; every host is in the group named after its role
//!   indexer:
//!     max_hot_buckets: 3
//!   east:
//!     site: site1
//! hosts:
//!   - name: cm01.example.com
//!     role: cluster_manager
//!     cluster: idxc-east   # cluster identity, defaults to the host name
//!     groups: [east]
//!     tags: [critical]
//!     vars:
//!       pass4symmkey: changeme
//! ```

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::role::HostRole;
use crate::target::Target;
use crate::vars::{ScopeChain, ScopeKind, Vars};

#[derive(Debug, Error)]
pub enum InventoryError {
  #[error("failed to read inventory {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse inventory: {0}")]
  Parse(#[from] serde_yaml::Error),

  #[error("duplicate host in inventory: {0}")]
  DuplicateHost(String),

  #[error("inventory host with empty name")]
  EmptyHostName,
}

/// One host entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
  pub name: String,
  pub role: HostRole,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cluster: Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub groups: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub tags: Vec<String>,
  #[serde(default, skip_serializing_if = "Vars::is_empty")]
  pub vars: Vars,
}

impl Host {
  pub fn new(name: impl Into<String>, role: HostRole) -> Self {
    Self {
      name: name.into(),
      role,
      cluster: None,
      groups: Vec::new(),
      tags: Vec::new(),
      vars: Vars::new(),
    }
  }

  /// Target this host's bundles are synchronized to.
  pub fn target(&self) -> Target {
    Target::new(self.name.clone(), self.role.category())
  }

  /// Cluster identity for cluster-scoped triggers.
  ///
  /// `None` for hosts whose category triggers per host.
  pub fn cluster_id(&self) -> Option<String> {
    if self.role.category().is_cluster_scoped() {
      Some(self.cluster.clone().unwrap_or_else(|| self.name.clone()))
    } else {
      None
    }
  }

  /// Group names in precedence order: the role group first, then listed groups.
  pub fn group_names(&self) -> Vec<&str> {
    let mut names = vec![self.role.as_str()];
    names.extend(self.groups.iter().map(String::as_str).filter(|g| *g != self.role.as_str()));
    names
  }
}

/// Parsed inventory document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
  #[serde(default)]
  pub environments: BTreeMap<String, Vars>,
  #[serde(default)]
  pub groups: BTreeMap<String, Vars>,
  #[serde(default)]
  pub hosts: Vec<Host>,
}

impl Inventory {
  /// Load and validate an inventory file.
  pub fn load(path: &Path) -> Result<Self, InventoryError> {
    let content = std::fs::read_to_string(path).map_err(|source| InventoryError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_yaml(&content)
  }

  pub fn from_yaml(content: &str) -> Result<Self, InventoryError> {
    let inventory: Inventory = serde_yaml::from_str(content)?;
    inventory.validate()?;
    Ok(inventory)
  }

  fn validate(&self) -> Result<(), InventoryError> {
    let mut seen = HashSet::new();
    for host in &self.hosts {
      if host.name.trim().is_empty() {
        return Err(InventoryError::EmptyHostName);
      }
      if !seen.insert(host.name.as_str()) {
        return Err(InventoryError::DuplicateHost(host.name.clone()));
      }
    }
    Ok(())
  }

  pub fn host(&self, name: &str) -> Option<&Host> {
    self.hosts.iter().find(|h| h.name == name)
  }

  /// Hosts matched by `selector`, in inventory order.
  pub fn select<'a>(&'a self, selector: &TargetSelector) -> Vec<&'a Host> {
    self.hosts.iter().filter(|h| selector.matches(h)).collect()
  }

  /// Environment, group and target scopes for one host.
  pub fn scopes_for(&self, environment: &str, host: &Host) -> ScopeChain {
    let mut chain = ScopeChain::new();
    chain.push(
      ScopeKind::Environment,
      format!("environment:{environment}"),
      self.environments.get(environment),
    );
    for group in host.group_names() {
      chain.push(ScopeKind::Group, format!("group:{group}"), self.groups.get(group));
    }
    chain.push(ScopeKind::Target, format!("host:{}", host.name), Some(&host.vars));
    chain
  }
}

/// Restricts which hosts a run processes.
///
/// A pattern matches a host name, role, group or tag. An empty selector (or
/// the pattern `all`) matches every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelector {
  patterns: Vec<String>,
}

impl TargetSelector {
  pub fn all() -> Self {
    Self::default()
  }

  /// Parse a comma-separated pattern list.
  pub fn parse(spec: &str) -> Self {
    Self {
      patterns: spec
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect(),
    }
  }

  pub fn matches(&self, host: &Host) -> bool {
    if self.patterns.is_empty() {
      return true;
    }
    self.patterns.iter().any(|p| {
      p == "all"
        || *p == host.name
        || p == host.role.as_str()
        || host.groups.iter().any(|g| g == p)
        || host.tags.iter().any(|t| t == p)
    })
  }

  pub fn is_all(&self) -> bool {
    self.patterns.is_empty() || self.patterns.iter().any(|p| p == "all")
  }
}
