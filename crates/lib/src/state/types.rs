use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::target::{PathCategory, Target};

/// Bundles currently managed on one `(host, category)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedAppRecord {
  pub host: String,
  pub category: String,
  pub apps: BTreeSet<String>,
}

/// One append-only history entry, written per target per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
  pub id: String,
  /// Seconds since the Unix epoch.
  pub timestamp: u64,
  pub host: String,
  pub path: String,
  /// Bundles present on the target after the run.
  pub apps: Vec<String>,
  /// Bundles removed by the run.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub removed: Vec<String>,
  pub user: String,
}

/// Summary of the most recent run that touched this environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastDeployment {
  pub id: String,
  pub timestamp: u64,
  pub playbook: String,
  pub user: String,
  pub environment: String,
}

/// Persisted managed-state document for one environment.
///
/// ```json
/// {
///   "ansible_managed_apps": { "<host>": { "<category>": ["<bundle>", ...] } },
///   "deployment_history": [ { "id": ..., "timestamp": ..., ... } ],
///   "last_deployment": { "id": ..., "playbook": ..., ... }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateStore {
  #[serde(default)]
  pub ansible_managed_apps: BTreeMap<String, BTreeMap<String, Vec<String>>>,
  #[serde(default)]
  pub deployment_history: Vec<DeploymentEvent>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_deployment: Option<LastDeployment>,
}

impl StateStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Bundles recorded as managed on `target`. Empty when nothing is recorded.
  pub fn managed(&self, target: &Target) -> BTreeSet<String> {
    self
      .ansible_managed_apps
      .get(&target.host)
      .and_then(|paths| paths.get(target.category.as_str()))
      .map(|apps| apps.iter().cloned().collect())
      .unwrap_or_default()
  }

  /// Replace the record for `target`.
  ///
  /// Names are stored sorted and deduplicated. An empty set removes the
  /// record, and a host without records is dropped.
  pub fn set_managed(&mut self, target: &Target, apps: impl IntoIterator<Item = String>) {
    let apps: BTreeSet<String> = apps.into_iter().collect();
    if apps.is_empty() {
      if let Some(paths) = self.ansible_managed_apps.get_mut(&target.host) {
        paths.remove(target.category.as_str());
        if paths.is_empty() {
          self.ansible_managed_apps.remove(&target.host);
        }
      }
      return;
    }
    self
      .ansible_managed_apps
      .entry(target.host.clone())
      .or_default()
      .insert(target.category.as_str().to_string(), apps.into_iter().collect());
  }

  /// Every record, sorted by host then category.
  pub fn records(&self) -> Vec<ManagedAppRecord> {
    self
      .ansible_managed_apps
      .iter()
      .flat_map(|(host, paths)| {
        paths.iter().map(move |(category, apps)| ManagedAppRecord {
          host: host.clone(),
          category: category.clone(),
          apps: apps.iter().cloned().collect(),
        })
      })
      .collect()
  }

  /// Targets with a record whose category is recognized.
  pub fn targets(&self) -> Vec<Target> {
    self
      .records()
      .into_iter()
      .filter_map(|r| {
        r.category
          .parse::<PathCategory>()
          .ok()
          .map(|category| Target::new(r.host, category))
      })
      .collect()
  }

  /// Sort and deduplicate every bundle list. History order is kept.
  pub fn normalize(&mut self) {
    for apps in self.ansible_managed_apps.values_mut().flat_map(BTreeMap::values_mut) {
      apps.sort();
      apps.dedup();
    }
    self.ansible_managed_apps.retain(|_, paths| {
      paths.retain(|_, apps| !apps.is_empty());
      !paths.is_empty()
    });
    for event in &mut self.deployment_history {
      event.apps.sort();
      event.apps.dedup();
      event.removed.sort();
      event.removed.dedup();
    }
  }

  /// Append an event to the history.
  pub fn record_event(&mut self, event: DeploymentEvent) {
    self.deployment_history.push(event);
  }

  /// History entries, oldest first, optionally narrowed to one host and to
  /// events at or after `since`.
  pub fn history_for(&self, host: Option<&str>, since: Option<u64>) -> Vec<&DeploymentEvent> {
    self
      .deployment_history
      .iter()
      .filter(|e| host.is_none_or(|h| e.host == h))
      .filter(|e| since.is_none_or(|s| e.timestamp >= s))
      .collect()
  }

  pub fn set_last_deployment(&mut self, last: LastDeployment) {
    self.last_deployment = Some(last);
  }
}
