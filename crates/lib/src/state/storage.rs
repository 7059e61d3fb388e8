//! State file storage.
//!
//! # Storage Layout
//!
//! ```text
//! {state_dir}/
//! ├── <environment>.json   # StateStore document
//! └── <environment>.lock   # run lock, see [`super::lock`]
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::platform::paths::state_dir;

use super::StateError;
use super::types::StateStore;

/// Reads and writes per-environment state documents.
#[derive(Debug, Clone)]
pub struct StateFiles {
  base_path: PathBuf,
}

impl StateFiles {
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  /// Store at the default location (`APPFLEET_STATE_DIR` or the data dir).
  pub fn default_location() -> Self {
    Self::new(state_dir())
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Path of the document for `environment`.
  pub fn path(&self, environment: &str) -> Result<PathBuf, StateError> {
    validate_environment(environment)?;
    Ok(self.base_path.join(format!("{environment}.json")))
  }

  pub(crate) fn lock_path(&self, environment: &str) -> Result<PathBuf, StateError> {
    validate_environment(environment)?;
    Ok(self.base_path.join(format!("{environment}.lock")))
  }

  /// Load the document for `environment`.
  ///
  /// A missing file is an empty store. A file that exists but cannot be
  /// parsed is an error; it is never silently replaced.
  pub fn load(&self, environment: &str) -> Result<StateStore, StateError> {
    let path = self.path(environment)?;

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no state file, starting empty");
        return Ok(StateStore::new());
      }
      Err(source) => return Err(StateError::Read { path, source }),
    };

    serde_json::from_str(&content).map_err(|source| StateError::Parse { path, source })
  }

  /// Write the document for `environment`.
  ///
  /// Uses atomic write (write to temp, then rename) so readers never see a
  /// partial document.
  pub fn persist(&self, environment: &str, store: &StateStore) -> Result<(), StateError> {
    let path = self.path(environment)?;
    fs::create_dir_all(&self.base_path).map_err(|source| StateError::CreateDir {
      path: self.base_path.clone(),
      source,
    })?;

    let mut store = store.clone();
    store.normalize();

    let temp_path = self.base_path.join(format!("{environment}.json.tmp"));
    let content = serde_json::to_string_pretty(&store).map_err(StateError::Serialize)?;
    fs::write(&temp_path, &content).map_err(|source| StateError::Write {
      path: temp_path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &path).map_err(|source| StateError::Write {
      path: path.clone(),
      source,
    })?;

    debug!(path = %path.display(), events = store.deployment_history.len(), "persisted state");
    Ok(())
  }

  /// Environments with a state document, sorted.
  pub fn environments(&self) -> Result<Vec<String>, StateError> {
    let entries = match fs::read_dir(&self.base_path) {
      Ok(entries) => entries,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(source) => {
        return Err(StateError::Read {
          path: self.base_path.clone(),
          source,
        });
      }
    };

    let mut names: Vec<String> = entries
      .filter_map(Result::ok)
      .filter_map(|e| {
        e.file_name()
          .to_str()
          .and_then(|n| n.strip_suffix(".json"))
          .map(str::to_string)
      })
      .collect();
    names.sort();
    Ok(names)
  }
}

/// Environment names become file names.
fn validate_environment(environment: &str) -> Result<(), StateError> {
  let valid = !environment.is_empty()
    && !environment.starts_with('.')
    && environment
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
  if valid {
    Ok(())
  } else {
    Err(StateError::InvalidEnvironment(environment.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::{DeploymentEvent, LastDeployment};
  use crate::target::{PathCategory, Target};
  use tempfile::TempDir;

  fn temp_files() -> (TempDir, StateFiles) {
    let temp_dir = TempDir::new().unwrap();
    let files = StateFiles::new(temp_dir.path().join("state"));
    (temp_dir, files)
  }

  fn sample() -> StateStore {
    let mut store = StateStore::new();
    store.set_managed(
      &Target::new("cm01", PathCategory::ManagerApps),
      ["acme_idx".to_string(), "acme_base".to_string()],
    );
    store.record_event(DeploymentEvent {
      id: "run1-001".to_string(),
      timestamp: 1_700_000_000,
      host: "cm01".to_string(),
      path: "manager-apps".to_string(),
      apps: vec!["acme_base".to_string(), "acme_idx".to_string()],
      removed: vec![],
      user: "ops".to_string(),
    });
    store.set_last_deployment(LastDeployment {
      id: "run1".to_string(),
      timestamp: 1_700_000_000,
      playbook: "appfleet".to_string(),
      user: "ops".to_string(),
      environment: "production".to_string(),
    });
    store
  }

  #[test]
  fn load_empty_when_not_exists() {
    let (_temp, files) = temp_files();
    let store = files.load("production").unwrap();
    assert_eq!(store, StateStore::new());
  }

  #[test]
  fn persist_and_load_roundtrip() {
    let (_temp, files) = temp_files();
    let store = sample();

    files.persist("production", &store).unwrap();
    let loaded = files.load("production").unwrap();

    assert_eq!(loaded, store);
    assert!(!files.base_path().join("production.json.tmp").exists());
  }

  #[test]
  fn repeated_persist_is_byte_stable() {
    let (_temp, files) = temp_files();
    fs::create_dir_all(files.base_path()).unwrap();
    let raw = r#"{
      "ansible_managed_apps": {
        "sh02": {"apps": ["zeta", "alpha", "zeta"], "deployment-apps": []},
        "cm01": {"manager-apps": ["acme_idx", "acme_base"]}
      },
      "deployment_history": [
        {"id": "r2-001", "timestamp": 2, "host": "sh02", "path": "apps",
         "apps": ["zeta", "alpha"], "removed": ["old_b", "old_a"], "user": "ops"},
        {"id": "r1-001", "timestamp": 1, "host": "cm01", "path": "manager-apps",
         "apps": ["acme_idx", "acme_base"], "user": "ops"}
      ]
    }"#;
    fs::write(files.path("production").unwrap(), raw).unwrap();

    let mut store = files.load("production").unwrap();
    store.set_managed(
      &Target::new("sh01", PathCategory::Apps),
      ["b_app".to_string(), "a_app".to_string()],
    );
    files.persist("production", &store).unwrap();
    let first = fs::read(files.path("production").unwrap()).unwrap();

    let reloaded = files.load("production").unwrap();
    files.persist("production", &reloaded).unwrap();
    let second = fs::read(files.path("production").unwrap()).unwrap();

    assert_eq!(first, second);
    assert_eq!(reloaded.ansible_managed_apps["sh02"]["apps"], vec!["alpha", "zeta"]);
    assert!(!reloaded.ansible_managed_apps["sh02"].contains_key("deployment-apps"));
    assert_eq!(reloaded.deployment_history[0].id, "r2-001");
    assert_eq!(reloaded.deployment_history[0].removed, vec!["old_a", "old_b"]);
    assert_eq!(reloaded.deployment_history[1].apps, vec!["acme_base", "acme_idx"]);
  }

  #[test]
  fn persisted_document_uses_wire_names() {
    let (_temp, files) = temp_files();
    files.persist("production", &sample()).unwrap();

    let raw = fs::read_to_string(files.path("production").unwrap()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(
      value["ansible_managed_apps"]["cm01"]["manager-apps"],
      serde_json::json!(["acme_base", "acme_idx"])
    );
    assert_eq!(value["deployment_history"][0]["path"], "manager-apps");
    assert_eq!(value["last_deployment"]["playbook"], "appfleet");
  }

  #[test]
  fn corrupt_file_is_an_error() {
    let (_temp, files) = temp_files();
    fs::create_dir_all(files.base_path()).unwrap();
    fs::write(files.path("production").unwrap(), "{not json").unwrap();

    assert!(matches!(files.load("production"), Err(StateError::Parse { .. })));
  }

  #[test]
  fn environments_are_isolated() {
    let (_temp, files) = temp_files();
    files.persist("production", &sample()).unwrap();

    assert_eq!(files.load("staging").unwrap(), StateStore::new());
    assert_eq!(files.environments().unwrap(), vec!["production".to_string()]);
  }

  #[test]
  fn invalid_environment_names_rejected() {
    let (_temp, files) = temp_files();
    for name in ["", "../etc", "a/b", ".hidden", "a b"] {
      assert!(
        matches!(files.load(name), Err(StateError::InvalidEnvironment(_))),
        "{name}"
      );
    }
  }
}
