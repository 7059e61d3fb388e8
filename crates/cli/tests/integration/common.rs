//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

pub const ENV: &str = "production";

/// Search head, standalone deployment server, and a two-member indexer
/// cluster managed from cm01/cm02.
pub const INVENTORY: &str = r#"
environments:
  production:
    owner: ops-team
groups:
  search_head:
    theme: light
hosts:
  - name: sh01
    role: search_head
    vars:
      theme: dark
  - name: cm01
    role: cluster_manager
    cluster: idxc
  - name: cm02
    role: cluster_manager
    cluster: idxc
"#;

/// Enhanced template producing one search head bundle and one indexer bundle.
pub const PAYMENTS_TEMPLATE: &str = r#"
tenant: acme
app_name: payments
app_version: 1.2.0
template_vars:
  owner: payments-team
search_heads: {}
indexers:
  indexes:
    payment_logs:
      max_data_size_mb: 2000
      retention_period: 90D
"#;

/// Isolated test environment.
///
/// Each test gets its own temporary directory with isolated source, state and
/// destination paths.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// Inventory from [`INVENTORY`] and an empty source tree.
  pub fn new() -> Self {
    let env = Self {
      temp: TempDir::new().unwrap(),
    };
    env.write_file("inventory.yml", INVENTORY);
    std::fs::create_dir_all(env.source_path()).unwrap();
    env
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  /// Add a static bundle under `source/<dir>/<name>`.
  pub fn static_bundle(&self, dir: &str, name: &str) {
    self.write_file(
      &format!("source/{dir}/{name}/default/app.conf"),
      &format!("[package]\nid = {name}\n"),
    );
  }

  /// Add an app template under `source/splunk-app-templates/<id>`.
  pub fn template(&self, id: &str, document: &str) {
    self.write_file(&format!("source/splunk-app-templates/{id}/app.yml"), document);
  }

  pub fn inventory_path(&self) -> PathBuf {
    self.temp.path().join("inventory.yml")
  }

  pub fn source_path(&self) -> PathBuf {
    self.temp.path().join("source")
  }

  pub fn state_path(&self) -> PathBuf {
    self.temp.path().join("state")
  }

  pub fn dest_path(&self) -> PathBuf {
    let p = self.temp.path().join("dest");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Bundle directory on a target in the destination tree.
  pub fn deployed(&self, host: &str, category: &str, bundle: &str) -> PathBuf {
    self.dest_path().join(host).join(category).join(bundle)
  }

  /// Get a pre-configured Command for the appfleet binary.
  ///
  /// Sets `APPFLEET_STATE_DIR` to the isolated state path.
  pub fn appfleet_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("appfleet");
    cmd.env("APPFLEET_STATE_DIR", self.state_path());
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// `appfleet <subcommand>` with environment, inventory and source set.
  pub fn with_source(&self, subcommand: &str) -> Command {
    let mut cmd = self.appfleet_cmd();
    cmd
      .arg(subcommand)
      .args(["--env", ENV])
      .arg("--inventory")
      .arg(self.inventory_path())
      .arg("--source")
      .arg(self.source_path());
    cmd
  }

  /// `appfleet deploy` into the isolated destination.
  pub fn deploy(&self) -> Command {
    let mut cmd = self.with_source("deploy");
    cmd.arg("--dest").arg(self.dest_path());
    cmd
  }

  /// Parsed JSON written to stdout by a successful command.
  pub fn json(&self, cmd: &mut Command) -> serde_json::Value {
    let output = cmd.arg("-o").arg("json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
  }
}
