//! Status and history command integration tests.

use predicates::prelude::*;

use super::common::{ENV, TestEnv};

#[test]
fn status_lists_managed_bundles() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.static_bundle("clustermaster", "idx_base");
  env.deploy().assert().success();

  env
    .appfleet_cmd()
    .args(["status", "--env", ENV])
    .assert()
    .success()
    .stdout(predicate::str::contains("Last deployment"))
    .stdout(predicate::str::contains("sh01:apps (1 bundle(s))"))
    .stdout(predicate::str::contains("cm02:manager-apps (1 bundle(s))"));
}

#[test]
fn status_json_filters_by_host() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.static_bundle("clustermaster", "idx_base");
  env.deploy().assert().success();

  let status = env.json(env.appfleet_cmd().args(["status", "--env", ENV, "--host", "cm01"]));

  let records = status["records"].as_array().unwrap();
  assert_eq!(records.len(), 1);
  assert_eq!(records[0]["host"], "cm01");
  assert_eq!(records[0]["apps"][0], "idx_base");
  assert_eq!(status["last_deployment"]["playbook"], "appfleet");
}

#[test]
fn status_of_unknown_environment_lists_known_ones() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.deploy().assert().success();

  env
    .appfleet_cmd()
    .args(["status", "--env", "staging"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No deployments recorded for 'staging'"))
    .stdout(predicate::str::contains(format!("Known environments: {ENV}")));
}

#[test]
fn history_appends_per_run() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.deploy().assert().success();
  env.deploy().assert().success();

  let events = env.json(env.appfleet_cmd().args(["history", "--env", ENV, "--host", "sh01"]));
  let events = events.as_array().unwrap();
  assert_eq!(events.len(), 2);
  assert_ne!(events[0]["id"], events[1]["id"]);
  assert_eq!(events[0]["apps"][0], "acme_base");

  let latest = env.json(env.appfleet_cmd().args(["history", "--env", ENV, "-n", "1"]));
  assert_eq!(latest.as_array().unwrap().len(), 1);
  assert_eq!(latest[0]["id"], events[1]["id"]);
}

#[test]
fn history_since_excludes_nothing_recent() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.deploy().assert().success();

  env
    .appfleet_cmd()
    .args(["history", "--env", ENV, "--since", "1h"])
    .assert()
    .success()
    .stdout(predicate::str::contains("sh01:apps"));
}
