//! Deploy command integration tests.

use std::fs;

use predicates::prelude::*;

use super::common::{PAYMENTS_TEMPLATE, TestEnv};

#[test]
fn deploy_static_and_template_bundles() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.template("payments", PAYMENTS_TEMPLATE);

  env
    .deploy()
    .assert()
    .success()
    .stdout(predicate::str::contains("Deploy complete"));

  assert!(env.deployed("sh01", "apps", "acme_base").join("default/app.conf").exists());
  let app_conf = fs::read_to_string(env.deployed("sh01", "apps", "acme_payments_search").join("default/app.conf")).unwrap();
  assert!(app_conf.contains("version = 1.2.0"));

  let indexes =
    fs::read_to_string(env.deployed("cm01", "manager-apps", "acme_payments_indexes").join("default/indexes.conf"))
      .unwrap();
  assert!(indexes.contains("[payment_logs]"));
  assert!(indexes.contains("maxDataSize = 2000"));
  assert!(indexes.contains("frozenTimePeriodInSecs = 7776000"));
}

#[test]
fn deploy_triggers_cluster_once() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);

  env.deploy().assert().success();

  let log = fs::read_to_string(env.dest_path().join("cm01/triggers.log")).unwrap();
  assert_eq!(log.lines().count(), 1);
  assert!(log.contains("cluster-bundle-apply"));
  assert!(!env.dest_path().join("cm02/triggers.log").exists());

  let restarts = fs::read_to_string(env.dest_path().join("sh01/triggers.log")).unwrap();
  assert!(restarts.contains("restart"));
}

#[test]
fn deploy_json_report() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");

  let report = env.json(&mut env.deploy());

  assert_eq!(report["dry_run"], false);
  let targets = report["targets"].as_array().unwrap();
  let sh01 = targets.iter().find(|t| t["target"]["host"] == "sh01").unwrap();
  assert_eq!(sh01["outcome"]["status"], "succeeded");
  assert_eq!(sh01["added"][0], "acme_base");
  assert_eq!(sh01["trigger"], "restart");
}

#[test]
fn redeploy_writes_nothing_new() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.template("payments", PAYMENTS_TEMPLATE);

  env.deploy().assert().success();
  let report = env.json(&mut env.deploy());

  for target in report["targets"].as_array().unwrap() {
    assert!(target["written"].as_array().unwrap().is_empty(), "{target}");
    assert!(target["added"].as_array().unwrap().is_empty(), "{target}");
  }
}

#[test]
fn cleanup_removes_orphans() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "app_keep");
  env.static_bundle("searchheads", "app_foo");
  env.deploy().assert().success();

  fs::remove_dir_all(env.source_path().join("searchheads/app_foo")).unwrap();
  env
    .deploy()
    .arg("--cleanup")
    .arg("--force")
    .assert()
    .success();

  assert!(env.deployed("sh01", "apps", "app_keep").exists());
  assert!(!env.deployed("sh01", "apps", "app_foo").exists());

  env
    .appfleet_cmd()
    .args(["status", "--env", "production"])
    .assert()
    .success()
    .stdout(predicate::str::contains("app_keep").and(predicate::str::contains("app_foo").not()));
}

#[test]
fn without_cleanup_orphans_stay() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "app_keep");
  env.static_bundle("searchheads", "app_foo");
  env.deploy().assert().success();

  fs::remove_dir_all(env.source_path().join("searchheads/app_foo")).unwrap();
  env
    .deploy()
    .assert()
    .success()
    .stdout(predicate::str::contains("app_foo (orphaned"));

  assert!(env.deployed("sh01", "apps", "app_foo").exists());
}

#[test]
fn cleanup_needs_confirmation_when_not_interactive() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "app_keep");

  env
    .deploy()
    .arg("--cleanup")
    .assert()
    .failure()
    .stderr(predicate::str::contains("--force"));

  assert!(!env.deployed("sh01", "apps", "app_keep").exists());
}

#[test]
fn bundle_failure_fails_the_command_but_deploys_the_rest() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.template("payments", PAYMENTS_TEMPLATE);
  env.write_file(
    "source/splunk-app-templates/payments/default/web.conf",
    "[web]\nregion = {{ undefined_region }}\n",
  );

  env
    .deploy()
    .assert()
    .failure()
    .stderr(predicate::str::contains("failed to materialize"));

  assert!(env.deployed("sh01", "apps", "acme_base").exists());
  assert!(!env.deployed("sh01", "apps", "acme_payments_search").exists());
}

#[test]
fn duplicate_bundle_aborts_run() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_payments_search");
  env.template("payments", PAYMENTS_TEMPLATE);

  env
    .deploy()
    .assert()
    .failure()
    .stderr(predicate::str::contains("duplicate bundle"));

  assert!(!env.dest_path().join("sh01").exists());
}

#[test]
fn limit_restricts_targets() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.static_bundle("clustermaster", "idx_base");

  env.deploy().args(["--limit", "search_head"]).assert().success();

  assert!(env.deployed("sh01", "apps", "acme_base").exists());
  assert!(!env.dest_path().join("cm01").exists());
}

#[test]
fn asset_cache_overlays_template_bundle() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);
  env.write_file("assets/acme_payments_search/static/logo.png", "PNG");

  env
    .deploy()
    .arg("--asset-cache")
    .arg(env.temp.path().join("assets"))
    .assert()
    .success();

  let logo = env.deployed("sh01", "apps", "acme_payments_search").join("static/logo.png");
  assert_eq!(fs::read_to_string(logo).unwrap(), "PNG");
}
