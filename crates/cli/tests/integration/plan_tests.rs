//! Plan command integration tests.

use predicates::prelude::*;

use super::common::{PAYMENTS_TEMPLATE, TestEnv};

#[test]
fn plan_touches_nothing() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);

  env
    .with_source("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("+ acme_payments_search"))
    .stdout(predicate::str::contains("3 of 3 target(s) would be synchronized"));

  assert!(!env.temp.path().join("dest").exists());
  assert!(!env.state_path().join("production.json").exists());
}

#[test]
fn plan_reports_would_be_removals_with_cleanup() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "app_foo");
  env.deploy().assert().success();
  std::fs::remove_dir_all(env.source_path().join("searchheads/app_foo")).unwrap();

  let report = env.json(env.with_source("plan").arg("--cleanup"));

  assert_eq!(report["dry_run"], true);
  let sh01 = report["targets"]
    .as_array()
    .unwrap()
    .iter()
    .find(|t| t["target"]["host"] == "sh01")
    .unwrap()
    .clone();
  assert_eq!(sh01["outcome"]["status"], "planned");
  assert_eq!(sh01["removed"][0], "app_foo");
  assert!(env.deployed("sh01", "apps", "app_foo").exists());
}
