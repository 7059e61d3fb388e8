//! Render command integration tests.

use predicates::prelude::*;

use super::common::{PAYMENTS_TEMPLATE, TestEnv};

#[test]
fn render_lists_bundles() {
  let env = TestEnv::new();
  env.static_bundle("searchheads", "acme_base");
  env.template("payments", PAYMENTS_TEMPLATE);

  env
    .with_source("render")
    .args(["--host", "sh01"])
    .assert()
    .success()
    .stdout(predicate::str::contains("sh01:apps: 2 bundle(s)"))
    .stdout(predicate::str::contains("acme_payments_search"));
}

#[test]
fn render_writes_to_out_without_state() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);
  let out = env.temp.path().join("rendered");

  env
    .with_source("render")
    .args(["--host", "cm01", "--out"])
    .arg(&out)
    .assert()
    .success();

  assert!(
    out
      .join("cm01/manager-apps/acme_payments_indexes/default/indexes.conf")
      .exists()
  );
  assert!(!env.state_path().join("production.json").exists());
}

#[test]
fn render_explain_shows_origins() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);

  env
    .with_source("render")
    .args(["--host", "sh01", "--explain", "acme_payments_search"])
    .assert()
    .success()
    .stdout(predicate::str::contains("owner = ops-team  [environment:production]"))
    .stdout(predicate::str::contains("theme = dark  [host:sh01]"))
    .stdout(predicate::str::contains("app_name = payments  [builtin]"));
}

#[test]
fn render_explain_json() {
  let env = TestEnv::new();
  env.template("payments", PAYMENTS_TEMPLATE);

  let vars = env.json(
    env
      .with_source("render")
      .args(["--host", "sh01", "--explain", "acme_payments_search"]),
  );

  assert_eq!(vars["theme"]["value"], "dark");
  assert_eq!(vars["theme"]["origin"]["kind"], "target");
  assert_eq!(vars["owner"]["origin"]["kind"], "environment");
}

#[test]
fn render_unknown_host_fails() {
  let env = TestEnv::new();

  env
    .with_source("render")
    .args(["--host", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("host not found"));
}
