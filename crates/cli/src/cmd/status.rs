//! Status command implementation.
//!
//! Displays the bundles recorded as managed per target and the last run.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use appfleet_lib::state::{LastDeployment, LockMode, ManagedAppRecord, StateLock};

use super::StateArgs;
use crate::output::{OutputFormat, format_timestamp, print_info, print_json, print_stat, print_success, symbols};

#[derive(Args, Debug)]
pub struct StatusArgs {
  #[command(flatten)]
  pub state: StateArgs,

  /// Only show this host
  #[arg(long)]
  pub host: Option<String>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct StatusOutput<'a> {
  environment: &'a str,
  records: Vec<ManagedAppRecord>,
  last_deployment: Option<&'a LastDeployment>,
}

pub fn cmd_status(args: StatusArgs) -> Result<()> {
  let files = args.state.state_files();
  let env = args.state.env.as_str();

  let store = {
    let _lock = StateLock::acquire(&files, env, LockMode::Shared, "status")?;
    files.load(env)?
  };

  let records: Vec<ManagedAppRecord> = store
    .records()
    .into_iter()
    .filter(|r| args.host.as_deref().is_none_or(|h| r.host == h))
    .collect();

  if args.output.is_json() {
    return print_json(&StatusOutput {
      environment: env,
      records,
      last_deployment: store.last_deployment.as_ref(),
    });
  }

  match &store.last_deployment {
    Some(last) => {
      print_success(&format!("Last deployment: {}", last.id));
      print_stat("At", &format_timestamp(last.timestamp));
      print_stat("By", &last.user);
    }
    None => {
      print_info(&format!("No deployments recorded for '{env}'."));
      let known = files.environments()?;
      if !known.is_empty() {
        print_stat("Known environments", &known.join(", "));
      }
    }
  }

  if records.is_empty() {
    return Ok(());
  }
  println!();
  for record in &records {
    println!("{}:{} ({} bundle(s))", record.host, record.category, record.apps.len());
    for app in &record.apps {
      println!("  {} {}", symbols::INFO, app);
    }
  }
  Ok(())
}
