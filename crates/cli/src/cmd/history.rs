//! History command implementation: the append-only deployment log.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use appfleet_lib::state::{LockMode, StateLock, now_unix};

use super::StateArgs;
use crate::output::{OutputFormat, format_timestamp, print_info, print_json, symbols};

#[derive(Args, Debug)]
pub struct HistoryArgs {
  #[command(flatten)]
  pub state: StateArgs,

  /// Only show events for this host
  #[arg(long)]
  pub host: Option<String>,

  /// Only show events newer than this (e.g., "7d", "24h", "2w")
  #[arg(long, value_parser = humantime::parse_duration)]
  pub since: Option<Duration>,

  /// Show at most this many of the most recent events
  #[arg(short = 'n', long)]
  pub limit: Option<usize>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

pub fn cmd_history(args: HistoryArgs) -> Result<()> {
  let files = args.state.state_files();
  let env = args.state.env.as_str();

  let store = {
    let _lock = StateLock::acquire(&files, env, LockMode::Shared, "history")?;
    files.load(env)?
  };

  let since = args.since.map(|d| now_unix().saturating_sub(d.as_secs()));
  let mut events = store.history_for(args.host.as_deref(), since);
  if let Some(limit) = args.limit {
    let skip = events.len().saturating_sub(limit);
    events.drain(..skip);
  }

  if args.output.is_json() {
    return print_json(&events);
  }

  if events.is_empty() {
    print_info("No matching deployment events.");
    return Ok(());
  }
  for event in events {
    println!(
      "{}  {}  {}:{}  {} bundle(s)  by {}",
      event.id,
      format_timestamp(event.timestamp),
      event.host,
      event.path,
      event.apps.len(),
      event.user
    );
    for name in &event.removed {
      println!("    {} {}", symbols::REMOVE, name);
    }
  }
  Ok(())
}
