//! Implementation of the `appfleet deploy` command.
//!
//! Runs a full reconciliation for one environment: materializes templates,
//! stages bundles into the destination tree, issues triggers and commits
//! managed state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use appfleet_lib::distribute::{DirectoryTransport, Transport};

use super::SourceArgs;
use super::report::print_report;
use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};
use crate::prompts::confirm;

#[derive(Args, Debug)]
pub struct DeployArgs {
  #[command(flatten)]
  pub source: SourceArgs,

  /// Destination root; bundles land in <dest>/<host>/<category>/
  #[arg(short, long)]
  pub dest: PathBuf,

  /// Remove bundles that are managed but no longer desired
  #[arg(long)]
  pub cleanup: bool,

  /// Skip the cleanup confirmation prompt
  #[arg(long)]
  pub force: bool,

  /// Comma-separated hosts, roles, groups or tags to deploy to
  #[arg(short, long)]
  pub limit: Option<String>,

  /// Maximum concurrent targets
  #[arg(short = 'j', long)]
  pub parallelism: Option<usize>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

pub fn cmd_deploy(args: DeployArgs, verbose: bool) -> Result<()> {
  let env = &args.source.state.env;

  if args.cleanup
    && !confirm(
      &format!("Remove orphaned bundles from every selected target in '{env}'?"),
      args.force,
    )?
  {
    print_info("Aborted.");
    return Ok(());
  }

  let reconciler = args.source.reconciler()?;
  let mut opts = args.source.run_options(args.cleanup, args.limit.as_deref());
  if let Some(parallelism) = args.parallelism {
    opts.parallelism = parallelism;
  }

  let transport: Arc<dyn Transport> = Arc::new(DirectoryTransport::new(&args.dest));

  let start = Instant::now();
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(reconciler.run(&opts, transport))
    .context("Deploy failed")?;
  info!(run = %report.run_id, dest = %args.dest.display(), "deploy finished");

  if args.output.is_json() {
    print_json(&report)?;
  } else {
    print_report(&report, verbose);
    println!();
    print_success(&format!("Deploy complete: {}", report.run_id));
    print_stat("Succeeded", &report.succeeded().to_string());
    print_stat("Failed", &report.failed().to_string());
    print_stat("Duration", &format_duration(start.elapsed()));
  }

  if report.has_failures() {
    bail!(
      "{} target(s) failed and {} bundle(s) failed to materialize",
      report.failed(),
      report.bundle_failures()
    );
  }
  Ok(())
}
