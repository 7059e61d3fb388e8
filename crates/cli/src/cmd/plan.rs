//! Implementation of the `appfleet plan` command.

use anyhow::{Context, Result};
use clap::Args;

use super::SourceArgs;
use super::report::print_report;
use crate::output::{OutputFormat, print_info, print_json};

#[derive(Args, Debug)]
pub struct PlanArgs {
  #[command(flatten)]
  pub source: SourceArgs,

  /// Plan orphan removal as a `deploy --cleanup` would
  #[arg(long)]
  pub cleanup: bool,

  /// Comma-separated hosts, roles, groups or tags to plan for
  #[arg(short, long)]
  pub limit: Option<String>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

pub fn cmd_plan(args: PlanArgs, verbose: bool) -> Result<()> {
  let reconciler = args.source.reconciler()?;
  let opts = args.source.run_options(args.cleanup, args.limit.as_deref());

  let plan = reconciler.plan(&opts).context("Failed to compute plan")?;
  let report = plan.report(opts.cleanup);

  if args.output.is_json() {
    return print_json(&report);
  }

  print_report(&report, verbose);
  let changing = plan.targets.iter().filter(|t| !t.diff.is_noop()).count();
  println!();
  print_info(&format!("{changing} of {} target(s) would be synchronized", plan.targets.len()));
  Ok(())
}
