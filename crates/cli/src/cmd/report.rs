//! Text rendering of run reports, shared by `deploy` and `plan`.

use owo_colors::{OwoColorize, Stream};

use appfleet_lib::reconcile::{RunReport, TargetOutcome, TargetReport};

use crate::output::symbols;

pub fn print_report(report: &RunReport, verbose: bool) {
  for target in &report.targets {
    print_target(target, report.cleanup, verbose);
  }
}

fn print_target(t: &TargetReport, cleanup: bool, verbose: bool) {
  let (symbol, status) = match &t.outcome {
    TargetOutcome::Planned => (symbols::TILDE, "planned".to_string()),
    TargetOutcome::Skipped => (symbols::INFO, "nothing to do".to_string()),
    TargetOutcome::Succeeded => (symbols::SUCCESS, "deployed".to_string()),
    TargetOutcome::Failed { stage, error } => (symbols::ERROR, format!("failed at {stage}: {error}")),
  };
  let mut summary = format!("{} bundle(s)", t.deployed.len());
  if !t.written.is_empty() {
    summary.push_str(&format!(", {} written", t.written.len()));
  }
  if let Some(trigger) = t.trigger {
    summary.push_str(&format!(", {trigger}"));
  }

  let line = format!("{symbol} {} {status} ({summary})", t.target);
  if t.outcome.is_failed() {
    println!("{}", line.if_supports_color(Stream::Stdout, |s| s.red()));
  } else {
    println!("{line}");
  }

  let show = |sym: &str, name: &str, note: &str| {
    println!("    {sym} {name}{note}");
  };
  for name in &t.added {
    show(symbols::ADD, name, "");
  }
  for name in &t.removed {
    show(symbols::REMOVE, name, "");
  }
  if !cleanup {
    for name in &t.orphaned_retained {
      show(symbols::WARNING, name, " (orphaned, kept without --cleanup)");
    }
  }
  for name in &t.held {
    show(symbols::WARNING, name, " (held: failed to materialize)");
  }
  for failure in &t.bundle_failures {
    println!(
      "    {} {} from {}: {}",
      symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
      failure.bundle,
      failure.template,
      failure.error
    );
  }
  if verbose {
    for name in t.deployed.iter().filter(|n| !t.added.contains(n)) {
      show(symbols::INFO, name, "");
    }
  }
}
