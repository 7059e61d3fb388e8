//! Implementation of the `appfleet render` command.
//!
//! Materializes one host's desired bundle set without touching state, either
//! to inspect it or to write it to a local directory.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use appfleet_lib::distribute::{DirectoryTransport, Transport};
use appfleet_lib::render::format_value;
use appfleet_lib::vars::{ScopeOrigin, VariableContext};

use super::SourceArgs;
use crate::output::{OutputFormat, print_json, print_stat, print_success, print_warning, symbols};

#[derive(Args, Debug)]
pub struct RenderArgs {
  #[command(flatten)]
  pub source: SourceArgs,

  /// Inventory host to render for
  #[arg(long)]
  pub host: String,

  /// Write rendered bundles under <out>/<host>/<category>/
  #[arg(long)]
  pub out: Option<PathBuf>,

  /// Show the resolved variables of one bundle and where each came from
  #[arg(long, value_name = "BUNDLE")]
  pub explain: Option<String>,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct BundleSummary<'a> {
  name: &'a str,
  origin: String,
  files: usize,
  digest: String,
}

#[derive(Serialize)]
struct FailureSummary<'a> {
  bundle: &'a str,
  template: &'a str,
  error: String,
}

#[derive(Serialize)]
struct RenderOutput<'a> {
  target: String,
  bundles: Vec<BundleSummary<'a>>,
  failures: Vec<FailureSummary<'a>>,
}

#[derive(Serialize)]
struct ExplainedVar<'a> {
  value: &'a Value,
  origin: Option<&'a ScopeOrigin>,
}

pub fn cmd_render(args: RenderArgs) -> Result<()> {
  let reconciler = args.source.reconciler()?;
  let env = args.source.state.env.as_str();

  if let Some(bundle) = &args.explain {
    let Some(ctx) = reconciler.explain(env, &args.host, bundle)? else {
      bail!("No template produces bundle '{}' for host '{}'", bundle, args.host);
    };
    return print_explain(&ctx, args.output);
  }

  let desired = reconciler
    .desired_for(env, &args.host, args.source.skip_templates)
    .context("Failed to compute desired bundles")?;

  if let Some(out) = &args.out {
    let transport = DirectoryTransport::new(out);
    transport
      .sync(&desired.target, &desired.bundles)
      .with_context(|| format!("Failed to write bundles to {}", out.display()))?;
  }

  if args.output.is_json() {
    print_json(&RenderOutput {
      target: desired.target.to_string(),
      bundles: desired
        .bundles
        .iter()
        .map(|b| BundleSummary {
          name: &b.name,
          origin: b.origin.to_string(),
          files: b.files.len(),
          digest: b.digest().to_string(),
        })
        .collect(),
      failures: desired
        .failures
        .iter()
        .map(|f| FailureSummary {
          bundle: &f.bundle,
          template: &f.template,
          error: f.error.to_string(),
        })
        .collect(),
    })?;
  } else {
    print_success(&format!("{}: {} bundle(s)", desired.target, desired.bundles.len()));
    for bundle in &desired.bundles {
      println!(
        "  {} {} {} ({} file(s), {})",
        symbols::INFO,
        bundle.name,
        bundle.digest().short(),
        bundle.files.len(),
        bundle.origin
      );
    }
    for failure in &desired.failures {
      print_warning(&format!(
        "{} from {} failed: {}",
        failure.bundle, failure.template, failure.error
      ));
    }
    if let Some(out) = &args.out {
      print_stat("Written to", &out.display().to_string());
    }
  }

  if !desired.failures.is_empty() {
    bail!("{} bundle(s) failed to materialize", desired.failures.len());
  }
  Ok(())
}

fn print_explain(ctx: &VariableContext, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    let vars: serde_json::Map<String, Value> = ctx
      .values()
      .iter()
      .map(|(key, value)| {
        let explained = ExplainedVar {
          value,
          origin: ctx.origin(key),
        };
        serde_json::to_value(explained).map(|v| (key.clone(), v))
      })
      .collect::<Result<_, _>>()
      .context("Failed to serialize variables")?;
    return print_json(&vars);
  }

  for (key, value) in ctx.values() {
    let origin = ctx.origin(key).map(|o| o.name.as_str()).unwrap_or("?");
    println!("{key} = {}  [{origin}]", format_value(value));
  }
  Ok(())
}
