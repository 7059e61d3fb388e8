mod cmd;
mod output;
mod prompts;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{DeployArgs, HistoryArgs, PlanArgs, RenderArgs, StatusArgs};

/// appfleet - Splunk app bundle deployment engine
#[derive(Parser)]
#[command(name = "appfleet")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Materialize, distribute and commit bundles for an environment
  Deploy(DeployArgs),

  /// Show what a deploy would change without touching any target
  Plan(PlanArgs),

  /// Show bundles currently recorded as managed
  Status(StatusArgs),

  /// Show the deployment history
  History(HistoryArgs),

  /// Materialize the bundles of one host locally
  Render(RenderArgs),
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Deploy(args) => cmd::cmd_deploy(args, cli.verbose),
    Commands::Plan(args) => cmd::cmd_plan(args, cli.verbose),
    Commands::Status(args) => cmd::cmd_status(args),
    Commands::History(args) => cmd::cmd_history(args),
    Commands::Render(args) => cmd::cmd_render(args),
  }
}
