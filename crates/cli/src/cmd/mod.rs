mod deploy;
mod history;
mod plan;
mod render;
mod report;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use appfleet_lib::inventory::{Inventory, TargetSelector};
use appfleet_lib::overlay::DirAssetCache;
use appfleet_lib::reconcile::{Reconciler, RunOptions};
use appfleet_lib::source::SourceRepo;
use appfleet_lib::state::StateFiles;

pub use deploy::{DeployArgs, cmd_deploy};
pub use history::{HistoryArgs, cmd_history};
pub use plan::{PlanArgs, cmd_plan};
pub use render::{RenderArgs, cmd_render};
pub use status::{StatusArgs, cmd_status};

/// Where managed state lives.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
  /// Environment name (e.g. production)
  #[arg(short, long)]
  pub env: String,

  /// State directory (default: $APPFLEET_STATE_DIR or the platform data dir)
  #[arg(long)]
  pub state_dir: Option<PathBuf>,
}

impl StateArgs {
  pub fn state_files(&self) -> StateFiles {
    self
      .state_dir
      .clone()
      .map(StateFiles::new)
      .unwrap_or_else(StateFiles::default_location)
  }
}

/// Inputs every materializing command needs.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
  #[command(flatten)]
  pub state: StateArgs,

  /// Inventory file
  #[arg(short, long)]
  pub inventory: PathBuf,

  /// Source repository root
  #[arg(short, long, default_value = ".")]
  pub source: PathBuf,

  /// Asset cache directory overlaid onto template bundles
  #[arg(long)]
  pub asset_cache: Option<PathBuf>,

  /// Deploy static bundles only
  #[arg(long)]
  pub skip_templates: bool,
}

impl SourceArgs {
  pub fn reconciler(&self) -> Result<Reconciler> {
    let inventory = Inventory::load(&self.inventory)
      .with_context(|| format!("Failed to load inventory: {}", self.inventory.display()))?;
    let repo = SourceRepo::open(&self.source)
      .with_context(|| format!("Failed to open source repository: {}", self.source.display()))?;

    let mut reconciler = Reconciler::new(inventory, repo, self.state.state_files());
    if let Some(cache) = &self.asset_cache {
      reconciler = reconciler.with_assets(Arc::new(DirAssetCache::new(cache)));
    }
    Ok(reconciler)
  }

  pub fn run_options(&self, cleanup: bool, limit: Option<&str>) -> RunOptions {
    let mut opts = RunOptions::new(&self.state.env);
    opts.cleanup = cleanup;
    opts.skip_templates = self.skip_templates;
    if let Some(limit) = limit {
      opts.selector = TargetSelector::parse(limit);
    }
    opts
  }
}
