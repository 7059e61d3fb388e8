use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::consts::RUN_CONTEXT;
use crate::distribute::{Executed, Stage, StageError, TargetPlan, Transport, TransportError, execute_plan};
use crate::inventory::Inventory;
use crate::overlay::{AssetCache, NoAssetCache};
use crate::source::SourceRepo;
use crate::state::{DeploymentEvent, LastDeployment, LockMode, StateFiles, StateLock, StateStore, now_unix};
use crate::target::PathCategory;
use crate::template::{MaterializeRequest, TemplateCatalog, explain_bundle};
use crate::vars::VariableContext;

use super::desired::{DesiredInputs, DesiredTarget, StaticBundles, desired_for_host};
use super::diff::TargetDiff;
use super::report::{BundleFailureReport, RunReport, TargetOutcome, TargetReport};
use super::{RunError, RunOptions};

static RUN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique, sortable identifier for one run.
fn generate_run_id() -> String {
  let millis = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default();
  let seq = RUN_COUNTER.fetch_add(1, Ordering::Relaxed);
  format!("{millis:x}{seq:02x}")
}

/// One target after the diff phase.
#[derive(Debug)]
pub struct PlannedTarget {
  pub desired: DesiredTarget,
  pub diff: TargetDiff,
}

impl PlannedTarget {
  fn report(&self, cleanup: bool) -> TargetReport {
    let outcome = if self.diff.is_noop() {
      TargetOutcome::Skipped
    } else {
      TargetOutcome::Planned
    };
    TargetReport {
      target: self.desired.target.clone(),
      cluster: self.desired.cluster.clone(),
      deployed: self.diff.desired.iter().cloned().collect(),
      added: self.diff.added.iter().cloned().collect(),
      written: Vec::new(),
      removed: self.diff.removals(cleanup),
      orphaned_retained: if cleanup {
        Vec::new()
      } else {
        self.diff.orphaned.iter().cloned().collect()
      },
      held: self.diff.held.iter().cloned().collect(),
      bundle_failures: self
        .desired
        .failures
        .iter()
        .map(|f| BundleFailureReport {
          bundle: f.bundle.clone(),
          template: f.template.clone(),
          error: f.error.to_string(),
        })
        .collect(),
      trigger: None,
      outcome,
    }
  }

  fn transport_plan(&self, cleanup: bool) -> TargetPlan {
    let category = self.desired.target.category;
    TargetPlan {
      target: self.desired.target.clone(),
      bundles: self.desired.bundles.clone(),
      remove: self.diff.removals(cleanup),
      trigger: (!category.is_cluster_scoped()).then(|| category.trigger()),
    }
  }
}

/// Result of the diff phase for every selected target.
#[derive(Debug)]
pub struct RunPlan {
  pub run_id: String,
  pub environment: String,
  pub started_at: u64,
  pub targets: Vec<PlannedTarget>,
  /// State as loaded at the start of the run.
  pub store: StateStore,
}

impl RunPlan {
  /// Report of what a run would do, without distributing anything.
  pub fn report(&self, cleanup: bool) -> RunReport {
    RunReport {
      run_id: self.run_id.clone(),
      environment: self.environment.clone(),
      dry_run: true,
      cleanup,
      targets: self.targets.iter().map(|t| t.report(cleanup)).collect(),
    }
  }
}

/// Drives runs for one inventory and source repository.
pub struct Reconciler {
  inventory: Inventory,
  repo: SourceRepo,
  assets: Arc<dyn AssetCache>,
  state: StateFiles,
}

impl Reconciler {
  pub fn new(inventory: Inventory, repo: SourceRepo, state: StateFiles) -> Self {
    Self {
      inventory,
      repo,
      assets: Arc::new(NoAssetCache),
      state,
    }
  }

  pub fn with_assets(mut self, assets: Arc<dyn AssetCache>) -> Self {
    self.assets = assets;
    self
  }

  pub fn inventory(&self) -> &Inventory {
    &self.inventory
  }

  pub fn state_files(&self) -> &StateFiles {
    &self.state
  }

  pub fn load_catalog(&self) -> Result<TemplateCatalog, RunError> {
    Ok(TemplateCatalog::load(&self.repo.templates_dir())?)
  }

  /// Desired set of a single host, outside of any run.
  pub fn desired_for(&self, environment: &str, host: &str, skip_templates: bool) -> Result<DesiredTarget, RunError> {
    let host = self
      .inventory
      .host(host)
      .ok_or_else(|| RunError::UnknownHost(host.to_string()))?;
    let catalog = self.load_catalog()?;
    let statics = StaticBundles::load(&self.repo, self.assets.as_ref(), [host])?;
    let inputs = DesiredInputs {
      environment,
      inventory: &self.inventory,
      catalog: &catalog,
      skip_templates,
      assets: self.assets.as_ref(),
    };
    desired_for_host(&inputs, &statics, host)
  }

  /// Resolved variables `bundle` is rendered with on `host`.
  ///
  /// `None` when no template produces that bundle for the host.
  pub fn explain(&self, environment: &str, host: &str, bundle: &str) -> Result<Option<VariableContext>, RunError> {
    let host = self
      .inventory
      .host(host)
      .ok_or_else(|| RunError::UnknownHost(host.to_string()))?;
    let catalog = self.load_catalog()?;
    let scopes = self.inventory.scopes_for(environment, host);
    let req = MaterializeRequest {
      environment,
      host,
      scopes: &scopes,
      assets: self.assets.as_ref(),
    };
    for template in catalog.iter() {
      for role in host.role.template_roles() {
        if let Some(ctx) = explain_bundle(template, *role, bundle, &req) {
          return Ok(Some(ctx));
        }
      }
    }
    Ok(None)
  }

  fn build_plan(&self, opts: &RunOptions, store: StateStore) -> Result<RunPlan, RunError> {
    let hosts = self.inventory.select(&opts.selector);
    if hosts.is_empty() {
      warn!(env = %opts.environment, "no hosts matched the target selector");
    }

    // Structural template errors abort the run even when templates are
    // skipped: the catalog still decides which records are held.
    let catalog = self.load_catalog()?;
    let statics = StaticBundles::load(&self.repo, self.assets.as_ref(), hosts.iter().copied())?;
    let inputs = DesiredInputs {
      environment: &opts.environment,
      inventory: &self.inventory,
      catalog: &catalog,
      skip_templates: opts.skip_templates,
      assets: self.assets.as_ref(),
    };

    let mut targets = Vec::with_capacity(hosts.len());
    for host in hosts {
      let desired = desired_for_host(&inputs, &statics, host)?;
      let previous = store.managed(&desired.target);
      let diff = TargetDiff::compute(&previous, &desired.names(), &desired.held_names());
      debug!(
        target = %desired.target,
        added = diff.added.len(),
        unchanged = diff.unchanged.len(),
        orphaned = diff.orphaned.len(),
        held = diff.held.len(),
        "computed diff"
      );
      targets.push(PlannedTarget { desired, diff });
    }

    Ok(RunPlan {
      run_id: generate_run_id(),
      environment: opts.environment.clone(),
      started_at: now_unix(),
      targets,
      store,
    })
  }

  /// Compute desired sets and diffs under a shared lock.
  pub fn plan(&self, opts: &RunOptions) -> Result<RunPlan, RunError> {
    let _lock = StateLock::acquire(&self.state, &opts.environment, LockMode::Shared, "plan")?;
    let store = self.state.load(&opts.environment)?;
    self.build_plan(opts, store)
  }

  /// Execute one run.
  ///
  /// Holds the environment's exclusive lock for the whole run. Targets whose
  /// distribution fails keep their previous record; everything else is
  /// committed and the state persisted once at the end.
  pub async fn run(&self, opts: &RunOptions, transport: Arc<dyn Transport>) -> Result<RunReport, RunError> {
    let command = if opts.dry_run { "plan" } else { "deploy" };
    let _lock = StateLock::acquire(&self.state, &opts.environment, LockMode::Exclusive, command)?;
    let store = self.state.load(&opts.environment)?;
    let plan = self.build_plan(opts, store)?;

    if opts.dry_run {
      info!(run = %plan.run_id, targets = plan.targets.len(), "dry run, nothing distributed");
      return Ok(plan.report(opts.cleanup));
    }

    let RunPlan {
      run_id,
      environment,
      started_at,
      targets,
      mut store,
    } = plan;

    info!(
      run = %run_id,
      env = %environment,
      targets = targets.len(),
      cleanup = opts.cleanup,
      "starting distribution"
    );

    let mut reports: Vec<TargetReport> = targets.iter().map(|t| t.report(opts.cleanup)).collect();
    let results = distribute(&targets, opts, Arc::clone(&transport)).await;

    for (idx, result) in results.into_iter().enumerate() {
      let report = &mut reports[idx];
      if targets[idx].diff.is_noop() {
        continue;
      }
      match result {
        Some(Ok(executed)) => {
          report.written = executed.sync.written;
          report.removed = executed.removed;
          report.trigger = executed.triggered;
          report.outcome = TargetOutcome::Succeeded;
        }
        Some(Err(e)) => {
          warn!(target = %report.target, stage = %e.stage, error = %e.source, "target failed");
          report.removed.clear();
          report.outcome = TargetOutcome::Failed {
            stage: e.stage,
            error: e.source.to_string(),
          };
        }
        None => {
          report.removed.clear();
          report.outcome = TargetOutcome::Failed {
            stage: Stage::Sync,
            error: "distribution worker did not complete".to_string(),
          };
        }
      }
    }

    trigger_clusters(&targets, &mut reports, transport).await;

    let mut seq = 0usize;
    for (planned, report) in targets.iter().zip(&reports) {
      if report.outcome != TargetOutcome::Succeeded {
        continue;
      }
      let next = planned.diff.next_record(opts.cleanup);
      seq += 1;
      store.record_event(DeploymentEvent {
        id: format!("{run_id}-{seq:03}"),
        timestamp: started_at,
        host: planned.desired.target.host.clone(),
        path: planned.desired.target.category.as_str().to_string(),
        apps: next.iter().cloned().collect(),
        removed: report.removed.clone(),
        user: opts.user.clone(),
      });
      store.set_managed(&planned.desired.target, next);
    }

    store.set_last_deployment(LastDeployment {
      id: run_id.clone(),
      timestamp: started_at,
      playbook: RUN_CONTEXT.to_string(),
      user: opts.user.clone(),
      environment: environment.clone(),
    });
    self.state.persist(&environment, &store)?;

    let report = RunReport {
      run_id,
      environment,
      dry_run: false,
      cleanup: opts.cleanup,
      targets: reports,
    };
    info!(
      run = %report.run_id,
      succeeded = report.succeeded(),
      failed = report.failed(),
      bundle_failures = report.bundle_failures(),
      "run complete"
    );
    Ok(report)
  }
}

/// Run every target's plan on a bounded worker pool.
///
/// Returns one slot per target, in target order. No-op targets and workers
/// that died leave their slot empty.
async fn distribute(
  targets: &[PlannedTarget],
  opts: &RunOptions,
  transport: Arc<dyn Transport>,
) -> Vec<Option<Result<Executed, StageError>>> {
  let semaphore = Arc::new(Semaphore::new(opts.parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for (idx, planned) in targets.iter().enumerate() {
    if planned.diff.is_noop() {
      debug!(target = %planned.desired.target, "nothing desired or managed, skipping");
      continue;
    }
    let plan = planned.transport_plan(opts.cleanup);
    let transport = Arc::clone(&transport);
    let semaphore = Arc::clone(&semaphore);

    join_set.spawn(async move {
      let _permit = semaphore.acquire_owned().await.ok();
      let target = plan.target.to_string();
      let result = tokio::task::spawn_blocking(move || execute_plan(transport.as_ref(), &plan))
        .await
        .unwrap_or_else(|e| {
          Err(StageError {
            stage: Stage::Sync,
            source: TransportError::Rejected {
              target,
              message: format!("worker panicked: {e}"),
            },
          })
        });
      (idx, result)
    });
  }

  let mut results: Vec<Option<Result<Executed, StageError>>> = targets.iter().map(|_| None).collect();
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok((idx, result)) => results[idx] = Some(result),
      Err(e) => error!(error = %e, "distribution task panicked"),
    }
  }
  results
}

/// Issue deferred cluster triggers.
///
/// A cluster's trigger goes out once, through its first member by name, and
/// only when every member distributed successfully. Otherwise every member
/// is marked failed so none of them commit.
async fn trigger_clusters(targets: &[PlannedTarget], reports: &mut [TargetReport], transport: Arc<dyn Transport>) {
  let mut clusters: BTreeMap<(PathCategory, String), Vec<usize>> = BTreeMap::new();
  for (idx, planned) in targets.iter().enumerate() {
    if let Some(cluster) = &planned.desired.cluster
      && !planned.diff.is_noop()
    {
      clusters
        .entry((planned.desired.target.category, cluster.clone()))
        .or_default()
        .push(idx);
    }
  }

  for ((category, cluster), mut members) in clusters {
    members.sort_by(|a, b| targets[*a].desired.target.cmp(&targets[*b].desired.target));

    let failed: Vec<String> = members
      .iter()
      .filter(|idx| reports[**idx].outcome.is_failed())
      .map(|idx| targets[*idx].desired.target.host.clone())
      .collect();
    if !failed.is_empty() {
      warn!(cluster = %cluster, failed = ?failed, "withholding cluster trigger");
      let error = format!("cluster {cluster} trigger withheld: {} failed", failed.join(", "));
      for idx in &members {
        if !reports[*idx].outcome.is_failed() {
          reports[*idx].removed.clear();
          reports[*idx].outcome = TargetOutcome::Failed {
            stage: Stage::Trigger,
            error: error.clone(),
          };
        }
      }
      continue;
    }

    let lead = targets[members[0]].desired.target.clone();
    let trigger = category.trigger();
    let worker = Arc::clone(&transport);
    let issued = {
      let lead = lead.clone();
      tokio::task::spawn_blocking(move || worker.trigger(&lead, trigger)).await
    };
    let error = match issued {
      Ok(Ok(())) => {
        info!(cluster = %cluster, via = %lead, trigger = %trigger, members = members.len(), "issued cluster trigger");
        for idx in &members {
          reports[*idx].trigger = Some(trigger);
        }
        continue;
      }
      Ok(Err(e)) => e.to_string(),
      Err(e) => format!("trigger task panicked: {e}"),
    };
    warn!(cluster = %cluster, via = %lead, error = %error, "cluster trigger failed");
    for idx in &members {
      reports[*idx].removed.clear();
      reports[*idx].outcome = TargetOutcome::Failed {
        stage: Stage::Trigger,
        error: error.clone(),
      };
    }
  }
}
