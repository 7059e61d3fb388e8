//! Desired bundle sets per target.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::bundle::AppBundle;
use crate::inventory::{Host, Inventory};
use crate::overlay::{AssetCache, overlay_bundle};
use crate::source::{SourceDir, SourceRepo};
use crate::target::Target;
use crate::template::{BundleFailure, MaterializeRequest, Materialized, TemplateCatalog, materialize};

use super::RunError;

/// Everything one target should receive this run.
#[derive(Debug)]
pub struct DesiredTarget {
  pub host: Host,
  pub target: Target,
  pub cluster: Option<String>,
  /// Sorted by name, names unique.
  pub bundles: Vec<AppBundle>,
  pub failures: Vec<BundleFailure>,
  /// Template bundles not produced because templates were skipped.
  pub skipped: BTreeSet<String>,
}

impl DesiredTarget {
  pub fn names(&self) -> BTreeSet<String> {
    self.bundles.iter().map(|b| b.name.clone()).collect()
  }

  pub fn failed_names(&self) -> BTreeSet<String> {
    self.failures.iter().map(|f| f.bundle.clone()).collect()
  }

  /// Names that must not be treated as orphans this run.
  pub fn held_names(&self) -> BTreeSet<String> {
    let mut names = self.failed_names();
    names.extend(self.skipped.iter().cloned());
    names
  }
}

/// Shared inputs for computing desired sets.
pub struct DesiredInputs<'a> {
  pub environment: &'a str,
  pub inventory: &'a Inventory,
  pub catalog: &'a TemplateCatalog,
  /// Deploy static bundles only. Bundles the catalog declares are held.
  pub skip_templates: bool,
  pub assets: &'a dyn AssetCache,
}

/// Static bundles per source directory, read once per run.
#[derive(Debug, Default)]
pub struct StaticBundles {
  by_dir: HashMap<SourceDir, Vec<AppBundle>>,
}

impl StaticBundles {
  /// Read the static directories the given hosts need and merge any asset
  /// overlay named like each bundle.
  pub fn load<'h>(
    repo: &SourceRepo,
    assets: &dyn AssetCache,
    hosts: impl IntoIterator<Item = &'h Host>,
  ) -> Result<Self, RunError> {
    let mut by_dir = HashMap::new();
    for host in hosts {
      if let Some(dir) = SourceDir::for_role(host.role)
        && !by_dir.contains_key(&dir)
      {
        let mut bundles = repo.static_bundles(dir)?;
        for bundle in &mut bundles {
          overlay_bundle(&bundle.name, &mut bundle.files, assets)?;
        }
        by_dir.insert(dir, bundles);
      }
    }
    Ok(Self { by_dir })
  }

  pub fn for_host(&self, host: &Host) -> &[AppBundle] {
    SourceDir::for_role(host.role)
      .and_then(|dir| self.by_dir.get(&dir))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}

/// Compute the desired set for one host.
///
/// Two bundles with the same name in one pass is a structural error: the
/// whole run stops before anything is distributed.
pub fn desired_for_host(
  inputs: &DesiredInputs<'_>,
  statics: &StaticBundles,
  host: &Host,
) -> Result<DesiredTarget, RunError> {
  let target = host.target();
  let mut produced = Materialized {
    bundles: statics.for_host(host).to_vec(),
    failures: Vec::new(),
  };

  let mut skipped = BTreeSet::new();
  if inputs.skip_templates {
    for template in inputs.catalog.iter() {
      skipped.extend(template.definition.bundle_specs().into_iter().map(|spec| spec.name.clone()));
    }
  } else {
    let scopes = inputs.inventory.scopes_for(inputs.environment, host);
    let req = MaterializeRequest {
      environment: inputs.environment,
      host,
      scopes: &scopes,
      assets: inputs.assets,
    };
    for template in inputs.catalog.iter() {
      for role in host.role.template_roles() {
        let out = materialize(template, *role, &req);
        let emitted = !out.bundles.is_empty() || !out.failures.is_empty();
        produced.extend(out);
        // A legacy template yields one bundle per host however many of the
        // host's roles it lists.
        if emitted && template.definition.is_legacy() {
          break;
        }
      }
    }
  }

  let mut seen: BTreeMap<String, String> = BTreeMap::new();
  for bundle in &produced.bundles {
    if let Some(first) = seen.insert(bundle.name.clone(), bundle.origin.to_string()) {
      return Err(RunError::DuplicateBundle {
        target: target.to_string(),
        name: bundle.name.clone(),
        first,
        second: bundle.origin.to_string(),
      });
    }
  }
  for failure in &produced.failures {
    if seen.contains_key(&failure.bundle) {
      return Err(RunError::DuplicateBundle {
        target: target.to_string(),
        name: failure.bundle.clone(),
        first: seen[&failure.bundle].clone(),
        second: format!("template {} ({})", failure.template, failure.role),
      });
    }
  }

  let mut bundles = produced.bundles;
  bundles.sort_by(|a, b| a.name.cmp(&b.name));

  debug!(
    target = %target,
    bundles = bundles.len(),
    failures = produced.failures.len(),
    "computed desired set"
  );

  Ok(DesiredTarget {
    cluster: host.cluster_id(),
    host: host.clone(),
    target,
    bundles,
    failures: produced.failures,
    skipped,
  })
}
