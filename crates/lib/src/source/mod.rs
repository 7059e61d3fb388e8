//! Source repository layout.
//!
//! # Layout
//!
//! ```text
//! {source}/
//! ├── deploymentserver/<bundle>/   # static bundles per deployment path
//! ├── clustermaster/<bundle>/
//! ├── shdeployer/<bundle>/
//! ├── indexers/<bundle>/
//! ├── searchheads/<bundle>/
//! ├── standalone/<bundle>/
//! └── splunk-app-templates/<id>/  # app template definitions
//! ```
//!
//! Static bundles are copied verbatim; only templates are rendered.

mod tree;

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::bundle::{AppBundle, BundleOrigin};
use crate::role::HostRole;
use crate::target::PathCategory;

pub use tree::FileTree;

#[derive(Debug, Error)]
pub enum SourceError {
  #[error("source directory not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Top-level static bundle directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDir {
  DeploymentServer,
  ClusterMaster,
  ShDeployer,
  Indexers,
  SearchHeads,
  Standalone,
}

impl SourceDir {
  pub const ALL: [SourceDir; 6] = [
    SourceDir::DeploymentServer,
    SourceDir::ClusterMaster,
    SourceDir::ShDeployer,
    SourceDir::Indexers,
    SourceDir::SearchHeads,
    SourceDir::Standalone,
  ];

  pub fn dir_name(self) -> &'static str {
    match self {
      SourceDir::DeploymentServer => "deploymentserver",
      SourceDir::ClusterMaster => "clustermaster",
      SourceDir::ShDeployer => "shdeployer",
      SourceDir::Indexers => "indexers",
      SourceDir::SearchHeads => "searchheads",
      SourceDir::Standalone => "standalone",
    }
  }

  pub fn category(self) -> PathCategory {
    match self {
      SourceDir::DeploymentServer => PathCategory::DeploymentApps,
      SourceDir::ClusterMaster => PathCategory::ManagerApps,
      SourceDir::ShDeployer => PathCategory::ShclusterApps,
      SourceDir::Indexers | SourceDir::SearchHeads | SourceDir::Standalone => PathCategory::Apps,
    }
  }

  /// Source directory whose static bundles a host of `role` receives.
  pub fn for_role(role: HostRole) -> Option<SourceDir> {
    match role {
      HostRole::DeploymentServer => Some(SourceDir::DeploymentServer),
      HostRole::ClusterManager => Some(SourceDir::ClusterMaster),
      HostRole::ShcDeployer => Some(SourceDir::ShDeployer),
      HostRole::Indexer => Some(SourceDir::Indexers),
      HostRole::SearchHead => Some(SourceDir::SearchHeads),
      HostRole::Standalone => Some(SourceDir::Standalone),
      HostRole::HeavyForwarder | HostRole::UniversalForwarder => None,
    }
  }
}

/// A checked-out source repository.
#[derive(Debug, Clone)]
pub struct SourceRepo {
  root: PathBuf,
}

impl SourceRepo {
  pub fn open(root: impl Into<PathBuf>) -> Result<Self, SourceError> {
    let root = root.into();
    if !root.is_dir() {
      return Err(SourceError::NotFound(root));
    }
    Ok(Self { root })
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn templates_dir(&self) -> PathBuf {
    self.root.join(crate::consts::TEMPLATES_DIR)
  }

  /// Load every static bundle under `dir`, sorted by name.
  ///
  /// A missing directory yields no bundles.
  pub fn static_bundles(&self, dir: SourceDir) -> Result<Vec<AppBundle>, SourceError> {
    let path = self.root.join(dir.dir_name());
    if !path.is_dir() {
      return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = std::fs::read_dir(&path).map_err(|source| SourceError::Read {
      path: path.clone(),
      source,
    })?;
    for entry in entries {
      let entry = entry.map_err(|source| SourceError::Read {
        path: path.clone(),
        source,
      })?;
      if entry.file_type().map(|t| t.is_dir()).unwrap_or(false)
        && let Some(name) = entry.file_name().to_str()
        && !name.starts_with('.')
      {
        names.push(name.to_string());
      }
    }
    names.sort();

    let mut bundles = Vec::with_capacity(names.len());
    for name in names {
      let bundle_path = path.join(&name);
      let files = FileTree::read_dir(&bundle_path, &[]).map_err(|source| SourceError::Read {
        path: bundle_path.clone(),
        source,
      })?;
      debug!(bundle = %name, dir = dir.dir_name(), files = files.len(), "loaded static bundle");
      bundles.push(AppBundle {
        name,
        files,
        origin: BundleOrigin::Static { dir },
      });
    }

    Ok(bundles)
  }
}
