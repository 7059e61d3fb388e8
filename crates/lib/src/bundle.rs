//! Deployable app bundles.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::role::TemplateRole;
use crate::source::{FileTree, SourceDir};
use crate::util::hash::{ContentHash, hash_tree};

/// Where a bundle came from. Used for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleOrigin {
  /// Materialized from an app template.
  Template {
    template: String,
    document: PathBuf,
    role: TemplateRole,
  },
  /// Copied from a static source directory.
  Static { dir: SourceDir },
}

impl fmt::Display for BundleOrigin {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BundleOrigin::Template { template, role, .. } => write!(f, "template {template} ({role})"),
      BundleOrigin::Static { dir } => write!(f, "static {}/", dir.dir_name()),
    }
  }
}

/// A named directory of configuration files deployed as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppBundle {
  pub name: String,
  pub files: FileTree,
  pub origin: BundleOrigin,
}

impl AppBundle {
  /// Digest of the bundle contents, independent of origin.
  pub fn digest(&self) -> ContentHash {
    hash_tree(self.files.files())
  }

  /// Template role this bundle was generated for, if any.
  pub fn role(&self) -> Option<TemplateRole> {
    match &self.origin {
      BundleOrigin::Template { role, .. } => Some(*role),
      BundleOrigin::Static { .. } => None,
    }
  }
}
