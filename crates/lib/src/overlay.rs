//! Asset overlays.
//!
//! Large binary assets are kept out of the source repository and supplied by
//! an external cache. When the cache holds an entry named like a bundle, its
//! files are merged into the bundle's source tree before rendering: paths in
//! the overlay replace or add files, every other source file is left alone.
//! Nothing is ever deleted, so applying the same overlay twice is a no-op.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::source::FileTree;

#[derive(Debug, Error)]
pub enum OverlayError {
  #[error("failed to read overlay for {bundle} at {path}: {source}")]
  Read {
    bundle: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Handle to an external asset cache.
pub trait AssetCache: Send + Sync {
  /// File tree cached for `bundle`, if any.
  fn lookup(&self, bundle: &str) -> Result<Option<FileTree>, OverlayError>;
}

/// Cache with no entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAssetCache;

impl AssetCache for NoAssetCache {
  fn lookup(&self, _bundle: &str) -> Result<Option<FileTree>, OverlayError> {
    Ok(None)
  }
}

/// Cache laid out as `<root>/<bundle name>/...`.
#[derive(Debug, Clone)]
pub struct DirAssetCache {
  root: PathBuf,
}

impl DirAssetCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl AssetCache for DirAssetCache {
  fn lookup(&self, bundle: &str) -> Result<Option<FileTree>, OverlayError> {
    let path = self.root.join(bundle);
    if !path.is_dir() {
      return Ok(None);
    }
    FileTree::read_dir(&path, &[])
      .map(Some)
      .map_err(|source| OverlayError::Read {
        bundle: bundle.to_string(),
        path,
        source,
      })
  }
}

/// Merge `overlay` into `tree`.
///
/// Returns the number of paths whose content changed.
pub fn apply_overlay(tree: &mut FileTree, overlay: &FileTree) -> usize {
  let mut changed = 0;
  for (path, content) in overlay.iter() {
    if tree.get(path) != Some(content.as_slice()) {
      tree.insert(path.clone(), content.clone());
      changed += 1;
    }
  }
  changed
}

/// Look up `bundle` in `cache` and merge any entry into `tree`.
///
/// Returns whether an overlay entry existed.
pub fn overlay_bundle(bundle: &str, tree: &mut FileTree, cache: &dyn AssetCache) -> Result<bool, OverlayError> {
  match cache.lookup(bundle)? {
    Some(overlay) => {
      let changed = apply_overlay(tree, &overlay);
      debug!(bundle, files = overlay.len(), changed, "applied asset overlay");
      Ok(true)
    }
    None => Ok(false),
  }
}
