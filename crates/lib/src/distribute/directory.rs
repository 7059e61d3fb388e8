//! Transport that stages bundles into a local directory tree.
//!
//! # Layout
//!
//! ```text
//! {root}/
//! └── <host>/
//!     ├── <category path>/<bundle>/...   # e.g. manager-apps/, shcluster/apps/
//!     └── triggers.log                   # one line per issued trigger
//! ```
//!
//! Each bundle directory is replaced atomically: the new contents are written
//! to a hidden staging directory next to it and renamed into place. Bundles
//! whose on-disk digest already matches are left untouched.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bundle::AppBundle;
use crate::state::now_unix;
use crate::target::{Target, Trigger};
use crate::util::hash::hash_directory;

use super::{SyncSummary, Transport, TransportError};

const TRIGGER_LOG: &str = "triggers.log";

#[derive(Debug, Clone)]
pub struct DirectoryTransport {
  root: PathBuf,
}

impl DirectoryTransport {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory holding `target`'s bundles.
  pub fn target_dir(&self, target: &Target) -> PathBuf {
    let mut dir = self.root.join(&target.host);
    for part in target.category.as_str().split('/') {
      dir.push(part);
    }
    dir
  }

  pub fn trigger_log(&self, host: &str) -> PathBuf {
    self.root.join(host).join(TRIGGER_LOG)
  }

  fn io_error(target: &Target, path: &Path) -> impl FnOnce(io::Error) -> TransportError {
    let target = target.to_string();
    let path = path.to_path_buf();
    move |source| TransportError::Io { target, path, source }
  }

  fn check_name(target: &Target, name: &str) -> Result<(), TransportError> {
    let bad = name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']);
    if bad {
      return Err(TransportError::Rejected {
        target: target.to_string(),
        message: format!("invalid bundle name '{name}'"),
      });
    }
    Ok(())
  }

  fn write_bundle(&self, target: &Target, dir: &Path, bundle: &AppBundle) -> Result<(), TransportError> {
    let dest = dir.join(&bundle.name);
    let staging = dir.join(format!(".{}.staging", bundle.name));
    let retired = dir.join(format!(".{}.old", bundle.name));

    for leftover in [&staging, &retired] {
      if leftover.exists() {
        fs::remove_dir_all(leftover).map_err(Self::io_error(target, leftover))?;
      }
    }

    for (rel, content) in bundle.files.iter() {
      let path = rel.split('/').fold(staging.clone(), |p, part| p.join(part));
      if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(Self::io_error(target, parent))?;
      }
      fs::write(&path, content).map_err(Self::io_error(target, &path))?;
    }
    fs::create_dir_all(&staging).map_err(Self::io_error(target, &staging))?;

    if dest.exists() {
      fs::rename(&dest, &retired).map_err(Self::io_error(target, &dest))?;
    }
    fs::rename(&staging, &dest).map_err(Self::io_error(target, &dest))?;
    if retired.exists() {
      fs::remove_dir_all(&retired).map_err(Self::io_error(target, &retired))?;
    }
    Ok(())
  }
}

impl Transport for DirectoryTransport {
  fn sync(&self, target: &Target, bundles: &[AppBundle]) -> Result<SyncSummary, TransportError> {
    let dir = self.target_dir(target);
    fs::create_dir_all(&dir).map_err(Self::io_error(target, &dir))?;

    let mut summary = SyncSummary::default();
    for bundle in bundles {
      Self::check_name(target, &bundle.name)?;
      let dest = dir.join(&bundle.name);

      if dest.is_dir() {
        let current = hash_directory(&dest, &[]).map_err(|source| TransportError::Hash {
          target: target.to_string(),
          source,
        })?;
        if current == bundle.digest() {
          summary.unchanged.push(bundle.name.clone());
          continue;
        }
      }

      self.write_bundle(target, &dir, bundle)?;
      debug!(target = %target, bundle = %bundle.name, files = bundle.files.len(), "wrote bundle");
      summary.written.push(bundle.name.clone());
    }

    Ok(summary)
  }

  fn remove(&self, target: &Target, names: &[String]) -> Result<(), TransportError> {
    let dir = self.target_dir(target);
    for name in names {
      Self::check_name(target, name)?;
      let path = dir.join(name);
      match fs::remove_dir_all(&path) {
        Ok(()) => debug!(target = %target, bundle = %name, "removed bundle"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(Self::io_error(target, &path)(e)),
      }
    }
    Ok(())
  }

  fn trigger(&self, target: &Target, trigger: Trigger) -> Result<(), TransportError> {
    let path = self.trigger_log(&target.host);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).map_err(Self::io_error(target, parent))?;
    }
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&path)
      .map_err(Self::io_error(target, &path))?;
    writeln!(file, "{} {} {}", now_unix(), trigger, target.category).map_err(Self::io_error(target, &path))?;
    Ok(())
  }
}
