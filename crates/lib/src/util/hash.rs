//! Content hashing for bundles.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character SHA-256 digest
//! - `hash_tree()`: digest of an in-memory bundle file map
//! - `hash_directory()`: digest of a bundle staged on disk, comparable with `hash_tree()`
//! - `hash_bytes()`: arbitrary byte hashing

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::consts::DIGEST_PREFIX_LEN;

/// A full 64-character SHA256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Truncated form for human-facing output.
  pub fn short(&self) -> &str {
    &self.0[..self.0.len().min(DIGEST_PREFIX_LEN)]
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error during directory hashing.
#[derive(Debug, thiserror::Error)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },
}

/// Compute the digest of a relative-path → content map.
///
/// Entries are hashed in path order, so two maps with the same files always
/// produce the same digest.
pub fn hash_tree(files: &BTreeMap<String, Vec<u8>>) -> ContentHash {
  let mut hasher = Sha256::new();
  for (path, content) in files {
    let entry = format!("F:{}:{}", path, hash_bytes(content).0);
    hasher.update(entry.as_bytes());
    hasher.update(b"\n");
  }
  ContentHash(format!("{:x}", hasher.finalize()))
}

/// Compute the digest of a directory's regular files.
///
/// Paths are taken relative to `path` with `/` separators, matching the keys
/// used by [`hash_tree`]. Directories and special files do not contribute.
///
/// # Arguments
///
/// * `path` - The directory to hash
/// * `exclude` - File/directory names to skip
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let mut files = BTreeMap::new();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.file_name()
      .to_str()
      .map(|name| !exclude.contains(&name))
      .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let rel_path = entry
      .path()
      .strip_prefix(path)
      .unwrap_or(entry.path())
      .components()
      .map(|c| c.as_os_str().to_string_lossy().to_string())
      .collect::<Vec<_>>()
      .join("/");

    let content = fs::read(entry.path()).map_err(|e| DirHashError::ReadFile {
      path: entry.path().display().to_string(),
      message: e.to_string(),
    })?;
    files.insert(rel_path, content);
  }

  Ok(hash_tree(&files))
}

/// Hash arbitrary bytes.
///
/// Returns the full 64-character SHA256 hash.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  let mut hasher = Sha256::new();
  hasher.update(data);
  ContentHash(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn tree(entries: &[(&str, &str)]) -> BTreeMap<String, Vec<u8>> {
    entries
      .iter()
      .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
      .collect()
  }

  #[test]
  fn hash_tree_is_deterministic() {
    let files = tree(&[("default/app.conf", "[install]\n"), ("README", "hi")]);
    assert_eq!(hash_tree(&files), hash_tree(&files.clone()));
  }

  #[test]
  fn hash_tree_changes_with_content() {
    let a = tree(&[("default/app.conf", "a")]);
    let b = tree(&[("default/app.conf", "b")]);
    assert_ne!(hash_tree(&a), hash_tree(&b));
  }

  #[test]
  fn hash_tree_changes_with_path() {
    let a = tree(&[("default/x.conf", "same")]);
    let b = tree(&[("local/x.conf", "same")]);
    assert_ne!(hash_tree(&a), hash_tree(&b));
  }

  #[test]
  fn directory_hash_matches_tree_hash() {
    let temp = tempdir().unwrap();
    fs::create_dir_all(temp.path().join("default")).unwrap();
    fs::write(temp.path().join("default/app.conf"), "[install]\n").unwrap();
    fs::write(temp.path().join("README"), "hi").unwrap();

    let files = tree(&[("default/app.conf", "[install]\n"), ("README", "hi")]);
    assert_eq!(hash_directory(temp.path(), &[]).unwrap(), hash_tree(&files));
  }

  #[test]
  fn directory_hash_respects_exclusions() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "content").unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::create_dir(temp.path().join("tmp")).unwrap();
    fs::write(temp.path().join("tmp/temp-file"), "temp").unwrap();
    let hash2 = hash_directory(temp.path(), &["tmp"]).unwrap();

    assert_eq!(hash1, hash2);
  }

  #[test]
  fn short_digest_is_truncated() {
    let hash = hash_bytes(b"hello world");
    assert_eq!(hash.0.len(), 64);
    assert_eq!(hash.short().len(), DIGEST_PREFIX_LEN);
    assert!(hash.0.starts_with(hash.short()));
  }
}
