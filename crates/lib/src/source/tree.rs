//! In-memory file trees.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

/// Relative path → content map for one bundle or template.
///
/// Paths always use `/` separators so trees compare equal across platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileTree {
  files: BTreeMap<String, Vec<u8>>,
}

impl FileTree {
  pub fn new() -> Self {
    Self::default()
  }

  /// Read every regular file under `root`.
  ///
  /// Entries directly under `root` whose name is in `exclude` are skipped,
  /// together with their contents. Symlinks to files are read through; any
  /// other symlink is skipped with a warning.
  pub fn read_dir(root: &Path, exclude: &[&str]) -> io::Result<Self> {
    let mut files = BTreeMap::new();

    let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|e| {
      e.depth() != 1
        || e
          .file_name()
          .to_str()
          .map(|name| !exclude.contains(&name))
          .unwrap_or(true)
    });

    for entry in walker {
      let entry = entry.map_err(io::Error::other)?;
      let file_type = entry.file_type();
      if file_type.is_symlink() {
        if !std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file()) {
          warn!(path = %entry.path().display(), "skipping symlink that does not point to a file");
          continue;
        }
      } else if !file_type.is_file() {
        continue;
      }
      let rel = relative_key(root, entry.path());
      files.insert(rel, std::fs::read(entry.path())?);
    }

    Ok(Self { files })
  }

  pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
    self.files.insert(path.into(), content.into())
  }

  pub fn get(&self, path: &str) -> Option<&[u8]> {
    self.files.get(path).map(Vec::as_slice)
  }

  pub fn contains(&self, path: &str) -> bool {
    self.files.contains_key(path)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
    self.files.iter()
  }

  pub fn paths(&self) -> impl Iterator<Item = &String> {
    self.files.keys()
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn files(&self) -> &BTreeMap<String, Vec<u8>> {
    &self.files
  }

  pub fn into_files(self) -> BTreeMap<String, Vec<u8>> {
    self.files
  }
}

impl FromIterator<(String, Vec<u8>)> for FileTree {
  fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
    Self {
      files: iter.into_iter().collect(),
    }
  }
}

fn relative_key(root: &Path, path: &Path) -> String {
  path
    .strip_prefix(root)
    .unwrap_or(path)
    .components()
    .map(|c| c.as_os_str().to_string_lossy().to_string())
    .collect::<Vec<_>>()
    .join("/")
}
