//! Template discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::{SUB_TEMPLATES_DIR, TEMPLATE_DOC_NAMES};
use crate::source::FileTree;

use super::TemplateError;
use super::definition::{AppTemplateDefinition, TreeSource};

/// A parsed template with its file trees loaded.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
  pub definition: AppTemplateDefinition,
  pub default_tree: FileTree,
  pub sub_trees: BTreeMap<String, FileTree>,
}

impl LoadedTemplate {
  /// Load the template rooted at `dir`.
  ///
  /// Returns `Ok(None)` when the directory has no metadata document.
  pub fn load(dir: &Path) -> Result<Option<Self>, TemplateError> {
    let Some(document) = find_document(dir) else {
      return Ok(None);
    };
    let id = dir
      .file_name()
      .and_then(|n| n.to_str())
      .unwrap_or_default()
      .to_string();

    let content = std::fs::read_to_string(&document).map_err(|source| TemplateError::Read {
      path: document.clone(),
      source,
    })?;
    let definition = AppTemplateDefinition::from_yaml(&id, &document, &content)?;

    let mut exclude: Vec<&str> = TEMPLATE_DOC_NAMES.to_vec();
    exclude.push(SUB_TEMPLATES_DIR);
    let default_tree = FileTree::read_dir(dir, &exclude).map_err(|source| TemplateError::Read {
      path: dir.to_path_buf(),
      source,
    })?;

    let mut sub_trees = BTreeMap::new();
    for name in definition.sub_templates() {
      let sub_dir = dir.join(SUB_TEMPLATES_DIR).join(name);
      if !sub_dir.is_dir() {
        return Err(TemplateError::MissingSubTemplate {
          path: document.clone(),
          name: name.to_string(),
        });
      }
      let tree = FileTree::read_dir(&sub_dir, &[]).map_err(|source| TemplateError::Read {
        path: sub_dir.clone(),
        source,
      })?;
      sub_trees.insert(name.to_string(), tree);
    }

    debug!(
      template = %id,
      legacy = definition.is_legacy(),
      files = default_tree.len(),
      sub_templates = sub_trees.len(),
      "loaded template"
    );

    Ok(Some(Self {
      definition,
      default_tree,
      sub_trees,
    }))
  }

  pub fn id(&self) -> &str {
    &self.definition.id
  }

  /// File tree a bundle spec is rendered from.
  pub fn tree_for(&self, source: &TreeSource) -> FileTree {
    match source {
      TreeSource::Default => self.default_tree.clone(),
      TreeSource::Sub(name) => self.sub_trees.get(name).cloned().unwrap_or_default(),
      TreeSource::Empty => FileTree::new(),
    }
  }
}

fn find_document(dir: &Path) -> Option<PathBuf> {
  TEMPLATE_DOC_NAMES
    .iter()
    .map(|name| dir.join(name))
    .find(|path| path.is_file())
}

/// All templates under a source repository's template directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
  templates: Vec<LoadedTemplate>,
}

impl TemplateCatalog {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Load every template directory under `root`, sorted by id.
  ///
  /// A missing root yields an empty catalog. Directories without a metadata
  /// document are skipped. Any structural error aborts loading.
  pub fn load(root: &Path) -> Result<Self, TemplateError> {
    if !root.is_dir() {
      debug!(path = %root.display(), "no template directory");
      return Ok(Self::empty());
    }

    let entries = std::fs::read_dir(root).map_err(|source| TemplateError::Read {
      path: root.to_path_buf(),
      source,
    })?;

    let mut dirs = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|source| TemplateError::Read {
        path: root.to_path_buf(),
        source,
      })?;
      let is_hidden = entry.file_name().to_str().map(|n| n.starts_with('.')).unwrap_or(true);
      if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) && !is_hidden {
        dirs.push(entry.path());
      }
    }
    dirs.sort();

    let mut templates = Vec::new();
    for dir in dirs {
      match LoadedTemplate::load(&dir)? {
        Some(template) => templates.push(template),
        None => debug!(path = %dir.display(), "skipping directory without template document"),
      }
    }

    info!(count = templates.len(), "loaded app templates");
    Ok(Self { templates })
  }

  pub fn from_templates(templates: Vec<LoadedTemplate>) -> Self {
    Self { templates }
  }

  pub fn iter(&self) -> impl Iterator<Item = &LoadedTemplate> {
    self.templates.iter()
  }

  pub fn get(&self, id: &str) -> Option<&LoadedTemplate> {
    self.templates.iter().find(|t| t.id() == id)
  }

  pub fn len(&self) -> usize {
    self.templates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.templates.is_empty()
  }
}
