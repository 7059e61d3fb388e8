//! App templates: discovery, parsing and materialization.
//!
//! # Layout
//!
//! ```text
//! splunk-app-templates/<id>/
//! ├── app.yml               # metadata document (or app.yaml)
//! ├── default/...           # default file tree, rendered per bundle
//! └── templates/<sub>/...   # named sub-template trees for explicit bundles
//! ```
//!
//! Structural problems (unparseable documents, ambiguous shape, missing
//! sub-templates) are reported as [`TemplateError`] and abort the run before
//! anything is distributed. Problems rendering one bundle are reported as a
//! [`BundleFailure`] and only affect that bundle.

mod definition;
mod load;
mod materialize;
pub mod stanza;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use definition::{
  AppTemplateDefinition, BundleSpec, EnhancedTemplate, LegacyTemplate, Resources, RoleSection, ServerclassSpec,
  TemplateMeta, TemplateShape, TreeSource, is_valid_bundle_name,
};
pub use load::{LoadedTemplate, TemplateCatalog};
pub use materialize::{
  BundleFailure, MaterializeError, MaterializeRequest, Materialized, bundle_context, explain_bundle, materialize,
};

/// A template document that cannot be used at all.
#[derive(Debug, Error)]
pub enum TemplateError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("{path}: document has both role sections and splunk_roles")]
  AmbiguousShape { path: PathBuf },

  #[error("{path}: document has neither role sections nor splunk_roles")]
  NoRoleSections { path: PathBuf },

  #[error("{path}: missing required field '{field}'")]
  MissingField { path: PathBuf, field: &'static str },

  #[error("{path}: unknown role '{role}'")]
  UnknownRole { path: PathBuf, role: String },

  #[error("{path}: invalid bundle name '{name}'")]
  InvalidBundleName { path: PathBuf, name: String },

  #[error("{path}: bundle '{name}' declared more than once")]
  DuplicateBundleSpec { path: PathBuf, name: String },

  #[error("{path}: sub-template '{name}' not found")]
  MissingSubTemplate { path: PathBuf, name: String },
}
