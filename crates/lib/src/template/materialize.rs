//! Template materialization.
//!
//! Turns a loaded template into concrete bundles for one host and one
//! template role. Materialization is a pure function of the template, the
//! resolved variables and the asset cache contents: the same inputs always
//! produce byte-identical bundles.

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::bundle::{AppBundle, BundleOrigin};
use crate::consts::TEMPLATE_SUFFIX;
use crate::inventory::Host;
use crate::overlay::{AssetCache, OverlayError, overlay_bundle};
use crate::render::{RenderError, render};
use crate::role::TemplateRole;
use crate::source::FileTree;
use crate::vars::{ScopeChain, ScopeKind, VariableContext, Vars};

use super::definition::{BundleSpec, Resources, TemplateShape};
use super::load::LoadedTemplate;
use super::stanza::{self, ResourceError, StanzaFile};

const APP_CONF: &str = "default/app.conf";

/// Why one bundle could not be produced.
#[derive(Debug, Error)]
pub enum MaterializeError {
  #[error("failed to render {path}: {source}")]
  Render {
    path: String,
    #[source]
    source: RenderError,
  },

  #[error("invalid resource data for {file}: {source}")]
  Resource {
    file: &'static str,
    #[source]
    source: ResourceError,
  },

  #[error(transparent)]
  Overlay(#[from] OverlayError),
}

/// A bundle that failed to materialize.
#[derive(Debug)]
pub struct BundleFailure {
  pub template: String,
  pub bundle: String,
  pub role: TemplateRole,
  pub error: MaterializeError,
}

/// Output of one materialization call.
#[derive(Debug, Default)]
pub struct Materialized {
  pub bundles: Vec<AppBundle>,
  pub failures: Vec<BundleFailure>,
}

impl Materialized {
  pub fn extend(&mut self, other: Materialized) {
    self.bundles.extend(other.bundles);
    self.failures.extend(other.failures);
  }
}

/// Per-host inputs to materialization.
pub struct MaterializeRequest<'a> {
  pub environment: &'a str,
  pub host: &'a Host,
  /// Inventory scopes (environment, groups, host) for this host.
  pub scopes: &'a ScopeChain,
  pub assets: &'a dyn AssetCache,
}

/// Bundle specs of `template` that apply to this host and role.
fn applicable<'t>(
  template: &'t LoadedTemplate,
  role: TemplateRole,
  req: &MaterializeRequest<'_>,
) -> Vec<(&'t BundleSpec, Option<&'t Resources>)> {
  let in_env = |envs: &[String]| envs.is_empty() || envs.iter().any(|e| e == req.environment);

  match &template.definition.shape {
    TemplateShape::Enhanced(enhanced) => {
      if !in_env(&enhanced.environments) {
        return Vec::new();
      }
      match enhanced.section(role) {
        Some(section) => section
          .bundles
          .iter()
          .map(|spec| (spec, spec.resources.then_some(&section.resources)))
          .collect(),
        None => Vec::new(),
      }
    }
    TemplateShape::Legacy(legacy) => {
      let host_ok = legacy.target_hosts.is_empty() || legacy.target_hosts.iter().any(|h| *h == req.host.name);
      if legacy.roles.contains(&role) && in_env(&legacy.environments) && host_ok {
        vec![(&legacy.bundle, None)]
      } else {
        Vec::new()
      }
    }
  }
}

/// Engine-provided variables, lowest precedence.
fn builtin_vars(template: &LoadedTemplate, spec: &BundleSpec, role: TemplateRole, req: &MaterializeRequest<'_>) -> Vars {
  let meta = &template.definition.meta;
  let mut vars = Vars::new();
  let mut set = |key: &str, value: Option<&str>| {
    if let Some(value) = value {
      vars.insert(key.to_string(), Value::String(value.to_string()));
    }
  };
  set("tenant", meta.tenant.as_deref());
  set("business_unit", meta.business_unit.as_deref());
  set("app_name", Some(meta.app_name.as_str()));
  set("app_version", meta.app_version.as_deref());
  set("description", meta.description.as_deref());
  set("environment", Some(req.environment));
  set("bundle_name", Some(spec.name.as_str()));
  set("role", Some(role.as_str()));
  set("host", Some(req.host.name.as_str()));
  set("category", Some(req.host.role.category().as_str()));
  vars
}

/// Variable context for one bundle.
pub fn bundle_context(
  template: &LoadedTemplate,
  spec: &BundleSpec,
  role: TemplateRole,
  req: &MaterializeRequest<'_>,
) -> VariableContext {
  let mut chain = req.scopes.clone();
  chain
    .push_owned(ScopeKind::Builtin, "builtin", builtin_vars(template, spec, role, req))
    .push(
      ScopeKind::TemplateBase,
      format!("template:{}", template.id()),
      Some(&template.definition.base_vars),
    )
    .push(ScopeKind::Bundle, format!("bundle:{}", spec.name), Some(&spec.vars));
  chain.resolve()
}

/// Render every UTF-8 file; copy anything else verbatim.
///
/// A `.j2` suffix is stripped from rendered paths.
fn render_tree(tree: FileTree, ctx: &VariableContext) -> Result<FileTree, MaterializeError> {
  let mut out = FileTree::new();
  for (path, content) in tree.into_files() {
    match String::from_utf8(content) {
      Ok(text) => {
        let rendered = render(&text, ctx).map_err(|source| MaterializeError::Render {
          path: path.clone(),
          source,
        })?;
        let target = path.strip_suffix(TEMPLATE_SUFFIX).unwrap_or(&path).to_string();
        out.insert(target, rendered);
      }
      Err(raw) => {
        out.insert(path, raw.into_bytes());
      }
    }
  }
  Ok(out)
}

/// Write a generated fragment, appending to a file the template already ships.
fn add_fragment(tree: &mut FileTree, path: &str, mut file: StanzaFile, template: &str) {
  match tree.get(path) {
    Some(existing) => {
      let mut content = existing.to_vec();
      if !content.ends_with(b"\n") {
        content.push(b'\n');
      }
      content.push(b'\n');
      content.extend(file.into_bytes());
      tree.insert(path, content);
    }
    None => {
      file.header = Some(stanza::generated_header(template));
      tree.insert(path, file.into_bytes());
    }
  }
}

fn build_bundle(
  template: &LoadedTemplate,
  spec: &BundleSpec,
  resources: Option<&Resources>,
  role: TemplateRole,
  req: &MaterializeRequest<'_>,
) -> Result<AppBundle, MaterializeError> {
  let id = template.id();
  let ctx = bundle_context(template, spec, role, req);

  let mut source = template.tree_for(&spec.tree);
  overlay_bundle(&spec.name, &mut source, req.assets)?;
  let mut files = render_tree(source, &ctx)?;

  match resources {
    Some(Resources::Indexes(indexes)) => {
      let file = stanza::indexes_conf(indexes, req.host.role.category(), &ctx).map_err(|source| {
        MaterializeError::Resource {
          file: "indexes.conf",
          source,
        }
      })?;
      add_fragment(&mut files, "default/indexes.conf", file, id);
    }
    Some(Resources::Inputs(inputs)) => {
      let file = stanza::inputs_conf(inputs, &ctx).map_err(|source| MaterializeError::Resource {
        file: "inputs.conf",
        source,
      })?;
      add_fragment(&mut files, "default/inputs.conf", file, id);
    }
    Some(Resources::Serverclasses { classes, apps }) => {
      add_fragment(
        &mut files,
        "default/serverclass.conf",
        stanza::serverclass_conf(classes, apps),
        id,
      );
    }
    Some(Resources::None) | None => {}
  }

  if !files.contains(APP_CONF) {
    add_fragment(&mut files, APP_CONF, stanza::app_conf(&template.definition.meta, &spec.name), id);
  }

  Ok(AppBundle {
    name: spec.name.clone(),
    files,
    origin: BundleOrigin::Template {
      template: id.to_string(),
      document: template.definition.document.clone(),
      role,
    },
  })
}

/// Materialize the bundles `template` produces for one host and role.
///
/// Bundles that fail are returned as failures; the rest are still produced.
pub fn materialize(template: &LoadedTemplate, role: TemplateRole, req: &MaterializeRequest<'_>) -> Materialized {
  let mut out = Materialized::default();

  for (spec, resources) in applicable(template, role, req) {
    match build_bundle(template, spec, resources, role, req) {
      Ok(bundle) => {
        debug!(
          template = template.id(),
          bundle = %bundle.name,
          host = %req.host.name,
          files = bundle.files.len(),
          "materialized bundle"
        );
        out.bundles.push(bundle);
      }
      Err(error) => {
        warn!(
          template = template.id(),
          bundle = %spec.name,
          host = %req.host.name,
          error = %error,
          "bundle failed to materialize"
        );
        out.failures.push(BundleFailure {
          template: template.id().to_string(),
          bundle: spec.name.clone(),
          role,
          error,
        });
      }
    }
  }

  out
}

/// Variable context `bundle` would be rendered with, if `template` produces
/// it for this host and role.
pub fn explain_bundle(
  template: &LoadedTemplate,
  role: TemplateRole,
  bundle: &str,
  req: &MaterializeRequest<'_>,
) -> Option<VariableContext> {
  applicable(template, role, req)
    .into_iter()
    .find(|(spec, _)| spec.name == bundle)
    .map(|(spec, _)| bundle_context(template, spec, role, req))
}
