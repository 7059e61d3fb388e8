//! App template documents.
//!
//! A template document comes in one of two shapes, detected once when the
//! document is parsed:
//!
//! - **Enhanced**: role sections (`indexers`, `search_heads`,
//!   `universal_forwarders`, `heavy_forwarders`, `serverclasses`), each able to
//!   produce several bundles.
//! - **Legacy**: a single bundle with flat `splunk_roles`, `environments` and
//!   `target_hosts` lists.
//!
//! Role sections are normalized into a list of [`BundleSpec`] so the
//! materialization engine has one code path regardless of which shorthand the
//! document used.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::render::format_value;
use crate::role::TemplateRole;
use crate::vars::Vars;

use super::TemplateError;

/// Informational and naming metadata shared by both shapes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateMeta {
  pub tenant: Option<String>,
  pub business_unit: Option<String>,
  pub app_name: String,
  pub description: Option<String>,
  pub team: Option<String>,
  pub owner_email: Option<String>,
  pub app_version: Option<String>,
}

impl TemplateMeta {
  /// Deterministic bundle name: `<tenant>_<app_name>[_<suffix>]`.
  pub fn bundle_name(&self, suffix: Option<&str>) -> String {
    let mut name = match &self.tenant {
      Some(tenant) => format!("{}_{}", tenant, self.app_name),
      None => self.app_name.clone(),
    };
    if let Some(suffix) = suffix {
      name.push('_');
      name.push_str(suffix);
    }
    name
  }
}

/// Which file tree a bundle is rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeSource {
  /// The template directory's own file tree.
  Default,
  /// `templates/<name>/` inside the template directory.
  Sub(String),
  /// No files; the bundle only carries generated fragments.
  Empty,
}

/// One bundle a role section produces.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleSpec {
  pub name: String,
  pub tree: TreeSource,
  /// Per-bundle variable overrides.
  pub vars: Vars,
  /// Whether the section's resource data is synthesized into this bundle.
  pub resources: bool,
}

/// A serverclass routing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerclassSpec {
  pub name: String,
  pub whitelist: Vec<String>,
  pub blacklist: Vec<String>,
  pub machine_types_filter: Option<String>,
}

/// Declarative resource data carried by a role section.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Resources {
  #[default]
  None,
  /// `indexers.indexes`: index name → settings.
  Indexes(BTreeMap<String, Vars>),
  /// Forwarder `inputs_configs`: stanza → settings.
  Inputs(BTreeMap<String, Vars>),
  /// Top-level `serverclasses`, routed to the template's forwarder bundles.
  Serverclasses {
    classes: Vec<ServerclassSpec>,
    apps: Vec<String>,
  },
}

impl Resources {
  pub fn is_none(&self) -> bool {
    matches!(self, Resources::None)
  }
}

/// A normalized role section.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSection {
  pub role: TemplateRole,
  pub bundles: Vec<BundleSpec>,
  pub resources: Resources,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedTemplate {
  /// Environments this template applies to; empty means all.
  pub environments: Vec<String>,
  pub sections: Vec<RoleSection>,
}

impl EnhancedTemplate {
  pub fn section(&self, role: TemplateRole) -> Option<&RoleSection> {
    self.sections.iter().find(|s| s.role == role)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTemplate {
  pub roles: Vec<TemplateRole>,
  /// Environments this template applies to; empty means all.
  pub environments: Vec<String>,
  /// Hosts this template is restricted to; empty means all.
  pub target_hosts: Vec<String>,
  pub bundle: BundleSpec,
}

/// The two supported document shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateShape {
  Enhanced(EnhancedTemplate),
  Legacy(LegacyTemplate),
}

/// A parsed app template document.
#[derive(Debug, Clone, PartialEq)]
pub struct AppTemplateDefinition {
  /// Template directory name.
  pub id: String,
  /// Path of the metadata document.
  pub document: PathBuf,
  pub meta: TemplateMeta,
  /// `template_vars`: lowest-precedence template scope.
  pub base_vars: Vars,
  pub shape: TemplateShape,
}

impl AppTemplateDefinition {
  /// Parse a template document, detecting its shape.
  pub fn from_yaml(id: &str, document: &Path, content: &str) -> Result<Self, TemplateError> {
    let raw: RawDocument = serde_yaml::from_str(content).map_err(|source| TemplateError::Parse {
      path: document.to_path_buf(),
      source,
    })?;
    raw.into_definition(id, document)
  }

  pub fn is_legacy(&self) -> bool {
    matches!(self.shape, TemplateShape::Legacy(_))
  }

  /// Every bundle spec the document declares, across all sections.
  pub fn bundle_specs(&self) -> Vec<&BundleSpec> {
    match &self.shape {
      TemplateShape::Enhanced(e) => e.sections.iter().flat_map(|s| s.bundles.iter()).collect(),
      TemplateShape::Legacy(l) => vec![&l.bundle],
    }
  }

  /// Sub-template names referenced by bundle specs.
  pub fn sub_templates(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self
      .bundle_specs()
      .into_iter()
      .filter_map(|spec| match &spec.tree {
        TreeSource::Sub(name) => Some(name.as_str()),
        _ => None,
      })
      .collect();
    names.sort();
    names.dedup();
    names
  }
}

// Raw document as written. Both shapes share one struct; `into_definition`
// decides which one the document is.

#[derive(Debug, Deserialize)]
struct RawDocument {
  tenant: Option<String>,
  business_unit: Option<String>,
  app_name: Option<String>,
  description: Option<String>,
  team: Option<String>,
  owner_email: Option<String>,
  app_version: Option<Value>,
  #[serde(default)]
  template_vars: Vars,
  environment: Option<OneOrMany>,

  indexers: Option<RawIndexers>,
  search_heads: Option<RawSearchHeads>,
  universal_forwarders: Option<RawForwarders>,
  heavy_forwarders: Option<RawForwarders>,
  serverclasses: Option<Vec<RawServerclass>>,

  splunk_roles: Option<Vec<String>>,
  environments: Option<Vec<String>>,
  target_hosts: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

#[derive(Debug, Default, Deserialize)]
struct RawIndexers {
  #[serde(default)]
  indexes: BTreeMap<String, Vars>,
  #[serde(default, alias = "app")]
  apps: Vec<RawBundle>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSearchHeads {
  #[serde(default, alias = "apps")]
  app: Vec<RawBundle>,
}

#[derive(Debug, Deserialize)]
struct RawForwarders {
  #[serde(default)]
  inputs_configs: BTreeMap<String, Vars>,
  #[serde(default, alias = "app")]
  apps: Vec<RawBundle>,
  #[serde(default = "default_true")]
  processing_enabled: bool,
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Deserialize)]
struct RawBundle {
  name: String,
  template: Option<String>,
  #[serde(default)]
  template_vars: Vars,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawServerclass {
  Name(String),
  Detailed {
    name: String,
    #[serde(default)]
    whitelist: Vec<String>,
    #[serde(default)]
    blacklist: Vec<String>,
    machine_types_filter: Option<String>,
  },
}

impl RawServerclass {
  fn into_spec(self) -> ServerclassSpec {
    match self {
      RawServerclass::Name(name) => ServerclassSpec {
        name,
        whitelist: Vec::new(),
        blacklist: Vec::new(),
        machine_types_filter: None,
      },
      RawServerclass::Detailed {
        name,
        whitelist,
        blacklist,
        machine_types_filter,
      } => ServerclassSpec {
        name,
        whitelist,
        blacklist,
        machine_types_filter,
      },
    }
  }
}

impl RawDocument {
  fn has_role_sections(&self) -> bool {
    self.indexers.is_some()
      || self.search_heads.is_some()
      || self.universal_forwarders.is_some()
      || self.heavy_forwarders.is_some()
      || self.serverclasses.is_some()
  }

  fn into_definition(self, id: &str, document: &Path) -> Result<AppTemplateDefinition, TemplateError> {
    let path = document.to_path_buf();

    let app_name = match self.app_name.as_deref().map(str::trim) {
      Some(name) if !name.is_empty() => name.to_string(),
      _ => {
        return Err(TemplateError::MissingField {
          path,
          field: "app_name",
        });
      }
    };

    let enhanced = self.has_role_sections();
    let legacy = self.splunk_roles.is_some();

    let meta = TemplateMeta {
      tenant: self.tenant.clone().filter(|t| !t.trim().is_empty()),
      business_unit: self.business_unit.clone(),
      app_name,
      description: self.description.clone(),
      team: self.team.clone(),
      owner_email: self.owner_email.clone(),
      app_version: self.app_version.as_ref().map(format_value),
    };

    let shape = match (enhanced, legacy) {
      (true, true) => return Err(TemplateError::AmbiguousShape { path }),
      (false, false) => return Err(TemplateError::NoRoleSections { path }),
      (true, false) => {
        if meta.tenant.is_none() {
          return Err(TemplateError::MissingField { path, field: "tenant" });
        }
        TemplateShape::Enhanced(self.into_enhanced(&meta, &path)?)
      }
      (false, true) => TemplateShape::Legacy(self.into_legacy(&meta, &path)?),
    };

    Ok(AppTemplateDefinition {
      id: id.to_string(),
      document: document.to_path_buf(),
      meta,
      base_vars: self.template_vars,
      shape,
    })
  }

  fn into_enhanced(&self, meta: &TemplateMeta, path: &Path) -> Result<EnhancedTemplate, TemplateError> {
    let mut environments = self.environment.as_ref().map(clone_one_or_many).unwrap_or_default();
    environments.extend(self.environments.clone().unwrap_or_default());

    let mut sections = Vec::new();

    if let Some(indexers) = &self.indexers {
      let resources = if indexers.indexes.is_empty() {
        Resources::None
      } else {
        Resources::Indexes(indexers.indexes.clone())
      };
      sections.push(normalize_section(meta, TemplateRole::Indexer, &indexers.apps, resources));
    }

    if let Some(search_heads) = &self.search_heads {
      sections.push(normalize_section(
        meta,
        TemplateRole::SearchHead,
        &search_heads.app,
        Resources::None,
      ));
    }

    for (role, section) in [
      (TemplateRole::UniversalForwarder, &self.universal_forwarders),
      (TemplateRole::HeavyForwarder, &self.heavy_forwarders),
    ] {
      let Some(forwarders) = section else { continue };
      if !forwarders.processing_enabled {
        continue;
      }
      let resources = if forwarders.inputs_configs.is_empty() {
        Resources::None
      } else {
        Resources::Inputs(forwarders.inputs_configs.clone())
      };
      sections.push(normalize_section(meta, role, &forwarders.apps, resources));
    }

    if let Some(serverclasses) = &self.serverclasses
      && !serverclasses.is_empty()
    {
      let apps: Vec<String> = sections
        .iter()
        .filter(|s| matches!(s.role, TemplateRole::UniversalForwarder | TemplateRole::HeavyForwarder))
        .flat_map(|s| s.bundles.iter().map(|b| b.name.clone()))
        .collect();
      let classes = serverclasses.iter().cloned().map(RawServerclass::into_spec).collect();

      sections.push(RoleSection {
        role: TemplateRole::DeploymentServer,
        bundles: vec![BundleSpec {
          name: meta.bundle_name(Some(TemplateRole::DeploymentServer.implicit_suffix())),
          tree: TreeSource::Empty,
          vars: Vars::new(),
          resources: true,
        }],
        resources: Resources::Serverclasses { classes, apps },
      });
    }

    for section in &sections {
      validate_bundles(path, &section.bundles)?;
    }

    Ok(EnhancedTemplate { environments, sections })
  }

  fn into_legacy(&self, meta: &TemplateMeta, path: &Path) -> Result<LegacyTemplate, TemplateError> {
    let mut roles = Vec::new();
    for name in self.splunk_roles.iter().flatten() {
      let role = TemplateRole::from_legacy(name).ok_or_else(|| TemplateError::UnknownRole {
        path: path.to_path_buf(),
        role: name.clone(),
      })?;
      if !roles.contains(&role) {
        roles.push(role);
      }
    }

    let bundle = BundleSpec {
      name: meta.bundle_name(None),
      tree: TreeSource::Default,
      vars: Vars::new(),
      resources: false,
    };
    validate_bundles(path, std::slice::from_ref(&bundle))?;

    Ok(LegacyTemplate {
      roles,
      environments: self.environments.clone().unwrap_or_default(),
      target_hosts: self.target_hosts.clone().unwrap_or_default(),
      bundle,
    })
  }
}

fn clone_one_or_many(value: &OneOrMany) -> Vec<String> {
  match value {
    OneOrMany::One(s) => vec![s.clone()],
    OneOrMany::Many(v) => v.clone(),
  }
}

/// Turn a role section's explicit list (or its absence) into bundle specs.
///
/// Without an explicit list the section yields one implicit bundle rendered
/// from the default tree and carrying the section's resource data. With an
/// explicit list each entry becomes a bundle, and resource data, when present,
/// goes into an extra implicit bundle holding only the generated fragments.
fn normalize_section(
  meta: &TemplateMeta,
  role: TemplateRole,
  explicit: &[RawBundle],
  resources: Resources,
) -> RoleSection {
  let implicit_name = meta.bundle_name(Some(role.implicit_suffix()));

  let bundles = if explicit.is_empty() {
    vec![BundleSpec {
      name: implicit_name,
      tree: TreeSource::Default,
      vars: Vars::new(),
      resources: !resources.is_none(),
    }]
  } else {
    let mut bundles: Vec<BundleSpec> = explicit
      .iter()
      .map(|raw| BundleSpec {
        name: meta.bundle_name(Some(raw.name.trim())),
        tree: raw
          .template
          .as_ref()
          .map(|t| TreeSource::Sub(t.clone()))
          .unwrap_or(TreeSource::Default),
        vars: raw.template_vars.clone(),
        resources: false,
      })
      .collect();
    if !resources.is_none() {
      bundles.push(BundleSpec {
        name: implicit_name,
        tree: TreeSource::Empty,
        vars: Vars::new(),
        resources: true,
      });
    }
    bundles
  };

  RoleSection {
    role,
    bundles,
    resources,
  }
}

fn validate_bundles(path: &Path, bundles: &[BundleSpec]) -> Result<(), TemplateError> {
  let mut seen = HashSet::new();
  for bundle in bundles {
    if !is_valid_bundle_name(&bundle.name) {
      return Err(TemplateError::InvalidBundleName {
        path: path.to_path_buf(),
        name: bundle.name.clone(),
      });
    }
    if !seen.insert(bundle.name.as_str()) {
      return Err(TemplateError::DuplicateBundleSpec {
        path: path.to_path_buf(),
        name: bundle.name.clone(),
      });
    }
  }
  Ok(())
}

/// Bundle names become directory names on targets.
pub fn is_valid_bundle_name(name: &str) -> bool {
  !name.is_empty()
    && !name.starts_with('.')
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(yaml: &str) -> Result<AppTemplateDefinition, TemplateError> {
    AppTemplateDefinition::from_yaml("t", Path::new("t/app.yml"), yaml)
  }

  const ENHANCED: &str = r#"
tenant: acme
business_unit: payments
app_name: payment_gateway
description: Payment gateway logs
team: payments-sre
app_version: 1.2
template_vars:
  log_dir: /var/log/payments
indexers:
  indexes:
    payment_logs:
      max_data_size_mb: 2000
      retention_period: 90D
search_heads:
  app:
    - name: dashboards
      template: dashboards
      template_vars:
        theme: dark
    - name: alerts
universal_forwarders:
  inputs_configs:
    "monitor:///var/log/payments":
      sourcetype: payments:app
      index: payment_logs
      disabled: false
serverclasses:
  - payment_hosts
  - name: payment_db
    whitelist: ["db*.acme.com"]
"#;

  #[test]
  fn detects_enhanced_shape() {
    let def = parse(ENHANCED).unwrap();
    assert!(!def.is_legacy());
    assert_eq!(def.meta.app_version.as_deref(), Some("1.2"));
    assert_eq!(def.base_vars.get("log_dir").and_then(Value::as_str), Some("/var/log/payments"));

    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };
    let roles: Vec<_> = enhanced.sections.iter().map(|s| s.role).collect();
    assert_eq!(
      roles,
      vec![
        TemplateRole::Indexer,
        TemplateRole::SearchHead,
        TemplateRole::UniversalForwarder,
        TemplateRole::DeploymentServer,
      ]
    );
  }

  #[test]
  fn implicit_bundle_carries_resources() {
    let def = parse(ENHANCED).unwrap();
    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };

    let idx = enhanced.section(TemplateRole::Indexer).unwrap();
    assert_eq!(idx.bundles.len(), 1);
    assert_eq!(idx.bundles[0].name, "acme_payment_gateway_indexes");
    assert_eq!(idx.bundles[0].tree, TreeSource::Default);
    assert!(idx.bundles[0].resources);
    assert!(matches!(idx.resources, Resources::Indexes(ref m) if m.contains_key("payment_logs")));
  }

  #[test]
  fn explicit_bundles_use_entry_names() {
    let def = parse(ENHANCED).unwrap();
    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };

    let sh = enhanced.section(TemplateRole::SearchHead).unwrap();
    let names: Vec<_> = sh.bundles.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["acme_payment_gateway_dashboards", "acme_payment_gateway_alerts"]);
    assert_eq!(sh.bundles[0].tree, TreeSource::Sub("dashboards".to_string()));
    assert_eq!(sh.bundles[1].tree, TreeSource::Default);
    assert_eq!(sh.bundles[0].vars.get("theme").and_then(Value::as_str), Some("dark"));
    assert_eq!(def.sub_templates(), vec!["dashboards"]);
  }

  #[test]
  fn serverclasses_route_forwarder_bundles() {
    let def = parse(ENHANCED).unwrap();
    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };

    let ds = enhanced.section(TemplateRole::DeploymentServer).unwrap();
    assert_eq!(ds.bundles[0].name, "acme_payment_gateway_serverclass");
    assert_eq!(ds.bundles[0].tree, TreeSource::Empty);
    let Resources::Serverclasses { classes, apps } = &ds.resources else {
      panic!("expected serverclasses");
    };
    assert_eq!(classes.len(), 2);
    assert_eq!(classes[0].name, "payment_hosts");
    assert_eq!(classes[1].whitelist, vec!["db*.acme.com".to_string()]);
    assert_eq!(apps, &vec!["acme_payment_gateway_inputs".to_string()]);
  }

  #[test]
  fn explicit_list_with_resources_adds_fragment_bundle() {
    let yaml = r#"
tenant: acme
app_name: web
universal_forwarders:
  apps:
    - name: nginx
  inputs_configs:
    "monitor:///var/log/nginx":
      index: web
"#;
    let def = parse(yaml).unwrap();
    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };
    let uf = enhanced.section(TemplateRole::UniversalForwarder).unwrap();
    assert_eq!(uf.bundles.len(), 2);
    assert_eq!(uf.bundles[0].name, "acme_web_nginx");
    assert!(!uf.bundles[0].resources);
    assert_eq!(uf.bundles[1].name, "acme_web_inputs");
    assert_eq!(uf.bundles[1].tree, TreeSource::Empty);
    assert!(uf.bundles[1].resources);
  }

  #[test]
  fn disabled_heavy_forwarder_section_is_dropped() {
    let yaml = r#"
tenant: acme
app_name: web
heavy_forwarders:
  processing_enabled: false
"#;
    let def = parse(yaml).unwrap();
    let TemplateShape::Enhanced(enhanced) = &def.shape else {
      panic!("expected enhanced");
    };
    assert!(enhanced.section(TemplateRole::HeavyForwarder).is_none());
  }

  #[test]
  fn detects_legacy_shape() {
    let yaml = r#"
tenant: acme
app_name: web_search
splunk_roles: [search]
environments: [production]
target_hosts: []
template_vars:
  owner: web
"#;
    let def = parse(yaml).unwrap();
    let TemplateShape::Legacy(legacy) = &def.shape else {
      panic!("expected legacy");
    };
    assert_eq!(legacy.roles, vec![TemplateRole::SearchHead]);
    assert_eq!(legacy.environments, vec!["production".to_string()]);
    assert_eq!(legacy.bundle.name, "acme_web_search");
  }

  #[test]
  fn legacy_without_tenant_uses_app_name() {
    let def = parse("app_name: plain\nsplunk_roles: [indexer]\n").unwrap();
    let TemplateShape::Legacy(legacy) = &def.shape else {
      panic!("expected legacy");
    };
    assert_eq!(legacy.bundle.name, "plain");
  }

  #[test]
  fn both_shapes_is_ambiguous() {
    let yaml = "tenant: a\napp_name: b\nsplunk_roles: [search]\nsearch_heads: {}\n";
    assert!(matches!(parse(yaml), Err(TemplateError::AmbiguousShape { .. })));
  }

  #[test]
  fn no_shape_is_rejected() {
    assert!(matches!(
      parse("tenant: a\napp_name: b\n"),
      Err(TemplateError::NoRoleSections { .. })
    ));
  }

  #[test]
  fn enhanced_requires_tenant() {
    assert!(matches!(
      parse("app_name: b\nsearch_heads: {}\n"),
      Err(TemplateError::MissingField { field: "tenant", .. })
    ));
  }

  #[test]
  fn missing_app_name_is_rejected() {
    assert!(matches!(
      parse("tenant: a\nsearch_heads: {}\n"),
      Err(TemplateError::MissingField { field: "app_name", .. })
    ));
  }

  #[test]
  fn unknown_legacy_role_is_rejected() {
    assert!(matches!(
      parse("app_name: b\nsplunk_roles: [toaster]\n"),
      Err(TemplateError::UnknownRole { .. })
    ));
  }

  #[test]
  fn duplicate_explicit_names_rejected() {
    let yaml = r#"
tenant: acme
app_name: web
search_heads:
  app:
    - name: ui
    - name: ui
"#;
    assert!(matches!(parse(yaml), Err(TemplateError::DuplicateBundleSpec { .. })));
  }

  #[test]
  fn invalid_bundle_name_rejected() {
    let yaml = "tenant: acme\napp_name: web\nsearch_heads:\n  app:\n    - name: has space\n";
    assert!(matches!(parse(yaml), Err(TemplateError::InvalidBundleName { .. })));
  }

  #[test]
  fn malformed_yaml_is_parse_error() {
    assert!(matches!(parse("tenant: [unclosed"), Err(TemplateError::Parse { .. })));
    assert!(matches!(
      parse("tenant: a\napp_name: b\nindexers:\n  indexes: [1, 2]\n"),
      Err(TemplateError::Parse { .. })
    ));
  }

  #[test]
  fn environment_accepts_string_or_list() {
    let def = parse("tenant: a\napp_name: b\nenvironment: staging\nsearch_heads: {}\n").unwrap();
    let TemplateShape::Enhanced(e) = &def.shape else {
      panic!("expected enhanced");
    };
    assert_eq!(e.environments, vec!["staging".to_string()]);

    let def = parse("tenant: a\napp_name: b\nenvironment: [dev, qa]\nsearch_heads: {}\n").unwrap();
    let TemplateShape::Enhanced(e) = &def.shape else {
      panic!("expected enhanced");
    };
    assert_eq!(e.environments.len(), 2);
  }
}
