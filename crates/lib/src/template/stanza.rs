//! Generated `.conf` fragments.
//!
//! Resource data declared in a template (indexes, inputs, serverclasses) is
//! turned into Splunk stanza files. Output is fully deterministic: stanzas
//! follow the sorted order of their names and keys follow a fixed order per
//! file type.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::render::{Lookup, RenderError, format_value, render};
use crate::target::PathCategory;
use crate::vars::Vars;

use super::definition::{ServerclassSpec, TemplateMeta};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
  #[error("[{stanza}] {key}: expected a scalar value")]
  NotScalar { stanza: String, key: String },

  #[error("[{stanza}] {key}: invalid value '{value}'")]
  InvalidValue { stanza: String, key: String, value: String },

  #[error("[{stanza}] {key}: {source}")]
  Render {
    stanza: String,
    key: String,
    #[source]
    source: RenderError,
  },
}

/// One `[name]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stanza {
  pub name: String,
  pub entries: Vec<(String, String)>,
}

impl Stanza {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      entries: Vec::new(),
    }
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
    let key = key.into();
    let value = value.into();
    match self.entries.iter_mut().find(|(k, _)| *k == key) {
      Some(entry) => entry.1 = value,
      None => self.entries.push((key, value)),
    }
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
  }
}

/// An ordered stanza file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StanzaFile {
  pub header: Option<String>,
  pub stanzas: Vec<Stanza>,
}

impl StanzaFile {
  pub fn stanza(&self, name: &str) -> Option<&Stanza> {
    self.stanzas.iter().find(|s| s.name == name)
  }

  pub fn into_bytes(self) -> Vec<u8> {
    self.to_string().into_bytes()
  }
}

impl fmt::Display for StanzaFile {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(header) = &self.header {
      for line in header.lines() {
        writeln!(f, "# {line}")?;
      }
      writeln!(f)?;
    }
    for (i, stanza) in self.stanzas.iter().enumerate() {
      if i > 0 {
        writeln!(f)?;
      }
      writeln!(f, "[{}]", stanza.name)?;
      for (key, value) in &stanza.entries {
        writeln!(f, "{key} = {value}")?;
      }
    }
    Ok(())
  }
}

/// Header written at the top of every generated fragment.
pub fn generated_header(template: &str) -> String {
  format!("Generated by {} from template {template}. Local edits are overwritten.", crate::consts::APP_NAME)
}

/// Convert a resource value to stanza text, rendering string expressions.
fn scalar(stanza: &str, key: &str, value: &Value, lookup: &impl Lookup) -> Result<String, ResourceError> {
  match value {
    Value::String(s) => render(s, lookup).map_err(|source| ResourceError::Render {
      stanza: stanza.to_string(),
      key: key.to_string(),
      source,
    }),
    Value::Bool(_) | Value::Number(_) => Ok(format_value(value)),
    Value::Null | Value::Array(_) | Value::Object(_) => Err(ResourceError::NotScalar {
      stanza: stanza.to_string(),
      key: key.to_string(),
    }),
  }
}

/// Parse a retention period (`90d`, `12h`, `1y`, `3600`) into seconds.
///
/// Units: `s`, `m`, `h`, `d`, `w`, `y` (365 days). Case-insensitive; a bare
/// number is seconds.
pub fn parse_retention(value: &str) -> Option<u64> {
  let value = value.trim();
  let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
  let (digits, unit) = value.split_at(split);
  let amount: u64 = digits.parse().ok()?;
  let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
    "" | "s" => 1,
    "m" => 60,
    "h" => 3_600,
    "d" => 86_400,
    "w" => 604_800,
    "y" => 31_536_000,
    _ => return None,
  };
  amount.checked_mul(multiplier)
}

fn index_key(key: &str) -> &str {
  match key {
    "max_data_size_mb" => "maxDataSize",
    "max_hot_buckets" => "maxHotBuckets",
    "max_warm_buckets" => "maxWarmDBCount",
    "max_total_data_size_mb" => "maxTotalDataSizeMB",
    "retention_period" => "frozenTimePeriodInSecs",
    "home_path" => "homePath",
    "cold_path" => "coldPath",
    "thawed_path" => "thawedPath",
    other => other,
  }
}

/// Build `indexes.conf` from index definitions.
///
/// Every index gets `homePath`, `coldPath` and `thawedPath` under
/// `$SPLUNK_DB/<index>/` unless overridden. Indexes deployed through a cluster
/// manager are replicated (`repFactor = auto`).
pub fn indexes_conf(
  indexes: &BTreeMap<String, Vars>,
  category: PathCategory,
  lookup: &impl Lookup,
) -> Result<StanzaFile, ResourceError> {
  let mut stanzas = Vec::with_capacity(indexes.len());

  for (name, settings) in indexes {
    let mut stanza = Stanza::new(name.clone());
    stanza.set("homePath", format!("$SPLUNK_DB/{name}/db"));
    stanza.set("coldPath", format!("$SPLUNK_DB/{name}/colddb"));
    stanza.set("thawedPath", format!("$SPLUNK_DB/{name}/thaweddb"));

    for (key, value) in settings {
      let text = scalar(name, key, value, lookup)?;
      let mapped = index_key(key);
      let text = match mapped {
        "frozenTimePeriodInSecs" => parse_retention(&text)
          .ok_or_else(|| ResourceError::InvalidValue {
            stanza: name.clone(),
            key: key.clone(),
            value: text.clone(),
          })?
          .to_string(),
        "maxDataSize" if !matches!(text.as_str(), "auto" | "auto_high_volume") => {
          check_integer(name, key, text)?
        }
        "maxHotBuckets" | "maxWarmDBCount" | "maxTotalDataSizeMB" => check_integer(name, key, text)?,
        _ => text,
      };
      stanza.set(mapped, text);
    }

    if category == PathCategory::ManagerApps {
      stanza.set("repFactor", "auto");
    }
    stanzas.push(stanza);
  }

  Ok(StanzaFile {
    header: None,
    stanzas,
  })
}

fn check_integer(stanza: &str, key: &str, text: String) -> Result<String, ResourceError> {
  match text.trim().parse::<u64>() {
    Ok(n) => Ok(n.to_string()),
    Err(_) => Err(ResourceError::InvalidValue {
      stanza: stanza.to_string(),
      key: key.to_string(),
      value: text,
    }),
  }
}

const INPUT_KEY_ORDER: [&str; 5] = ["sourcetype", "index", "disabled", "whitelist", "blacklist"];

fn input_key_rank(key: &str) -> usize {
  INPUT_KEY_ORDER
    .iter()
    .position(|k| *k == key)
    .unwrap_or(INPUT_KEY_ORDER.len())
}

/// Build `inputs.conf` from stanza definitions.
///
/// Keys are written verbatim; common keys come first in a fixed order and the
/// rest follow alphabetically.
pub fn inputs_conf(inputs: &BTreeMap<String, Vars>, lookup: &impl Lookup) -> Result<StanzaFile, ResourceError> {
  let mut stanzas = Vec::with_capacity(inputs.len());

  for (name, settings) in inputs {
    let mut stanza = Stanza::new(name.clone());
    let mut entries: Vec<(&String, &Value)> = settings.iter().collect();
    entries.sort_by(|(a, _), (b, _)| input_key_rank(a).cmp(&input_key_rank(b)).then_with(|| a.cmp(b)));
    for (key, value) in entries {
      let text = scalar(name, key, value, lookup)?;
      stanza.set(key.clone(), text);
    }
    stanzas.push(stanza);
  }

  Ok(StanzaFile {
    header: None,
    stanzas,
  })
}

/// Build `serverclass.conf`, mapping each class to every forwarder bundle of
/// the template.
pub fn serverclass_conf(classes: &[ServerclassSpec], apps: &[String]) -> StanzaFile {
  let mut stanzas = Vec::new();

  for class in classes {
    let mut stanza = Stanza::new(format!("serverClass:{}", class.name));
    for (i, entry) in class.whitelist.iter().enumerate() {
      stanza.set(format!("whitelist.{i}"), entry.clone());
    }
    for (i, entry) in class.blacklist.iter().enumerate() {
      stanza.set(format!("blacklist.{i}"), entry.clone());
    }
    if let Some(filter) = &class.machine_types_filter {
      stanza.set("machineTypesFilter", filter.clone());
    }
    stanzas.push(stanza);

    for app in apps {
      let mut mapping = Stanza::new(format!("serverClass:{}:app:{app}", class.name));
      mapping.set("restartSplunkd", "true");
      mapping.set("stateOnClient", "enabled");
      stanzas.push(mapping);
    }
  }

  StanzaFile {
    header: None,
    stanzas,
  }
}

/// Build a minimal `app.conf` for a generated bundle.
pub fn app_conf(meta: &TemplateMeta, bundle: &str) -> StanzaFile {
  let mut install = Stanza::new("install");
  install.set("state", "enabled");

  let mut launcher = Stanza::new("launcher");
  if let Some(author) = meta.team.as_ref().or(meta.owner_email.as_ref()).or(meta.tenant.as_ref()) {
    launcher.set("author", author.clone());
  }
  if let Some(description) = &meta.description {
    launcher.set("description", description.clone());
  }
  launcher.set("version", meta.app_version.clone().unwrap_or_else(|| "1.0.0".to_string()));

  let mut ui = Stanza::new("ui");
  ui.set("is_visible", "false");
  ui.set("label", bundle);

  let mut package = Stanza::new("package");
  package.set("id", bundle);

  StanzaFile {
    header: None,
    stanzas: vec![install, launcher, ui, package],
  }
}
