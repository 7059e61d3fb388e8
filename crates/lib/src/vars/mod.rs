//! Variable context resolution.
//!
//! Values come from an ordered list of named scopes. Scopes are applied from
//! lowest to highest precedence; a later scope overwrites keys set by an
//! earlier one. When both sides of a key hold mappings, they are merged key by
//! key with the same rule applied recursively. Scalars and lists are replaced
//! whole.
//!
//! # Precedence
//!
//! ```text
//! builtin < template base < environment < group < target < bundle
//! ```
//!
//! Group scopes are applied in the order they are pushed, so a host's role
//! group comes before the extra groups it lists.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// A flat variable mapping as read from a document.
pub type Vars = Map<String, Value>;

/// Precedence class of a scope, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
  /// Values injected by the engine (`app_name`, `environment`, ...).
  Builtin,
  /// `template_vars` of the app template document.
  TemplateBase,
  /// Environment-level defaults from the inventory.
  Environment,
  /// Group or role defaults from the inventory.
  Group,
  /// Per-host overrides from the inventory.
  Target,
  /// `template_vars` declared on one bundle inside a role section.
  Bundle,
}

/// One named source of variable values.
#[derive(Debug, Clone)]
pub struct Scope {
  pub kind: ScopeKind,
  pub name: String,
  pub vars: Vars,
}

/// Builder collecting scopes before resolution.
#[derive(Debug, Clone, Default)]
pub struct ScopeChain {
  scopes: Vec<Scope>,
}

impl ScopeChain {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a scope. A missing mapping contributes nothing.
  pub fn push(&mut self, kind: ScopeKind, name: impl Into<String>, vars: Option<&Vars>) -> &mut Self {
    self.scopes.push(Scope {
      kind,
      name: name.into(),
      vars: vars.cloned().unwrap_or_default(),
    });
    self
  }

  /// Add a scope that is owned by the caller.
  pub fn push_owned(&mut self, kind: ScopeKind, name: impl Into<String>, vars: Vars) -> &mut Self {
    self.scopes.push(Scope {
      kind,
      name: name.into(),
      vars,
    });
    self
  }

  pub fn scopes(&self) -> &[Scope] {
    &self.scopes
  }

  /// Flatten all scopes into one context.
  ///
  /// Scopes are ordered by [`ScopeKind`] first and insertion order second, so
  /// callers cannot accidentally invert precedence by pushing out of order.
  pub fn resolve(&self) -> VariableContext {
    let mut ordered: Vec<&Scope> = self.scopes.iter().collect();
    ordered.sort_by_key(|s| s.kind);

    let mut values = Vars::new();
    let mut origins = BTreeMap::new();

    for scope in ordered {
      merge_into(&mut values, &scope.vars);
      for key in scope.vars.keys() {
        origins.insert(
          key.clone(),
          ScopeOrigin {
            kind: scope.kind,
            name: scope.name.clone(),
          },
        );
      }
    }

    VariableContext { values, origins }
  }
}

/// Merge `src` into `dst` with last-writer-wins semantics.
///
/// Mapping values merge recursively; anything else replaces the existing value.
pub fn merge_into(dst: &mut Vars, src: &Vars) {
  for (key, value) in src {
    match (dst.get_mut(key), value) {
      (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
      _ => {
        dst.insert(key.clone(), value.clone());
      }
    }
  }
}

/// Scope that last wrote a top-level key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeOrigin {
  pub kind: ScopeKind,
  pub name: String,
}

/// Resolved, immutable variable lookup table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableContext {
  values: Vars,
  origins: BTreeMap<String, ScopeOrigin>,
}

impl VariableContext {
  /// Look up a value by dotted path (`splunk.indexes.main`).
  pub fn get(&self, path: &str) -> Option<&Value> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = self.values.get(first)?;
    for part in parts {
      current = match current {
        Value::Object(map) => map.get(part)?,
        Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
        _ => return None,
      };
    }
    Some(current)
  }

  pub fn get_str(&self, path: &str) -> Option<&str> {
    self.get(path).and_then(Value::as_str)
  }

  /// Scope that supplied a top-level key.
  pub fn origin(&self, key: &str) -> Option<&ScopeOrigin> {
    self.origins.get(key)
  }

  pub fn values(&self) -> &Vars {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}
