//! Expression parsing and substitution for template files.
//!
//! Template files are plain text with `{{ ... }}` expressions. Rendering is
//! limited to variable lookups, string literals and a handful of filters.
//!
//! # Expression Forms
//!
//! - `{{ name }}` - a variable from the resolved context
//! - `{{ splunk.port }}` - a dotted lookup into nested mappings or lists
//! - `{{ "text" }}` / `{{ 'text' }}` - a string literal (use `{{ "{{" }}` for a literal brace pair)
//! - `{{ name | default("x") }}` - fall back when `name` is missing or null
//! - `{{ name | lower }}`, `{{ name | upper }}` - case conversion
//!
//! A single `{` or `}` passes through unchanged.
//!
//! # Example
//!
//! ```
//! use appfleet_lib::render::{parse, Expression, Filter, Segment, Term};
//!
//! let segments = parse("index = {{ index | default(\"main\") }}").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("index = ".to_string()),
//!     Segment::Expr(Expression {
//!         term: Term::Var("index".to_string()),
//!         filters: vec![Filter::Default("main".to_string())],
//!     }),
//! ]);
//! ```

use serde_json::Value;
use thiserror::Error;

use crate::vars::VariableContext;

/// The value an expression starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
  /// Dotted variable path.
  Var(String),
  /// Quoted string literal.
  Literal(String),
}

/// A filter applied left to right after the term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
  Default(String),
  Lower,
  Upper,
}

/// A parsed `{{ ... }}` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
  pub term: Term,
  pub filters: Vec<Filter>,
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no expressions)
  Literal(String),

  /// An expression to be evaluated
  Expr(Expression),
}

/// Errors that can occur during template parsing or rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
  #[error("unclosed expression at position {0}")]
  Unclosed(usize),

  #[error("malformed expression: {0}")]
  Malformed(String),

  #[error("unknown filter: {0}")]
  UnknownFilter(String),

  #[error("undefined variable '{0}'")]
  MissingVariable(String),
}

/// Source of variable values during rendering.
pub trait Lookup {
  fn lookup(&self, path: &str) -> Option<&Value>;
}

impl Lookup for VariableContext {
  fn lookup(&self, path: &str) -> Option<&Value> {
    self.get(path)
  }
}

/// Parse a template string into segments.
///
/// # Errors
///
/// Returns an error if an expression is unclosed or malformed.
pub fn parse(input: &str) -> Result<Vec<Segment>, RenderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch == '{' && matches!(chars.peek(), Some((_, '{'))) {
      chars.next(); // consume the second {

      if !literal.is_empty() {
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
      }

      // Find the closing "}}" while respecting quoted literals
      let mut content = String::new();
      let mut quote: Option<char> = None;
      let mut found_close = false;

      while let Some((_, c)) = chars.next() {
        match quote {
          Some(q) if c == q => quote = None,
          Some(_) => {}
          None if c == '"' || c == '\'' => quote = Some(c),
          None if c == '}' && matches!(chars.peek(), Some((_, '}'))) => {
            chars.next();
            found_close = true;
            break;
          }
          None => {}
        }
        content.push(c);
      }

      if !found_close {
        return Err(RenderError::Unclosed(pos));
      }

      segments.push(Segment::Expr(parse_expression(&content)?));
    } else {
      literal.push(ch);
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content between `{{` and `}}`.
fn parse_expression(content: &str) -> Result<Expression, RenderError> {
  let mut parts = split_pipes(content).into_iter();
  let head = parts.next().unwrap_or_default();
  let head = head.trim();

  if head.is_empty() {
    return Err(RenderError::Malformed(format!("empty expression '{{{{{content}}}}}'")));
  }

  let term = match unquote(head) {
    Some(literal) => Term::Literal(literal),
    None if is_path(head) => Term::Var(head.to_string()),
    None => return Err(RenderError::Malformed(format!("invalid variable name '{head}'"))),
  };

  let filters = parts.map(|f| parse_filter(f.trim())).collect::<Result<Vec<_>, _>>()?;

  Ok(Expression { term, filters })
}

fn parse_filter(filter: &str) -> Result<Filter, RenderError> {
  let (name, arg) = match filter.split_once('(') {
    Some((name, rest)) => {
      let arg = rest
        .trim()
        .strip_suffix(')')
        .ok_or_else(|| RenderError::Malformed(format!("unclosed filter argument in '{filter}'")))?;
      (name.trim(), Some(arg.trim()))
    }
    None => (filter, None),
  };

  match (name, arg) {
    ("default", Some(arg)) => {
      let value = unquote(arg).unwrap_or_else(|| arg.to_string());
      Ok(Filter::Default(value))
    }
    ("default", None) => Err(RenderError::Malformed("default filter requires an argument".to_string())),
    ("lower", None) => Ok(Filter::Lower),
    ("upper", None) => Ok(Filter::Upper),
    _ => Err(RenderError::UnknownFilter(name.to_string())),
  }
}

/// Split on `|` outside of quotes.
fn split_pipes(content: &str) -> Vec<String> {
  let mut parts = Vec::new();
  let mut current = String::new();
  let mut quote: Option<char> = None;

  for c in content.chars() {
    match quote {
      Some(q) if c == q => quote = None,
      Some(_) => {}
      None if c == '"' || c == '\'' => quote = Some(c),
      None if c == '|' => {
        parts.push(std::mem::take(&mut current));
        continue;
      }
      None => {}
    }
    current.push(c);
  }
  parts.push(current);
  parts
}

fn unquote(s: &str) -> Option<String> {
  let bytes = s.as_bytes();
  if bytes.len() >= 2 {
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if (first == b'"' || first == b'\'') && first == last {
      return Some(s[1..s.len() - 1].to_string());
    }
  }
  None
}

fn is_path(s: &str) -> bool {
  s.split('.').all(|part| {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
  })
}

/// Render a value as template output.
///
/// Strings render raw, lists of scalars as comma-joined text, mappings as JSON.
pub fn format_value(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Bool(b) => b.to_string(),
    Value::Number(n) => n.to_string(),
    Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => {
      items.iter().map(format_value).collect::<Vec<_>>().join(",")
    }
    other => other.to_string(),
  }
}

/// Evaluate one expression against a lookup.
pub fn evaluate(expr: &Expression, lookup: &impl Lookup) -> Result<String, RenderError> {
  let mut value: Option<String> = match &expr.term {
    Term::Literal(s) => Some(s.clone()),
    Term::Var(path) => lookup.lookup(path).filter(|v| !v.is_null()).map(format_value),
  };

  for filter in &expr.filters {
    value = match filter {
      Filter::Default(fallback) => Some(value.unwrap_or_else(|| fallback.clone())),
      Filter::Lower => value.map(|v| v.to_lowercase()),
      Filter::Upper => value.map(|v| v.to_uppercase()),
    };
  }

  match (value, &expr.term) {
    (Some(v), _) => Ok(v),
    (None, Term::Var(path)) => Err(RenderError::MissingVariable(path.clone())),
    (None, Term::Literal(_)) => Ok(String::new()),
  }
}

/// Parse and render a template string in one step.
///
/// # Errors
///
/// Returns an error if parsing fails or a referenced variable is undefined.
pub fn render(input: &str, lookup: &impl Lookup) -> Result<String, RenderError> {
  let segments = parse(input)?;
  let mut out = String::with_capacity(input.len());

  for segment in segments {
    match segment {
      Segment::Literal(s) => out.push_str(&s),
      Segment::Expr(expr) => out.push_str(&evaluate(&expr, lookup)?),
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::collections::HashMap;

  struct MapLookup(HashMap<String, Value>);

  impl Lookup for MapLookup {
    fn lookup(&self, path: &str) -> Option<&Value> {
      self.0.get(path)
    }
  }

  fn lookup(entries: &[(&str, Value)]) -> MapLookup {
    MapLookup(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
  }

  #[test]
  fn parse_plain_text() {
    assert_eq!(
      parse("[default]\nhost = x").unwrap(),
      vec![Segment::Literal("[default]\nhost = x".to_string())]
    );
  }

  #[test]
  fn parse_variable_with_whitespace() {
    let segments = parse("{{   app_name   }}").unwrap();
    assert_eq!(
      segments,
      vec![Segment::Expr(Expression {
        term: Term::Var("app_name".to_string()),
        filters: vec![],
      })]
    );
  }

  #[test]
  fn single_braces_pass_through() {
    let input = "search { index=main } | stats count";
    assert_eq!(render(input, &lookup(&[])).unwrap(), input);
  }

  #[test]
  fn unclosed_expression_errors() {
    assert_eq!(parse("value = {{ name"), Err(RenderError::Unclosed(8)));
  }

  #[test]
  fn invalid_name_errors() {
    assert!(matches!(parse("{{ not valid }}"), Err(RenderError::Malformed(_))));
    assert!(matches!(parse("{{ }}"), Err(RenderError::Malformed(_))));
  }

  #[test]
  fn unknown_filter_errors() {
    assert_eq!(
      parse("{{ x | title }}"),
      Err(RenderError::UnknownFilter("title".to_string()))
    );
  }

  #[test]
  fn render_substitutes_values() {
    let l = lookup(&[
      ("index", json!("payments")),
      ("port", json!(9997)),
      ("enabled", json!(true)),
    ]);
    assert_eq!(
      render("index={{index}} port={{ port }} on={{ enabled }}", &l).unwrap(),
      "index=payments port=9997 on=true"
    );
  }

  #[test]
  fn render_missing_variable_errors() {
    assert_eq!(
      render("{{ missing }}", &lookup(&[])),
      Err(RenderError::MissingVariable("missing".to_string()))
    );
  }

  #[test]
  fn null_counts_as_missing() {
    let l = lookup(&[("x", Value::Null)]);
    assert!(render("{{ x }}", &l).is_err());
    assert_eq!(render("{{ x | default('fallback') }}", &l).unwrap(), "fallback");
  }

  #[test]
  fn default_filter_only_applies_when_missing() {
    let l = lookup(&[("index", json!("main"))]);
    assert_eq!(render("{{ index | default(\"other\") }}", &l).unwrap(), "main");
    assert_eq!(render("{{ absent | default(\"other\") }}", &l).unwrap(), "other");
  }

  #[test]
  fn literal_escapes_braces() {
    assert_eq!(render("{{ \"{{\" }} x {{ '}}' }}", &lookup(&[])).unwrap(), "{{ x }}");
  }

  #[test]
  fn case_filters_chain() {
    let l = lookup(&[("env", json!("Production"))]);
    assert_eq!(render("{{ env | lower }}", &l).unwrap(), "production");
    assert_eq!(render("{{ env | lower | upper }}", &l).unwrap(), "PRODUCTION");
  }

  #[test]
  fn lists_render_comma_joined() {
    let l = lookup(&[("servers", json!(["idx1:9997", "idx2:9997"])), ("m", json!({"a": 1}))]);
    assert_eq!(render("{{ servers }}", &l).unwrap(), "idx1:9997,idx2:9997");
    assert_eq!(render("{{ m }}", &l).unwrap(), "{\"a\":1}");
  }

  #[test]
  fn pipe_inside_literal_is_not_a_filter() {
    let l = lookup(&[]);
    assert_eq!(render("{{ absent | default('a|b') }}", &l).unwrap(), "a|b");
  }
}
