//! Command reconstruction from run metadata
//!
//! Rebuilds an approximate command line from the `experiment` and `meta`
//! sections for display. The result is not guaranteed to be executable.

use serde_json::{Map, Value};

use crate::document::Document;
use crate::{Error, Result};

/// Build a display command line such as
/// `/src/exp/train.py main --name test with lr=0.1 seed=3`.
///
/// `experiment` and `meta` are merged with `meta` winning on collisions.
/// Falsy values are dropped at the top level and inside `options`; the
/// `options.UPDATE` overrides are appended after `with` when `options.with`
/// is true.
///
/// # Errors
///
/// `MissingField` if `base_dir`, `mainfile` or `command` is absent after merging.
pub fn build_command(metadata: &Document) -> Result<String> {
    let mut merged = Map::new();
    for section in ["experiment", "meta"] {
        if let Some(Value::Object(map)) = metadata.get(section) {
            merged.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    merged.retain(|_, v| is_truthy(v));

    let mut options = match merged.remove("options") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    options.retain(|_, v| is_truthy(v));
    let updates = options.remove("UPDATE");
    let with = options.remove("with").is_some_and(|v| v.as_bool().unwrap_or(false));

    let field = |name: &str| -> Result<String> {
        merged
            .get(name)
            .map(render)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    };
    let base_dir = field("base_dir")?;
    let mainfile = field("mainfile")?;
    let command = field("command")?;

    let mut parts = vec![format!("{base_dir}/{mainfile}"), command];
    parts.extend(options.iter().map(|(k, v)| format!("{k} {}", render(v))));
    if with {
        let overrides: Vec<String> = match updates {
            Some(Value::Array(items)) => items.iter().map(render).collect(),
            Some(other) => vec![render(&other)],
            None => Vec::new(),
        };
        parts.push("with".to_string());
        parts.extend(overrides);
    }
    Ok(parts.join(" "))
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
