//! Structured Document - immutable JSON wrapper with dotted-path lookup
//!
//! Run metadata differs between tracker versions, so every lookup is
//! tolerant: a missing segment yields `None` instead of an error.
//!
//! ```rust
//! use sacred_reader::document::Document;
//!
//! let doc = Document::new(serde_json::json!({
//!     "experiment": { "name": "mnist" },
//!     "artifacts": ["model.pt"]
//! }));
//!
//! assert_eq!(doc.get_str("experiment.name"), Some("mnist"));
//! assert_eq!(doc.get_str("artifacts.0"), Some("model.pt"));
//! assert!(doc.get("experiment.missing.deeper").is_none());
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde_json::Value;

use crate::{Error, Result};

/// Immutable parsed document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    value: Value,
}

impl Document {
    /// Wrap an already-parsed value (no I/O).
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self { value }
    }

    /// Read and parse the JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the file does not exist and `Parse` if the
    /// content is not valid JSON.
    pub fn slurp<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
            _ => Error::Io(e),
        })?;
        let value = serde_json::from_str(&text)
            .map_err(|e| Error::Parse(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "loaded document");
        Ok(Self { value })
    }

    /// Resolve a dotted path such as `experiment.name` or `artifacts.0`.
    ///
    /// Object segments are matched by key, array segments by decimal index.
    /// The empty path resolves to the root.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(&self.value);
        }
        path.split('.').try_fold(&self.value, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    /// Resolve a path to a string value.
    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Resolve a path to a numeric value.
    #[must_use]
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    /// Resolve a path to a boolean value.
    #[must_use]
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Top-level keys. Empty when the root is not an object.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.value
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// The wrapped value.
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.value
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
