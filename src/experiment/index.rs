//! Run Directory Index - discovers runs and caches their metadata
//!
//! ## Layout
//!
//! ```text
//! <base>/_sources/          marker, existence-checked only
//! <base>/<digits>/run.json  metadata, loaded on first `get`
//! <base>/<digits>/...       config.json, metrics.json, artifacts
//! ```
//!
//! ## Caching
//!
//! Metadata documents are cached as `Arc<Document>`. `update()` rescans the
//! directory listing but never reloads a cached document, so repeated scans
//! hand out the same `Arc` for runs that are still present.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::run_record::{RunRecord, CONFIG_FILE, METRICS_FILE};
use crate::document::Document;
use crate::storage::{RunRow, RunTable};
use crate::{Error, Result};

/// Default marker directory that identifies a results directory.
pub const SOURCES_DIR: &str = "_sources";

/// Default metadata file name inside each run directory.
pub const RUN_FILE: &str = "run.json";

/// Key used to look up a run.
///
/// Run keys are the decimal directory names. Numeric keys are accepted for
/// convenience and converted to their string form with a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKey {
    /// Directory name, e.g. `"12"`.
    Text(String),
    /// Numeric key, coerced to text on lookup.
    Number(i64),
}

impl RunKey {
    /// Resolve to the directory name, warning when a numeric key is coerced.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Text(key) => key,
            Self::Number(n) => {
                tracing::warn!(run_key = n, "run key is not a string, converting");
                n.to_string()
            }
        }
    }
}

impl From<&str> for RunKey {
    fn from(key: &str) -> Self {
        Self::Text(key.to_string())
    }
}

impl From<String> for RunKey {
    fn from(key: String) -> Self {
        Self::Text(key)
    }
}

impl From<&String> for RunKey {
    fn from(key: &String) -> Self {
        Self::Text(key.clone())
    }
}

impl From<i32> for RunKey {
    fn from(key: i32) -> Self {
        Self::Number(i64::from(key))
    }
}

impl From<i64> for RunKey {
    fn from(key: i64) -> Self {
        Self::Number(key)
    }
}

impl From<u32> for RunKey {
    fn from(key: u32) -> Self {
        Self::Number(i64::from(key))
    }
}

/// Index over a results directory.
#[derive(Debug)]
pub struct RunIndex {
    base_directory: PathBuf,
    run_file: String,
    config_file: String,
    metrics_file: String,
    runs: Vec<String>,
    metadata: HashMap<String, Arc<Document>>,
}

impl RunIndex {
    /// Open a results directory with the default layout.
    ///
    /// # Errors
    ///
    /// `NotFound` if `<base>/_sources` does not exist; `Io` if the directory
    /// cannot be listed.
    pub fn open(base_directory: impl Into<PathBuf>) -> Result<Self> {
        Self::builder(base_directory).build()
    }

    /// Create a builder for a non-default layout.
    #[must_use]
    pub fn builder(base_directory: impl Into<PathBuf>) -> RunIndexBuilder {
        RunIndexBuilder::new(base_directory)
    }

    /// Get the base results directory.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Rescan the base directory for run directories.
    ///
    /// Keeps all-digit entries, sorts them numerically and prunes cached
    /// metadata of runs that disappeared. Cached metadata is not reloaded.
    ///
    /// # Errors
    ///
    /// `Io` if the directory cannot be listed.
    pub fn update(&mut self) -> Result<()> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.base_directory)? {
            let name = entry?.file_name();
            if let Some(name) = name.to_str() {
                if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort_by(|a, b| numeric_cmp(a, b));

        self.metadata.retain(|key, _| runs.binary_search_by(|r| numeric_cmp(r, key)).is_ok());
        tracing::debug!(
            base = %self.base_directory.display(),
            runs = runs.len(),
            cached = self.metadata.len(),
            "scanned results directory"
        );
        self.runs = runs;
        Ok(())
    }

    /// Known run keys in numeric order.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.runs
    }

    /// Number of known runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Check if no runs were found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Check if a run key is known.
    #[must_use]
    pub fn contains(&self, run_key: &str) -> bool {
        self.runs.binary_search_by(|r| numeric_cmp(r, run_key)).is_ok()
    }

    /// Cached metadata of a run, without loading it.
    #[must_use]
    pub fn cached(&self, run_key: &str) -> Option<&Arc<Document>> {
        self.metadata.get(run_key)
    }

    /// Get a run, loading and caching its metadata on first access.
    ///
    /// If the metadata file has vanished since it was cached, the cached
    /// document is reused.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the key is unknown; `NotFound` if the metadata
    /// file is missing and nothing is cached; `Parse` if it is malformed.
    pub fn get(&mut self, run_key: impl Into<RunKey>) -> Result<RunRecord> {
        let run_key = run_key.into().into_text();
        if !self.contains(&run_key) {
            return Err(Error::InvalidArgument(format!(
                "Unknown run {run_key:?} in {}",
                self.base_directory.display()
            )));
        }

        let run_directory = self.base_directory.join(&run_key);
        let metadata = match self.metadata.get(&run_key) {
            Some(cached) => Arc::clone(cached),
            None => {
                let loaded = Arc::new(Document::slurp(run_directory.join(&self.run_file))?);
                self.metadata.insert(run_key.clone(), Arc::clone(&loaded));
                loaded
            }
        };

        Ok(
            RunRecord::new(&self.base_directory, run_directory, metadata)
                .with_document_files(&self.config_file, &self.metrics_file),
        )
    }

    /// Flat table of every run: key, name, status, timing and config values.
    ///
    /// # Errors
    ///
    /// Propagates metadata, config and timestamp errors of any run.
    pub fn as_table(&mut self) -> Result<RunTable> {
        self.as_table_with(<[String]>::to_vec)
    }

    /// Like [`as_table`](Self::as_table) over the keys chosen by `key_filter`.
    ///
    /// The filter receives the current key sequence and returns the keys to
    /// export, in export order.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the filter returns an unknown key; otherwise as
    /// [`as_table`](Self::as_table).
    pub fn as_table_with<F>(&mut self, key_filter: F) -> Result<RunTable>
    where
        F: FnOnce(&[String]) -> Vec<String>,
    {
        let keys = key_filter(&self.runs);
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            let mut run = self.get(key)?;
            rows.push(RunRow::from_run(&mut run)?);
        }
        Ok(RunTable::from_rows(rows))
    }
}

impl fmt::Display for RunIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunIndex({}, {} runs)",
            self.base_directory.display(),
            self.runs.len()
        )
    }
}

/// Builder for `RunIndex`.
#[derive(Debug)]
pub struct RunIndexBuilder {
    base_directory: PathBuf,
    sources_dir: String,
    run_file: String,
    config_file: String,
    metrics_file: String,
}

impl RunIndexBuilder {
    /// Create a builder with the default layout.
    #[must_use]
    pub fn new(base_directory: impl Into<PathBuf>) -> Self {
        Self {
            base_directory: base_directory.into(),
            sources_dir: SOURCES_DIR.to_string(),
            run_file: RUN_FILE.to_string(),
            config_file: CONFIG_FILE.to_string(),
            metrics_file: METRICS_FILE.to_string(),
        }
    }

    /// Set the marker directory name.
    #[must_use]
    pub fn sources_dir(mut self, name: impl Into<String>) -> Self {
        self.sources_dir = name.into();
        self
    }

    /// Set the metadata file name.
    #[must_use]
    pub fn run_file(mut self, name: impl Into<String>) -> Self {
        self.run_file = name.into();
        self
    }

    /// Set the config file name.
    #[must_use]
    pub fn config_file(mut self, name: impl Into<String>) -> Self {
        self.config_file = name.into();
        self
    }

    /// Set the metrics file name.
    #[must_use]
    pub fn metrics_file(mut self, name: impl Into<String>) -> Self {
        self.metrics_file = name.into();
        self
    }

    /// Validate the directory and perform the initial scan.
    ///
    /// # Errors
    ///
    /// `NotFound` if the marker directory is absent; `Io` on listing failure.
    pub fn build(self) -> Result<RunIndex> {
        let sources = self.base_directory.join(&self.sources_dir);
        if !sources.is_dir() {
            return Err(Error::NotFound(format!(
                "{} directory not found, {} is probably not a results directory",
                self.sources_dir,
                self.base_directory.display()
            )));
        }

        let mut index = RunIndex {
            base_directory: self.base_directory,
            run_file: self.run_file,
            config_file: self.config_file,
            metrics_file: self.metrics_file,
            runs: Vec::new(),
            metadata: HashMap::new(),
        };
        index.update()?;
        Ok(index)
    }
}

/// Compare two all-digit strings by numeric value, without overflow.
fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        .then_with(|| a.len().cmp(&b.len()))
}
