//! Run Record - one run directory with lazily loaded documents

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command::build_command;
use super::metric_record::MetricRecord;
use crate::document::Document;
use crate::{Error, Result};

/// Timestamp layout written by the tracker, e.g. `2020-01-01T00:00:00.000000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Default file name of the lazily loaded config document.
pub const CONFIG_FILE: &str = "config.json";

/// Default file name of the lazily loaded metrics document.
pub const METRICS_FILE: &str = "metrics.json";

/// Status of a run as recorded in its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is queued but not yet started.
    Queued,
    /// Run is executing (or died without reporting).
    Running,
    /// Run finished successfully.
    Completed,
    /// Run raised an error.
    Failed,
    /// Run was interrupted by the user.
    Interrupted,
    /// Run hit its time limit.
    TimedOut,
    /// Status string this crate does not recognise.
    Unknown(String),
}

impl RunStatus {
    /// Parse the tracker's status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "INTERRUPTED" => Self::Interrupted,
            "TIMED_OUT" => Self::TimedOut,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The tracker's spelling of this status.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Interrupted => "INTERRUPTED",
            Self::TimedOut => "TIMED_OUT",
            Self::Unknown(s) => s,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Run directory on disk.
    pub run_directory: PathBuf,
    /// Run key (directory name).
    pub run_key: String,
    /// `experiment.name` from metadata.
    pub name: Option<String>,
    /// Parsed `status`, if present.
    pub status: Option<RunStatus>,
    /// Parsed `start_time`.
    pub start_time: NaiveDateTime,
    /// Parsed `stop_time`; absent while running or after a crash.
    pub stop_time: Option<NaiveDateTime>,
    /// `stop_time - start_time`, absent when `stop_time` is.
    pub duration: Option<Duration>,
}

impl RunInfo {
    /// Duration in seconds, absent when `stop_time` is.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.and_then(duration_secs)
    }
}

/// One experiment run.
///
/// The metadata document is supplied eagerly; `config.json` and
/// `metrics.json` are read on first access and cached in the record.
#[derive(Debug, Clone)]
pub struct RunRecord {
    base_directory: PathBuf,
    run_directory: PathBuf,
    run_key: String,
    metadata: Arc<Document>,
    artifacts: BTreeSet<String>,
    config_file: String,
    metrics_file: String,
    config: Option<Document>,
    metrics: Option<Document>,
}

impl RunRecord {
    /// Create a run record from already-loaded metadata.
    ///
    /// The artifact set is read from the metadata's `artifacts` list here,
    /// once; non-string entries are skipped.
    #[must_use]
    pub fn new(
        base_directory: impl Into<PathBuf>,
        run_directory: impl Into<PathBuf>,
        metadata: Arc<Document>,
    ) -> Self {
        let run_directory = run_directory.into();
        let run_key = run_directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut artifacts = BTreeSet::new();
        if let Some(Value::Array(items)) = metadata.get("artifacts") {
            for item in items {
                match item.as_str() {
                    Some(name) => {
                        artifacts.insert(name.to_string());
                    }
                    None => tracing::warn!(run = %run_key, entry = %item, "skipping non-string artifact entry"),
                }
            }
        }

        Self {
            base_directory: base_directory.into(),
            run_directory,
            run_key,
            metadata,
            artifacts,
            config_file: CONFIG_FILE.to_string(),
            metrics_file: METRICS_FILE.to_string(),
            config: None,
            metrics: None,
        }
    }

    /// Override the config/metrics file names (used by `RunIndexBuilder`).
    #[must_use]
    pub(crate) fn with_document_files(
        mut self,
        config_file: impl Into<String>,
        metrics_file: impl Into<String>,
    ) -> Self {
        self.config_file = config_file.into();
        self.metrics_file = metrics_file.into();
        self
    }

    /// Get the run key (run directory name).
    #[must_use]
    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    /// Get the base results directory.
    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Get the run directory.
    #[must_use]
    pub fn run_directory(&self) -> &Path {
        &self.run_directory
    }

    /// Get the metadata document.
    #[must_use]
    pub fn metadata(&self) -> &Arc<Document> {
        &self.metadata
    }

    /// Look up a dotted path in the metadata.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.metadata.get(path)
    }

    /// Top-level metadata keys.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.metadata.keys()
    }

    /// Parsed `status` field.
    #[must_use]
    pub fn status(&self) -> Option<RunStatus> {
        self.metadata.get_str("status").map(RunStatus::parse)
    }

    /// The config document, loaded on first call.
    ///
    /// # Errors
    ///
    /// `NotFound` if the config file is missing, `Parse` if malformed.
    pub fn config(&mut self) -> Result<&Document> {
        let config = match self.config.take() {
            Some(config) => config,
            None => Document::slurp(self.run_directory.join(&self.config_file))?,
        };
        Ok(self.config.insert(config))
    }

    /// The config document if it has already been loaded.
    #[must_use]
    pub const fn loaded_config(&self) -> Option<&Document> {
        self.config.as_ref()
    }

    /// The metrics document, loaded on first call.
    ///
    /// # Errors
    ///
    /// `NotFound` if the metrics file is missing, `Parse` if malformed.
    pub fn metrics(&mut self) -> Result<&Document> {
        let metrics = match self.metrics.take() {
            Some(metrics) => metrics,
            None => Document::slurp(self.run_directory.join(&self.metrics_file))?,
        };
        Ok(self.metrics.insert(metrics))
    }

    /// The metrics document if it has already been loaded.
    #[must_use]
    pub const fn loaded_metrics(&self) -> Option<&Document> {
        self.metrics.as_ref()
    }

    /// Names of the recorded metric series.
    ///
    /// # Errors
    ///
    /// Propagates metrics document loading errors.
    pub fn metric_names(&mut self) -> Result<Vec<String>> {
        Ok(self.metrics()?.keys().into_iter().map(str::to_string).collect())
    }

    /// Points of one metric series, ordered by step.
    ///
    /// Returns an empty vector when the series does not exist.
    ///
    /// # Errors
    ///
    /// Propagates metrics document loading errors; `Parse` if the series is
    /// malformed.
    pub fn metric_records(&mut self, name: &str) -> Result<Vec<MetricRecord>> {
        let run_key = self.run_key.clone();
        match self.metrics()?.raw().get(name) {
            Some(series) => MetricRecord::from_series(&run_key, name, series),
            None => Ok(Vec::new()),
        }
    }

    /// Artifact file names declared in metadata.
    #[must_use]
    pub const fn artifacts(&self) -> &BTreeSet<String> {
        &self.artifacts
    }

    fn artifact_path(&self, artifact: &str) -> Result<PathBuf> {
        if !self.artifacts.contains(artifact) {
            return Err(Error::InvalidArgument(format!(
                "Unknown artifact requested: {artifact:?}"
            )));
        }
        let mut components = Path::new(artifact).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.run_directory.join(artifact)),
            _ => Err(Error::InvalidArgument(format!(
                "Artifact name is not a plain file name: {artifact:?}"
            ))),
        }
    }

    /// Open an artifact read-only.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the artifact is not declared; `Io` if opening fails.
    pub fn open_artifact(&self, artifact: &str) -> Result<File> {
        Ok(File::open(self.artifact_path(artifact)?)?)
    }

    /// Open an artifact with explicit options.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the artifact is not declared; `Io` if opening fails.
    pub fn open_artifact_with(&self, artifact: &str, options: &OpenOptions) -> Result<File> {
        Ok(options.open(self.artifact_path(artifact)?)?)
    }

    /// Copy artifacts into `output_path`, returning destinations in request order.
    ///
    /// All requested names are validated before anything is copied. Copies
    /// are not atomic: if one fails, the files copied before it stay on disk
    /// and the error is returned immediately.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` listing every unknown artifact (sorted), or if a
    /// destination is the source file itself; `NotFound` if `output_path` is
    /// missing and `create_output_path` is false; `Io` on copy failure.
    pub fn extract_artifacts<I, S>(
        &self,
        output_path: impl AsRef<Path>,
        artifacts: I,
        create_output_path: bool,
    ) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let output_path = output_path.as_ref();
        let requested: Vec<S> = artifacts.into_iter().collect();

        let unknown: BTreeSet<&str> = requested
            .iter()
            .map(|a| a.as_ref())
            .filter(|a| !self.artifacts.contains(*a))
            .collect();
        if !unknown.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Unknown artifacts requested: {:?}",
                unknown.into_iter().collect::<Vec<_>>()
            )));
        }

        let sources = requested
            .iter()
            .map(|a| self.artifact_path(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        if !output_path.exists() {
            if create_output_path {
                fs::create_dir_all(output_path)?;
            } else {
                return Err(Error::NotFound(output_path.display().to_string()));
            }
        }

        if fs::canonicalize(output_path)? == fs::canonicalize(&self.run_directory)? {
            return Err(Error::InvalidArgument(format!(
                "Cannot extract artifacts into their own run directory: {}",
                output_path.display()
            )));
        }
        let pairs: Vec<(PathBuf, PathBuf)> = requested
            .iter()
            .zip(sources)
            .map(|(artifact, source)| (source, output_path.join(artifact.as_ref())))
            .collect();
        for (source, target) in &pairs {
            if target.exists() && fs::canonicalize(target)? == fs::canonicalize(source)? {
                return Err(Error::InvalidArgument(format!(
                    "Artifact {} and {} are the same file",
                    source.display(),
                    target.display()
                )));
            }
        }

        let mut targets = Vec::with_capacity(pairs.len());
        for (source, target) in pairs {
            fs::copy(&source, &target)?;
            tracing::debug!(run = %self.run_key, artifact = %target.display(), "copied artifact");
            targets.push(target);
        }
        Ok(targets)
    }

    /// Name, status, start time and duration of the run.
    ///
    /// # Errors
    ///
    /// `MissingField` if `start_time` is absent; `Parse` if a timestamp is
    /// malformed.
    pub fn info(&self) -> Result<RunInfo> {
        let start_time = self
            .metadata
            .get_str("start_time")
            .ok_or_else(|| Error::MissingField("start_time".to_string()))
            .and_then(parse_timestamp)?;
        let stop_time = self
            .metadata
            .get_str("stop_time")
            .map(parse_timestamp)
            .transpose()?;

        Ok(RunInfo {
            run_directory: self.run_directory.clone(),
            run_key: self.run_key.clone(),
            name: self.metadata.get_str("experiment.name").map(str::to_string),
            status: self.status(),
            start_time,
            stop_time,
            duration: stop_time.map(|stop| stop - start_time),
        })
    }

    /// Approximate command line that started this run (display only).
    ///
    /// # Errors
    ///
    /// `MissingField` if the metadata lacks `base_dir`, `mainfile` or `command`.
    pub fn command(&self) -> Result<String> {
        build_command(&self.metadata)
    }
}

impl fmt::Display for RunRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.run_key)?;
        if let Some(name) = self.metadata.get_str("experiment.name") {
            write!(f, " ({name})")?;
        }
        if let Some(status) = self.status() {
            write!(f, " [{status}]")?;
        }
        Ok(())
    }
}

/// Length of `duration` in seconds; `None` if it overflows microseconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn duration_secs(duration: Duration) -> Option<f64> {
    duration.num_microseconds().map(|us| us as f64 / 1_000_000.0)
}

/// Parse a tracker timestamp.
///
/// # Errors
///
/// `Parse` if `raw` does not match [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| Error::Parse(format!("timestamp {raw:?}: {e}")))
}
