//! Trace scanning over a run's trace artifacts
//!
//! ## Trace layout
//!
//! ```text
//! openaigym.trace.<id>.manifest.json   {"batches": [{"fn": "<batch file>", ...}]}
//! openaigym.trace.<id>.ep000000000.json {"episodes": [{"observations": [...],
//!                                                       "actions": [...],
//!                                                       "rewards": [...]}]}
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::Episode;
use crate::document::Document;
use crate::experiment::RunRecord;
use crate::{Error, Result};

/// Artifact name prefix of recorded traces.
pub const TRACE_PREFIX: &str = "openaigym.trace";

const MANIFEST_SUFFIX: &str = ".manifest.json";

/// Source of episodes found in a directory of trace files.
pub trait TraceScanner {
    /// Scan `directory`, calling `on_episode` once per episode in recording
    /// order. Returns the number of episodes delivered.
    ///
    /// # Errors
    ///
    /// Returns error if a trace file is unreadable or malformed, or if the
    /// callback fails.
    fn scan(
        &self,
        directory: &Path,
        on_episode: &mut dyn FnMut(Episode) -> Result<()>,
    ) -> Result<usize>;
}

/// Scanner for manifest-based JSON traces.
#[derive(Debug, Clone, Default)]
pub struct ManifestScanner {
    max_episodes: Option<usize>,
}

impl ManifestScanner {
    /// Create a scanner without an episode limit.
    #[must_use]
    pub const fn new() -> Self {
        Self { max_episodes: None }
    }

    /// Stop after `max_episodes` episodes.
    #[must_use]
    pub const fn with_max_episodes(mut self, max_episodes: usize) -> Self {
        self.max_episodes = Some(max_episodes);
        self
    }

    fn manifests(directory: &Path) -> Result<Vec<PathBuf>> {
        let mut manifests = Vec::new();
        for entry in fs::read_dir(directory)? {
            let path = entry?.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(TRACE_PREFIX) && n.ends_with(MANIFEST_SUFFIX));
            if is_manifest {
                manifests.push(path);
            }
        }
        manifests.sort();
        Ok(manifests)
    }
}

impl TraceScanner for ManifestScanner {
    fn scan(
        &self,
        directory: &Path,
        on_episode: &mut dyn FnMut(Episode) -> Result<()>,
    ) -> Result<usize> {
        let mut delivered = 0;
        for manifest_path in Self::manifests(directory)? {
            let manifest = Document::slurp(&manifest_path)?;
            let batches = manifest
                .get("batches")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    Error::Parse(format!("{}: missing batches", manifest_path.display()))
                })?;

            for batch in batches {
                let batch_file = batch
                    .get("fn")
                    .and_then(Value::as_str)
                    .and_then(|name| Path::new(name).file_name())
                    .ok_or_else(|| {
                        Error::Parse(format!("{}: batch without fn", manifest_path.display()))
                    })?;
                let batch_doc = Document::slurp(directory.join(batch_file))?;
                let episodes = batch_doc
                    .get("episodes")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();

                for episode in episodes {
                    if self.max_episodes.is_some_and(|max| delivered >= max) {
                        return Ok(delivered);
                    }
                    on_episode(decode_episode(episode)?)?;
                    delivered += 1;
                }
            }
        }
        tracing::debug!(directory = %directory.display(), episodes = delivered, "scanned traces");
        Ok(delivered)
    }
}

fn decode_episode(episode: &Value) -> Result<Episode> {
    let sequence = |name: &str| -> Result<Vec<Vec<f64>>> {
        match episode.get(name) {
            Some(Value::Array(steps)) => steps.iter().map(flatten_step).collect(),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(Error::Parse(format!("episode {name}: expected list, got {other}"))),
        }
    };
    let observations = sequence("observations")?;
    let actions = sequence("actions")?;
    let rewards = sequence("rewards")?
        .into_iter()
        .map(|step| match step.as_slice() {
            [reward] => Ok(*reward),
            _ => Err(Error::Parse(format!("reward must be a scalar, got {step:?}"))),
        })
        .collect::<Result<Vec<f64>>>()?;
    Ok(Episode::new(observations, actions, rewards))
}

/// Flatten one timestep (scalar or nested list of numbers) into a row.
fn flatten_step(step: &Value) -> Result<Vec<f64>> {
    fn walk(value: &Value, out: &mut Vec<f64>) -> Result<()> {
        match value {
            Value::Number(n) => {
                out.push(n.as_f64().unwrap_or(f64::NAN));
                Ok(())
            }
            Value::Bool(b) => {
                out.push(if *b { 1.0 } else { 0.0 });
                Ok(())
            }
            Value::Array(items) => items.iter().try_for_each(|item| walk(item, out)),
            other => Err(Error::Parse(format!("non-numeric trace value {other}"))),
        }
    }
    let mut row = Vec::new();
    walk(step, &mut row)?;
    Ok(row)
}

/// Replay a run's recorded traces.
///
/// Copies every artifact whose name starts with [`TRACE_PREFIX`] into
/// `scratch` (a fresh temporary directory when `None`), scans it, then
/// removes the copies. Copies already made are also removed when a later
/// extraction fails. Returns the number of episodes delivered.
///
/// # Errors
///
/// Returns artifact extraction, scanning and callback errors.
pub fn scan_recorded_traces<S, F>(
    run: &RunRecord,
    scanner: &S,
    mut on_episode: F,
    scratch: Option<&Path>,
) -> Result<usize>
where
    S: TraceScanner + ?Sized,
    F: FnMut(Episode) -> Result<()>,
{
    let temp_dir;
    let directory = if let Some(dir) = scratch {
        dir
    } else {
        temp_dir = tempfile::Builder::new().prefix("sacred_reader_tmp").tempdir()?;
        temp_dir.path()
    };

    let trace_artifacts: Vec<&str> = run
        .artifacts()
        .iter()
        .map(String::as_str)
        .filter(|name| name.starts_with(TRACE_PREFIX))
        .collect();
    let mut copies = Vec::with_capacity(trace_artifacts.len());
    for name in trace_artifacts {
        match run.extract_artifacts(directory, [name], true) {
            Ok(copied) => copies.extend(copied),
            Err(e) => {
                remove_copies(&copies);
                return Err(e);
            }
        }
    }

    let scanned = scanner.scan(directory, &mut on_episode);
    remove_copies(&copies);
    scanned
}

fn remove_copies(copies: &[PathBuf]) {
    for copy in copies {
        if let Err(e) = fs::remove_file(copy) {
            tracing::warn!(path = %copy.display(), error = %e, "failed to remove trace copy");
        }
    }
}
