//! Metric Record - time-series points read from `metrics.json`

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::run_record::parse_timestamp;
use crate::{Error, Result};

/// One point of a logged metric series.
///
/// The metrics document stores each series column-wise:
///
/// ```text
/// { "loss": { "steps": [0, 1], "values": [0.9, 0.7], "timestamps": ["...", "..."] } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_key: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: Option<NaiveDateTime>,
}

impl MetricRecord {
    /// Create a new metric record.
    #[must_use]
    pub fn new(run_key: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_key: run_key.into(),
            key: key.into(),
            step,
            value,
            timestamp: None,
        }
    }

    /// Set the timestamp the point was logged at.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Expand one column-wise series into points ordered by step.
    ///
    /// `timestamps` is optional; when present it must line up with `steps`.
    ///
    /// # Errors
    ///
    /// `Parse` if `steps`/`values` are missing, of different lengths, or not
    /// numeric.
    pub fn from_series(run_key: &str, key: &str, series: &Value) -> Result<Vec<Self>> {
        let steps = series_column(series, key, "steps")?;
        let values = series_column(series, key, "values")?;
        if steps.len() != values.len() {
            return Err(Error::Parse(format!(
                "metric {key:?}: {} steps but {} values",
                steps.len(),
                values.len()
            )));
        }
        let timestamps = series.get("timestamps").and_then(Value::as_array);

        let mut records = Vec::with_capacity(steps.len());
        for (i, (step, value)) in steps.iter().zip(values).enumerate() {
            let step = step
                .as_u64()
                .ok_or_else(|| Error::Parse(format!("metric {key:?}: bad step {step}")))?;
            let value = value
                .as_f64()
                .ok_or_else(|| Error::Parse(format!("metric {key:?}: bad value {value}")))?;
            let mut record = Self::new(run_key, key, step, value);
            if let Some(ts) = timestamps.and_then(|t| t.get(i)).and_then(Value::as_str) {
                record = record.with_timestamp(parse_timestamp(ts)?);
            }
            records.push(record);
        }

        records.sort_by_key(Self::step);
        Ok(records)
    }

    /// Get the run key.
    #[must_use]
    pub fn run_key(&self) -> &str {
        &self.run_key
    }

    /// Get the metric key/name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the logging timestamp, if recorded.
    #[must_use]
    pub const fn timestamp(&self) -> Option<NaiveDateTime> {
        self.timestamp
    }
}

fn series_column<'a>(series: &'a Value, key: &str, name: &str) -> Result<&'a Vec<Value>> {
    series
        .get(name)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Parse(format!("metric {key:?}: missing {name:?} list")))
}
