//! Tabular run export (Arrow/Parquet)
//!
//! One row per run with a fixed prefix of columns followed by the union of
//! all runs' config keys:
//!
//! ```text
//! run_key | name | status | start_time | duration | <config keys...>
//! ```
//!
//! Runs that lack a config key simply have a null in that column. The table
//! converts to a single Arrow `RecordBatch` and can be written to Parquet for
//! plotting or notebook analysis.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDateTime};
use serde_json::Value;

use crate::experiment::{duration_secs, RunRecord, TIMESTAMP_FORMAT};
use crate::{Error, Result};

/// Fixed leading columns of every run table.
pub const FIXED_COLUMNS: [&str; 5] = ["run_key", "name", "status", "start_time", "duration"];

/// One flattened run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    /// Run key.
    pub run_key: String,
    /// `experiment.name`.
    pub name: Option<String>,
    /// Raw status string.
    pub status: Option<String>,
    /// Start time; absent for runs that never started.
    pub start_time: Option<NaiveDateTime>,
    /// Run duration; absent while running.
    pub duration: Option<Duration>,
    /// Top-level config entries.
    pub config: BTreeMap<String, Value>,
}

impl RunRow {
    /// Flatten a run, loading its config document.
    ///
    /// A missing `start_time` leaves the timing columns empty instead of
    /// failing.
    ///
    /// # Errors
    ///
    /// Propagates config loading errors and malformed timestamps.
    pub fn from_run(run: &mut RunRecord) -> Result<Self> {
        let (start_time, duration) = match run.info() {
            Ok(info) => (Some(info.start_time), info.duration),
            Err(Error::MissingField(_)) => (None, None),
            Err(e) => return Err(e),
        };
        let config = run
            .config()?
            .raw()
            .as_object()
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        Ok(Self {
            run_key: run.run_key().to_string(),
            name: run.metadata().get_str("experiment.name").map(str::to_string),
            status: run.metadata().get_str("status").map(str::to_string),
            start_time,
            duration,
            config,
        })
    }

    /// Duration in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.and_then(duration_secs)
    }

    /// Value of a column in this row; `None` when absent.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<Value> {
        match column {
            "run_key" => Some(Value::String(self.run_key.clone())),
            "name" => self.name.clone().map(Value::String),
            "status" => self.status.clone().map(Value::String),
            "start_time" => self
                .start_time
                .map(|t| Value::String(t.format(TIMESTAMP_FORMAT).to_string())),
            "duration" => self.duration_secs().map(Value::from),
            key => self.config.get(key).cloned(),
        }
    }
}

/// Table of flattened runs.
#[derive(Debug, Clone, Default)]
pub struct RunTable {
    rows: Vec<RunRow>,
    columns: Vec<String>,
}

impl RunTable {
    /// Build a table; the column set is the fixed columns plus the sorted
    /// union of config keys. Config keys that shadow a fixed column are
    /// left out.
    #[must_use]
    pub fn from_rows(rows: Vec<RunRow>) -> Self {
        let config_keys: BTreeSet<&str> = rows
            .iter()
            .flat_map(|row| row.config.keys().map(String::as_str))
            .collect();

        let mut columns: Vec<String> = FIXED_COLUMNS.iter().map(|c| (*c).to_string()).collect();
        for key in config_keys {
            if FIXED_COLUMNS.contains(&key) {
                tracing::warn!(column = key, "config key shadows a fixed run column, skipping");
            } else {
                columns.push(key.to_string());
            }
        }
        Self { rows, columns }
    }

    /// Get all rows in run order.
    #[must_use]
    pub fn rows(&self) -> &[RunRow] {
        &self.rows
    }

    /// Get the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert to an Arrow record batch.
    ///
    /// Config columns are typed from their non-null values: all booleans ->
    /// Boolean, all integers -> Int64, all numbers -> Float64, otherwise
    /// Utf8 with non-string values JSON-encoded.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the assembled columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut fields = vec![
            Field::new("run_key", DataType::Utf8, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("status", DataType::Utf8, true),
            Field::new(
                "start_time",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("duration", DataType::Float64, true),
        ];
        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.run_key.as_str()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.name.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                self.rows.iter().map(|r| r.status.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(TimestampMicrosecondArray::from(
                self.rows
                    .iter()
                    .map(|r| r.start_time.map(|t| t.and_utc().timestamp_micros()))
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                self.rows.iter().map(RunRow::duration_secs).collect::<Vec<_>>(),
            )),
        ];

        for column in &self.columns[FIXED_COLUMNS.len()..] {
            let values: Vec<Option<&Value>> = self
                .rows
                .iter()
                .map(|r| r.config.get(column).filter(|v| !v.is_null()))
                .collect();
            let (data_type, array) = config_column(&values);
            fields.push(Field::new(column, data_type, true));
            arrays.push(array);
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }

    /// Write the table to a Parquet file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created or written.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;

        let batch = self.to_record_batch()?;
        let file = File::create(path.as_ref())?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
        tracing::debug!(path = %path.as_ref().display(), rows = batch.num_rows(), "wrote run table");
        Ok(())
    }

    /// Load record batches back from a Parquet file written by
    /// [`write_parquet`](Self::write_parquet).
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Vec<RecordBatch>> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }
        Ok(batches)
    }
}

fn config_column(values: &[Option<&Value>]) -> (DataType, ArrayRef) {
    let present = || values.iter().flatten();
    let any_present = present().next().is_some();

    if any_present && present().all(|v| v.is_boolean()) {
        let array = BooleanArray::from(
            values.iter().map(|v| v.and_then(Value::as_bool)).collect::<Vec<_>>(),
        );
        return (DataType::Boolean, Arc::new(array));
    }
    if any_present && present().all(|v| v.is_i64()) {
        let array = Int64Array::from(
            values.iter().map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
        );
        return (DataType::Int64, Arc::new(array));
    }
    if any_present && present().all(|v| v.is_number()) {
        let array = Float64Array::from(
            values.iter().map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
        );
        return (DataType::Float64, Arc::new(array));
    }

    let array = StringArray::from(
        values
            .iter()
            .map(|v| {
                v.map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
            })
            .collect::<Vec<_>>(),
    );
    (DataType::Utf8, Arc::new(array))
}
