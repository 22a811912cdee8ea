//! Run directory model
//!
//! ## Schema Overview
//!
//! ```text
//! RunIndex (1) ──< RunRecord (N)      produced on demand, metadata cached
//!                      │
//!                      ├── config.json   [lazy Document]
//!                      ├── metrics.json  [lazy Document] ──< MetricRecord
//!                      └── artifacts     [file names in run.json]
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sacred_reader::experiment::RunIndex;
//!
//! # fn main() -> sacred_reader::Result<()> {
//! let mut index = RunIndex::open("results/")?;
//! for key in index.keys().to_vec() {
//!     let mut run = index.get(key)?;
//!     let info = run.info()?;
//!     println!("{} {:?} {:?}", run.run_key(), info.name, info.duration);
//!     println!("lr = {:?}", run.config()?.get("lr"));
//! }
//! # Ok(())
//! # }
//! ```

mod command;
mod index;
mod metric_record;
mod run_record;

pub use command::build_command;
pub use index::{RunIndex, RunIndexBuilder, RunKey, RUN_FILE, SOURCES_DIR};
pub use metric_record::MetricRecord;
pub use run_record::{
    duration_secs, parse_timestamp, RunInfo, RunRecord, RunStatus, CONFIG_FILE, METRICS_FILE,
    TIMESTAMP_FORMAT,
};
