//! # sacred-reader: Read-Only Index for Experiment Run Directories
//!
//! **Version**: 0.1.0
//!
//! sacred-reader indexes the result directories written by a file-based run
//! tracker. Every numeric subdirectory is one run holding a `run.json`
//! metadata document, `config.json`, `metrics.json` and artifact files.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Muda elimination**: Metadata, config and metrics are read lazily and
//!   read once
//! - **Poka-Yoke safety**: Artifacts are only reachable by their declared
//!   names, never by arbitrary paths
//! - **Genchi Genbutsu**: The directory listing is the source of truth;
//!   `update()` rescans it incrementally
//! - **Jidoka**: Validation reports every offending input at once
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use sacred_reader::experiment::RunIndex;
//!
//! let mut index = RunIndex::open("results/")?;
//! println!("runs: {:?}", index.keys());
//!
//! let run = index.get("1")?;
//! run.extract_artifacts("/tmp/run1", ["model.pt"], true)?;
//!
//! let table = index.as_table()?;
//! table.write_parquet("runs.parquet")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod document;
pub mod error;
pub mod experiment;
pub mod storage;
pub mod trace;

pub use document::Document;
pub use error::{Error, Result};
pub use experiment::{RunIndex, RunRecord};
