//! Trace playback for recorded environment episodes
//!
//! Runs that record environment rollouts store them as artifacts whose names
//! start with [`TRACE_PREFIX`]. Playback copies those artifacts into a
//! scratch directory, scans them episode by episode, and the
//! [`TraceAccumulator`] stacks the episodes into aligned arrays.
//!
//! ```rust,no_run
//! use sacred_reader::experiment::RunIndex;
//! use sacred_reader::trace::{ManifestScanner, StackOptions, TraceAccumulator};
//!
//! # fn main() -> sacred_reader::Result<()> {
//! let mut index = RunIndex::open("results/")?;
//! let run = index.get("11")?;
//! let traces = TraceAccumulator::from_run(&run, &ManifestScanner::new())?;
//! let stacked = traces.stack(StackOptions::default())?;
//! println!("{} episodes, returns {:?}", stacked.episode_lengths.len(), stacked.returns);
//! # Ok(())
//! # }
//! ```

mod accumulator;
mod playback;

pub use accumulator::{
    LastEpisode, ObservationLayout, StackOptions, StackedArray, StackedTraces, TraceAccumulator,
};
pub use playback::{scan_recorded_traces, ManifestScanner, TraceScanner, TRACE_PREFIX};

/// One recorded episode.
///
/// Observations and actions hold one row per timestep (scalars become
/// one-element rows); rewards hold one value per timestep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Episode {
    /// Observation rows.
    pub observations: Vec<Vec<f64>>,
    /// Action rows.
    pub actions: Vec<Vec<f64>>,
    /// Per-step rewards.
    pub rewards: Vec<f64>,
}

impl Episode {
    /// Create an episode from its three sequences.
    #[must_use]
    pub const fn new(observations: Vec<Vec<f64>>, actions: Vec<Vec<f64>>, rewards: Vec<f64>) -> Self {
        Self {
            observations,
            actions,
            rewards,
        }
    }

    /// Check if any of the three sequences is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() || self.actions.is_empty() || self.rewards.is_empty()
    }

    /// Number of reward steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }
}
