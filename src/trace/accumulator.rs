//! Episode accumulator with explicit stacking policies
//!
//! Two behaviours exist in the wild for the final episode of a recording,
//! which is often cut short when the run stops:
//!
//! - keep it in the stacked arrays and only flag it
//!   ([`LastEpisode::Include`]), or
//! - drop it when its shape differs from the previous episode
//!   ([`LastEpisode::ExcludeIfIncomplete`]).
//!
//! Observations are either stacked as transitions (`obs[t]` aligned with
//! `obs[t + 1]`, dropping one timestep per episode) or as recorded.

use super::playback::{scan_recorded_traces, TraceScanner};
use super::Episode;
use crate::experiment::RunRecord;
use crate::{Error, Result};

/// Treatment of the final episode when stacking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastEpisode {
    /// Stack every episode; `last_incomplete` is informational only.
    #[default]
    Include,
    /// Leave the last episode out when `last_incomplete` is set.
    ExcludeIfIncomplete,
}

/// Layout of stacked observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationLayout {
    /// `observations` drop each episode's final timestep and
    /// `next_observations` drop its first.
    #[default]
    Transitions,
    /// `observations` keep every timestep; no `next_observations`.
    Full,
}

/// Stacking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackOptions {
    /// Final-episode policy.
    pub last_episode: LastEpisode,
    /// Observation layout.
    pub observations: ObservationLayout,
}

impl StackOptions {
    /// Set the final-episode policy.
    #[must_use]
    pub const fn last_episode(mut self, policy: LastEpisode) -> Self {
        self.last_episode = policy;
        self
    }

    /// Set the observation layout.
    #[must_use]
    pub const fn observations(mut self, layout: ObservationLayout) -> Self {
        self.observations = layout;
        self
    }
}

/// Row-major 2-D array of stacked timesteps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StackedArray {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl StackedArray {
    /// Concatenate row blocks vertically.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if rows differ in width.
    pub fn vstack<'a, I>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [Vec<f64>]>,
    {
        let mut stacked = Self::default();
        for row in blocks.into_iter().flatten() {
            if stacked.rows == 0 {
                stacked.cols = row.len();
            } else if row.len() != stacked.cols {
                return Err(Error::InvalidArgument(format!(
                    "cannot stack row of width {} onto width {}",
                    row.len(),
                    stacked.cols
                )));
            }
            stacked.data.extend_from_slice(row);
            stacked.rows += 1;
        }
        Ok(stacked)
    }

    /// `(rows, cols)`.
    #[must_use]
    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// One row.
    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        (index < self.rows).then(|| &self.data[index * self.cols..(index + 1) * self.cols])
    }

    /// Flat row-major data.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }
}

/// Result of [`TraceAccumulator::stack`].
#[derive(Debug, Clone, PartialEq)]
pub struct StackedTraces {
    /// Stacked observations.
    pub observations: StackedArray,
    /// Successor observations (transitions layout only).
    pub next_observations: Option<StackedArray>,
    /// Stacked actions.
    pub actions: StackedArray,
    /// Concatenated rewards.
    pub rewards: Vec<f64>,
    /// Sum of rewards per stacked episode.
    pub returns: Vec<f64>,
    /// Reward steps per stacked episode.
    pub episode_lengths: Vec<usize>,
    /// The last episode's observation shape differs from its predecessor's.
    pub last_incomplete: bool,
}

/// Collects episodes delivered by a [`TraceScanner`].
#[derive(Debug, Clone, Default)]
pub struct TraceAccumulator {
    episodes: Vec<Episode>,
}

impl TraceAccumulator {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay every trace of `run` into a new accumulator.
    ///
    /// # Errors
    ///
    /// Propagates playback errors.
    pub fn from_run<S: TraceScanner + ?Sized>(run: &RunRecord, scanner: &S) -> Result<Self> {
        let mut traces = Self::new();
        scan_recorded_traces(
            run,
            scanner,
            |episode| {
                traces.add_trace(episode);
                Ok(())
            },
            None,
        )?;
        Ok(traces)
    }

    /// Store an episode. Episodes with an empty sequence are ignored;
    /// returns whether the episode was kept.
    pub fn add_trace(&mut self, episode: Episode) -> bool {
        if episode.is_empty() {
            return false;
        }
        self.episodes.push(episode);
        true
    }

    /// Stored episodes.
    #[must_use]
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Number of stored episodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    /// Check if no episode was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Whether the last episode's observation shape differs from the one
    /// before it. Always false with fewer than two episodes.
    #[must_use]
    pub fn last_incomplete(&self) -> bool {
        match self.episodes.as_slice() {
            [.., previous, last] => observation_shape(previous) != observation_shape(last),
            _ => false,
        }
    }

    /// Stack stored episodes into aligned arrays.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if nothing is left to stack or rows differ in width.
    pub fn stack(&self, options: StackOptions) -> Result<StackedTraces> {
        let last_incomplete = self.last_incomplete();
        let episodes = match options.last_episode {
            LastEpisode::ExcludeIfIncomplete if last_incomplete => {
                &self.episodes[..self.episodes.len() - 1]
            }
            _ => self.episodes.as_slice(),
        };
        if episodes.is_empty() {
            return Err(Error::InvalidArgument("no episodes to stack".to_string()));
        }

        let (observations, next_observations) = match options.observations {
            ObservationLayout::Transitions => (
                StackedArray::vstack(episodes.iter().map(|e| {
                    let obs = e.observations.as_slice();
                    &obs[..obs.len() - 1]
                }))?,
                Some(StackedArray::vstack(
                    episodes.iter().map(|e| &e.observations[1..]),
                )?),
            ),
            ObservationLayout::Full => (
                StackedArray::vstack(episodes.iter().map(|e| e.observations.as_slice()))?,
                None,
            ),
        };

        Ok(StackedTraces {
            observations,
            next_observations,
            actions: StackedArray::vstack(episodes.iter().map(|e| e.actions.as_slice()))?,
            rewards: episodes.iter().flat_map(|e| e.rewards.iter().copied()).collect(),
            returns: episodes.iter().map(|e| e.rewards.iter().sum()).collect(),
            episode_lengths: episodes.iter().map(Episode::len).collect(),
            last_incomplete,
        })
    }
}

fn observation_shape(episode: &Episode) -> (usize, usize) {
    (
        episode.observations.len(),
        episode.observations.first().map_or(0, Vec::len),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(steps: usize, width: usize) -> Episode {
        #[allow(clippy::cast_precision_loss)]
        let observations = (0..=steps).map(|t| vec![t as f64; width]).collect();
        let actions = (0..steps).map(|_| vec![1.0]).collect();
        let rewards = vec![0.5; steps];
        Episode::new(observations, actions, rewards)
    }

    #[test]
    fn test_empty_episodes_are_ignored() {
        let mut acc = TraceAccumulator::new();
        assert!(!acc.add_trace(Episode::new(vec![vec![0.0]], vec![], vec![])));
        assert!(acc.add_trace(episode(3, 2)));
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_stack_transitions_includes_last_episode() {
        let mut acc = TraceAccumulator::new();
        acc.add_trace(episode(3, 2));
        acc.add_trace(episode(3, 2));
        acc.add_trace(episode(1, 2));

        let stacked = acc.stack(StackOptions::default()).unwrap();
        assert!(stacked.last_incomplete);
        assert_eq!(stacked.observations.shape(), (7, 2));
        assert_eq!(stacked.next_observations.as_ref().unwrap().shape(), (7, 2));
        assert_eq!(stacked.observations.row(0), Some([0.0, 0.0].as_slice()));
        assert_eq!(stacked.next_observations.unwrap().row(0), Some([1.0, 1.0].as_slice()));
        assert_eq!(stacked.actions.shape(), (7, 1));
        assert_eq!(stacked.rewards.len(), 7);
        assert_eq!(stacked.episode_lengths, vec![3, 3, 1]);
        assert!((stacked.returns[0] - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stack_excludes_incomplete_last_episode() {
        let mut acc = TraceAccumulator::new();
        acc.add_trace(episode(3, 2));
        acc.add_trace(episode(3, 2));
        acc.add_trace(episode(1, 2));

        let options = StackOptions::default().last_episode(LastEpisode::ExcludeIfIncomplete);
        let stacked = acc.stack(options).unwrap();
        assert!(stacked.last_incomplete);
        assert_eq!(stacked.episode_lengths, vec![3, 3]);
        assert_eq!(stacked.observations.shape(), (6, 2));
    }

    #[test]
    fn test_exclude_keeps_complete_last_episode() {
        let mut acc = TraceAccumulator::new();
        acc.add_trace(episode(2, 1));
        acc.add_trace(episode(2, 1));

        let options = StackOptions::default().last_episode(LastEpisode::ExcludeIfIncomplete);
        let stacked = acc.stack(options).unwrap();
        assert!(!stacked.last_incomplete);
        assert_eq!(stacked.episode_lengths, vec![2, 2]);
    }

    #[test]
    fn test_stack_full_observations() {
        let mut acc = TraceAccumulator::new();
        acc.add_trace(episode(3, 2));
        acc.add_trace(episode(2, 2));

        let options = StackOptions::default().observations(ObservationLayout::Full);
        let stacked = acc.stack(options).unwrap();
        assert_eq!(stacked.observations.shape(), (7, 2));
        assert!(stacked.next_observations.is_none());
    }

    #[test]
    fn test_single_episode_is_not_incomplete() {
        let mut acc = TraceAccumulator::new();
        acc.add_trace(episode(1, 3));
        assert!(!acc.last_incomplete());
        let options = StackOptions::default().last_episode(LastEpisode::ExcludeIfIncomplete);
        assert_eq!(acc.stack(options).unwrap().episode_lengths, vec![1]);
    }

    #[test]
    fn test_stack_errors() {
        let acc = TraceAccumulator::new();
        assert!(matches!(acc.stack(StackOptions::default()), Err(Error::InvalidArgument(_))));

        let mut ragged = TraceAccumulator::new();
        ragged.add_trace(episode(2, 2));
        ragged.add_trace(episode(2, 3));
        assert!(matches!(
            ragged.stack(StackOptions::default()),
            Err(Error::InvalidArgument(_))
        ));
    }
}
