//! Trace playback tests: run artifacts -> scratch copy -> episodes -> stacked arrays

mod common;

use std::fs;
use std::path::Path;

use common::{run_json, ResultsDir};
use sacred_reader::experiment::RunIndex;
use sacred_reader::trace::{
    scan_recorded_traces, Episode, LastEpisode, ManifestScanner, ObservationLayout, StackOptions,
    TraceAccumulator, TraceScanner,
};
use sacred_reader::{Error, Result};
use serde_json::json;

const MANIFEST: &str = "openaigym.trace.0.1234.manifest.json";
const BATCH: &str = "openaigym.trace.0.1234.ep000000000.json";

fn results_with_traces() -> ResultsDir {
    let results = ResultsDir::new();
    results.add_run("3", &run_json("cartpole", &[MANIFEST, BATCH, "cout.txt"]));
    results.write_json(
        "3",
        MANIFEST,
        &json!({ "batches": [{ "first": 0, "len": 3, "fn": BATCH }] }),
    );
    results.write_json(
        "3",
        BATCH,
        &json!({
            "episodes": [
                { "observations": [[0, 0], [1, 1], [2, 2]], "actions": [0, 1], "rewards": [1, 1] },
                { "observations": [], "actions": [], "rewards": [] },
                { "observations": [[5, 5], [6, 6], [7, 7]], "actions": [1, 1], "rewards": [1, 0] },
                { "observations": [[9, 9], [8, 8]], "actions": [0], "rewards": [1] }
            ]
        }),
    );
    results.write("3", "cout.txt", b"stdout capture");
    results
}

#[test]
fn test_scan_recorded_traces_cleans_up_scratch_copies() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();

    let scratch = tempfile::tempdir().unwrap();
    let mut lengths = Vec::new();
    let delivered = scan_recorded_traces(
        &run,
        &ManifestScanner::new(),
        |episode: Episode| {
            lengths.push(episode.len());
            Ok(())
        },
        Some(scratch.path()),
    )
    .unwrap();

    assert_eq!(delivered, 4);
    assert_eq!(lengths, vec![2, 0, 2, 1]);
    // only trace artifacts were copied, and the copies are gone
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_scan_into_run_directory_keeps_artifacts() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();

    let result = scan_recorded_traces(
        &run,
        &ManifestScanner::new(),
        |_| Ok(()),
        Some(run.run_directory()),
    );

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
    for name in [MANIFEST, BATCH] {
        let artifact = results.path().join("3").join(name);
        assert!(fs::metadata(&artifact).unwrap().len() > 0, "{name} was clobbered");
    }
}

#[test]
fn test_failed_extraction_removes_partial_copies() {
    let results = results_with_traces();
    // declared in run.json but never written: sorts after BATCH, before MANIFEST
    let missing = "openaigym.trace.0.1234.ep000000001.json";
    results.add_run("4", &run_json("cartpole", &[BATCH, missing, MANIFEST]));
    fs::copy(
        results.path().join("3").join(BATCH),
        results.path().join("4").join(BATCH),
    )
    .unwrap();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("4").unwrap();

    let scratch = tempfile::tempdir().unwrap();
    let result = scan_recorded_traces(
        &run,
        &ManifestScanner::new(),
        |_| Ok(()),
        Some(scratch.path()),
    );

    assert!(matches!(result, Err(Error::Io(_))));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_accumulator_from_run() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();

    let traces = TraceAccumulator::from_run(&run, &ManifestScanner::new()).unwrap();
    assert_eq!(traces.len(), 3);
    assert!(traces.last_incomplete());

    let stacked = traces.stack(StackOptions::default()).unwrap();
    assert_eq!(stacked.observations.shape(), (5, 2));
    assert_eq!(stacked.actions.shape(), (5, 1));
    assert_eq!(stacked.rewards, vec![1.0, 1.0, 1.0, 0.0, 1.0]);
    assert_eq!(stacked.returns, vec![2.0, 1.0, 1.0]);
    assert_eq!(stacked.episode_lengths, vec![2, 2, 1]);
}

#[test]
fn test_stack_policies_differ_on_incomplete_last_episode() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();
    let traces = TraceAccumulator::from_run(&run, &ManifestScanner::new()).unwrap();

    let excluded = traces
        .stack(
            StackOptions::default()
                .last_episode(LastEpisode::ExcludeIfIncomplete)
                .observations(ObservationLayout::Full),
        )
        .unwrap();
    assert!(excluded.last_incomplete);
    assert_eq!(excluded.episode_lengths, vec![2, 2]);
    assert_eq!(excluded.observations.shape(), (6, 2));
    assert!(excluded.next_observations.is_none());
}

#[test]
fn test_run_without_traces() {
    let results = ResultsDir::new();
    results.add_run("1", &run_json("plain", &["cout.txt"]));
    results.write("1", "cout.txt", b"");
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("1").unwrap();

    let traces = TraceAccumulator::from_run(&run, &ManifestScanner::new()).unwrap();
    assert!(traces.is_empty());
    assert!(matches!(
        traces.stack(StackOptions::default()),
        Err(Error::InvalidArgument(_))
    ));
}

/// Scanner that emits a fixed episode, to exercise custom trace formats.
struct FixedScanner;

impl TraceScanner for FixedScanner {
    fn scan(&self, _directory: &Path, on_episode: &mut dyn FnMut(Episode) -> Result<()>) -> Result<usize> {
        on_episode(Episode::new(
            vec![vec![0.0], vec![1.0]],
            vec![vec![1.0]],
            vec![3.0],
        ))?;
        Ok(1)
    }
}

#[test]
fn test_custom_scanner() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();

    let traces = TraceAccumulator::from_run(&run, &FixedScanner).unwrap();
    let stacked = traces.stack(StackOptions::default()).unwrap();
    assert_eq!(stacked.returns, vec![3.0]);
    assert_eq!(stacked.next_observations.unwrap().row(0), Some([1.0].as_slice()));
}

#[test]
fn test_callback_error_propagates() {
    let results = results_with_traces();
    let mut index = RunIndex::open(results.path()).unwrap();
    let run = index.get("3").unwrap();

    let result = scan_recorded_traces(
        &run,
        &ManifestScanner::new(),
        |_| Err(Error::InvalidArgument("stop".to_string())),
        None,
    );
    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}
