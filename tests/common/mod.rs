//! Shared fixtures: results directories laid out like the tracker writes them

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

/// A temporary results directory with a `_sources` marker.
pub struct ResultsDir {
    dir: TempDir,
}

impl ResultsDir {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::create_dir(dir.path().join("_sources")).expect("create _sources");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create `<base>/<key>/run.json`.
    pub fn add_run(&self, key: &str, run_json: &Value) -> PathBuf {
        let run_dir = self.path().join(key);
        fs::create_dir_all(&run_dir).expect("create run dir");
        fs::write(run_dir.join("run.json"), run_json.to_string()).expect("write run.json");
        run_dir
    }

    pub fn write(&self, key: &str, name: &str, contents: &[u8]) {
        fs::write(self.path().join(key).join(name), contents).expect("write file");
    }

    pub fn write_json(&self, key: &str, name: &str, value: &Value) {
        self.write(key, name, value.to_string().as_bytes());
    }
}

/// Minimal completed-run metadata.
pub fn run_json(name: &str, artifacts: &[&str]) -> Value {
    json!({
        "experiment": {
            "name": name,
            "base_dir": "/src/experiments",
            "mainfile": "train.py"
        },
        "meta": { "command": "main", "options": { "--name": null } },
        "status": "COMPLETED",
        "start_time": "2020-01-01T00:00:00.000000",
        "stop_time": "2020-01-01T00:00:10.500000",
        "artifacts": artifacts
    })
}
