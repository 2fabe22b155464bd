//! Helpers for wiring coordinators against the bundled stub participant

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use harness::{AwsCliProvider, LogDir, RunCoordinator, RunPlan, Timeouts};

/// The stub participant binary cargo built alongside the tests.
pub fn stubnode() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_stubnode"))
}

/// Temp directories one run writes into; dropped with the test.
pub struct RunDirs {
    pub logs: TempDir,
    pub results: TempDir,
}

impl RunDirs {
    pub fn new() -> Self {
        Self {
            logs: tempfile::tempdir().unwrap(),
            results: tempfile::tempdir().unwrap(),
        }
    }
}

/// A local coordinator over the given binaries with tight test deadlines.
pub fn local_coordinator(
    plan: RunPlan,
    server_binary: PathBuf,
    client_binary: PathBuf,
    start_timeout: Duration,
    dirs: &RunDirs,
) -> RunCoordinator<AwsCliProvider> {
    RunCoordinator::new(
        plan,
        server_binary,
        client_binary,
        LogDir::new(dirs.logs.path()).unwrap(),
        Timeouts {
            start: start_timeout,
            run: Duration::from_secs(60),
        },
    )
    .with_results_dir(dirs.results.path().to_path_buf())
}
