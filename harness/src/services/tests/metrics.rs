//! Metric-aggregator tests

use std::path::PathBuf;

use assert_matches::assert_matches;

use crate::error::HarnessError;
use crate::services::metrics::{aggregate, scan_log};

fn write_logs(dir: &tempfile::TempDir, contents: &[&str]) -> Vec<PathBuf> {
    contents
        .iter()
        .enumerate()
        .map(|(index, contents)| {
            let path = dir.path().join(format!("client_{}.log", index + 1));
            std::fs::write(&path, contents).unwrap();
            path
        })
        .collect()
}

#[test]
fn scans_every_latency_record() {
    let log = "client 1 started\n\
               latency of client 1: min=2 max=80 avg=41\n\
               latency of client 2: min=1 max=60 avg=17\n\
               all clients ended\n";
    assert_eq!(scan_log(log).unwrap(), vec![41, 17]);
}

#[test]
fn ignores_latency_lines_without_an_avg_field() {
    let log = "latency histogram follows\nlatency of client 1: avg=9\n";
    assert_eq!(scan_log(log).unwrap(), vec![9]);
}

#[test]
fn tolerates_trailing_units_after_the_integer() {
    assert_eq!(scan_log("latency summary avg=12ms p99=80ms\n").unwrap(), vec![12]);
}

#[test]
fn rejects_a_malformed_numeric_field() {
    let err = scan_log("latency of client 1: avg=fast\n").unwrap_err();
    assert_matches!(err, HarnessError::Parse { line, .. } => {
        assert!(line.contains("avg=fast"));
    });
}

#[tokio::test]
async fn means_across_logs_with_distracting_lines() {
    let dir = tempfile::tempdir().unwrap();
    let logs = write_logs(
        &dir,
        &[
            "latency histogram follows\nlatency of client 1: avg=100\n",
            "latency of client 2: avg=200\nmeasuring latency now\n",
            "latency of client 3: avg=300\n",
        ],
    );
    let result = aggregate(&logs).await.unwrap();
    assert_eq!(result.mean_latency, 200);
    assert_eq!(result.count, 3);
    assert_eq!(result.skipped_logs, 0);
}

#[tokio::test]
async fn mean_is_floored() {
    let dir = tempfile::tempdir().unwrap();
    let logs = write_logs(&dir, &["latency avg=1\n", "latency avg=2\n"]);
    let result = aggregate(&logs).await.unwrap();
    assert_eq!(result.mean_latency, 1);
    assert_eq!(result.count, 2);
}

#[tokio::test]
async fn zero_matches_is_no_data_not_zero() {
    let dir = tempfile::tempdir().unwrap();
    let logs = write_logs(&dir, &["client 1 started\nall clients ended\n", ""]);
    let err = aggregate(&logs).await.unwrap_err();
    assert_matches!(err, HarnessError::NoData);
}

#[tokio::test]
async fn a_malformed_log_is_skipped_with_partial_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let logs = write_logs(
        &dir,
        &[
            "latency avg=100\n",
            "latency avg=oops\n",
            "latency avg=300\n",
        ],
    );
    let result = aggregate(&logs).await.unwrap();
    assert_eq!(result.mean_latency, 200);
    assert_eq!(result.count, 2);
    assert_eq!(result.skipped_logs, 1);
}
