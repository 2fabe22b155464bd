//! Metric aggregation
//!
//! Scans the union of client logs for latency summary lines and computes
//! the run's aggregate statistic. The only contract with the client binary
//! is textual: a line containing `latency` with an `avg=<int>` field.

use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::error::{HarnessError, HarnessResult};

const LATENCY_MARKER: &str = "latency";
const AVG_FIELD: &str = "avg=";

/// Aggregate statistic for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    /// Floor of the arithmetic mean across every matched latency record.
    pub mean_latency: u64,
    /// Latency records consumed across all client logs.
    pub count: usize,
    /// Logs skipped because a matching line had a malformed numeric field.
    /// Non-zero means the mean is partial.
    pub skipped_logs: usize,
}

/// Extract every `avg=<int>` latency record from one log. Strict: a line
/// carrying the latency marker with a malformed numeric field is a
/// ParseError.
pub fn scan_log(contents: &str) -> HarnessResult<Vec<u64>> {
    let mut records = Vec::new();
    for line in contents.lines() {
        if !line.contains(LATENCY_MARKER) {
            continue;
        }
        let Some(at) = line.find(AVG_FIELD) else {
            continue;
        };
        let field = &line[at + AVG_FIELD.len()..];
        let digits: &str = match field.find(|c: char| !c.is_ascii_digit()) {
            Some(end) => &field[..end],
            None => field,
        };
        let value = digits.parse::<u64>().map_err(|_| HarnessError::Parse {
            line: line.to_string(),
            reason: format!("expected an integer after {:?}", AVG_FIELD),
        })?;
        records.push(value);
    }
    Ok(records)
}

/// Aggregate latency records across all client logs.
///
/// A log that fails to parse is skipped with a warning and counted in
/// `skipped_logs` so partial metrics never abort a finished run. Zero
/// matching lines across every log is NoData, never a numeric zero.
pub async fn aggregate(logs: &[PathBuf]) -> HarnessResult<AggregateResult> {
    let mut records: Vec<u64> = Vec::new();
    let mut skipped_logs = 0;

    for log in logs {
        let contents = tokio::fs::read_to_string(log).await?;
        match scan_log(&contents) {
            Ok(found) => records.extend(found),
            Err(e) => {
                warn!("skipping {}: {}", log.display(), e);
                skipped_logs += 1;
            }
        }
    }

    if records.is_empty() {
        return Err(HarnessError::NoData);
    }

    let sum: u128 = records.iter().map(|&v| v as u128).sum();
    let mean_latency = (sum / records.len() as u128) as u64;
    Ok(AggregateResult {
        mean_latency,
        count: records.len(),
        skipped_logs,
    })
}
