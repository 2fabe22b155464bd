//! Readiness barrier
//!
//! Blocks the coordinator (never the participants) until every handed-in
//! participant's log contains its expected marker, or a timeout elapses.
//! Each poll re-scans the log from the start and checks for presence, so a
//! participant re-emitting its marker counts once and repeated markers are
//! harmless.

use tokio::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::{HarnessError, HarnessResult};
use crate::services::launcher::{ParticipantStatus, RunHandle};

/// One barrier instance. Distinct call sites choose different poll
/// intervals: sub-second for startup barriers, coarser for the multi-minute
/// completion barrier, trading latency for scan overhead.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessBarrier {
    poll_interval: Duration,
    timeout: Duration,
}

impl ReadinessBarrier {
    pub fn new(poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            poll_interval,
            timeout,
        }
    }

    /// Wait until every handle's log contains the marker `marker_for`
    /// assigns to it. Satisfied handles move to `on_ready`; unsatisfied
    /// handles at the deadline move to `Failed` and are named in the
    /// returned timeout error. Returns on the first scan when every marker
    /// is already present.
    pub async fn await_all(
        &self,
        handles: &mut [RunHandle],
        marker_for: impl Fn(&RunHandle) -> String,
        on_ready: ParticipantStatus,
    ) -> HarnessResult<()> {
        let markers: Vec<String> = handles.iter().map(&marker_for).collect();
        let mut pending: Vec<usize> = (0..handles.len()).collect();
        let start = Instant::now();

        loop {
            let mut still_pending = Vec::with_capacity(pending.len());
            for index in pending {
                let handle = &mut handles[index];
                if Self::log_contains(handle, &markers[index]).await {
                    debug!("{} {} reached {:?}", handle.kind, handle.id, on_ready);
                    handle.status = on_ready;
                } else {
                    still_pending.push(index);
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                return Ok(());
            }
            if start.elapsed() >= self.timeout {
                let mut unready = Vec::with_capacity(pending.len());
                for index in pending {
                    handles[index].status = ParticipantStatus::Failed;
                    unready.push(handles[index].id);
                }
                return Err(HarnessError::Timeout {
                    unready,
                    waited: start.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn log_contains(handle: &RunHandle, marker: &str) -> bool {
        // a log that does not exist yet simply has not gained its marker
        let contents = tokio::fs::read_to_string(&handle.log_path)
            .await
            .unwrap_or_default();
        trace!(
            "scanned {} ({} bytes) for {:?}",
            handle.log_path.display(),
            contents.len(),
            marker
        );
        contents.contains(marker)
    }
}
