//! Readiness-barrier tests
//!
//! All timing here runs against tokio's paused clock: sleeps auto-advance,
//! so even the timeout cases finish in milliseconds of wall time.

use std::time::Duration;

use assert_matches::assert_matches;
use tokio::time::Instant;

use crate::error::HarnessError;
use crate::services::barrier::ReadinessBarrier;
use crate::services::launcher::{ParticipantStatus, RunHandle};
use crate::topology::ParticipantKind;

fn started_marker(handle: &RunHandle) -> String {
    format!("process {} started", handle.id)
}

fn handles_in(dir: &tempfile::TempDir, ids: &[u32]) -> Vec<RunHandle> {
    ids.iter()
        .map(|&id| {
            RunHandle::inert(
                ParticipantKind::Server,
                id,
                &dir.path().join(format!("server_{}.log", id)),
            )
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn returns_on_first_scan_when_markers_are_present() {
    let dir = tempfile::tempdir().unwrap();
    let mut handles = handles_in(&dir, &[1, 2, 3]);
    for handle in &handles {
        std::fs::write(
            &handle.log_path,
            format!("booting\nprocess {} started\n", handle.id),
        )
        .unwrap();
    }

    let barrier = ReadinessBarrier::new(Duration::from_millis(250), Duration::from_secs(30));
    let before = Instant::now();
    barrier
        .await_all(&mut handles, started_marker, ParticipantStatus::Running)
        .await
        .unwrap();

    // no polling delay: the paused clock never had to advance
    assert_eq!(before.elapsed(), Duration::ZERO);
    for handle in &handles {
        assert_eq!(handle.status, ParticipantStatus::Running);
    }
}

#[tokio::test(start_paused = true)]
async fn names_exactly_the_unready_participant_on_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut handles = handles_in(&dir, &[1, 2, 3]);
    // participant 2 never emits its marker
    for handle in &handles {
        let contents = if handle.id == 2 {
            "booting\n".to_string()
        } else {
            format!("process {} started\n", handle.id)
        };
        std::fs::write(&handle.log_path, contents).unwrap();
    }

    let barrier = ReadinessBarrier::new(Duration::from_millis(250), Duration::from_secs(10));
    let err = barrier
        .await_all(&mut handles, started_marker, ParticipantStatus::Running)
        .await
        .unwrap_err();

    assert_matches!(err, HarnessError::Timeout { unready, waited } => {
        assert_eq!(unready, vec![2]);
        assert!(waited >= Duration::from_secs(10));
    });
    assert_eq!(handles[0].status, ParticipantStatus::Running);
    assert_eq!(handles[1].status, ParticipantStatus::Failed);
    assert_eq!(handles[2].status, ParticipantStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn repeated_markers_count_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut handles = handles_in(&dir, &[7]);
    // a restarted participant re-emitting its marker is indistinguishable
    // from a chatty one; presence is what the barrier checks
    std::fs::write(
        &handles[0].log_path,
        "process 7 started\nprocess 7 started\nprocess 7 started\n",
    )
    .unwrap();

    let barrier = ReadinessBarrier::new(Duration::from_millis(250), Duration::from_secs(5));
    barrier
        .await_all(&mut handles, started_marker, ParticipantStatus::Running)
        .await
        .unwrap();
    assert_eq!(handles[0].status, ParticipantStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn picks_up_a_marker_written_mid_wait() {
    let dir = tempfile::tempdir().unwrap();
    let mut handles = handles_in(&dir, &[1]);
    std::fs::write(&handles[0].log_path, "booting\n").unwrap();

    let log_path = handles[0].log_path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        std::fs::write(&log_path, "booting\nprocess 1 started\n").unwrap();
    });

    let barrier = ReadinessBarrier::new(Duration::from_millis(250), Duration::from_secs(30));
    barrier
        .await_all(&mut handles, started_marker, ParticipantStatus::Running)
        .await
        .unwrap();
    assert_eq!(handles[0].status, ParticipantStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn completion_barrier_marks_handles_ended() {
    let dir = tempfile::tempdir().unwrap();
    let mut handles = handles_in(&dir, &[1]);
    std::fs::write(&handles[0].log_path, "all clients ended\n").unwrap();

    let barrier = ReadinessBarrier::new(Duration::from_secs(5), Duration::from_secs(600));
    barrier
        .await_all(
            &mut handles,
            |_| "all clients ended".to_string(),
            ParticipantStatus::Ended,
        )
        .await
        .unwrap();
    assert_eq!(handles[0].status, ParticipantStatus::Ended);
}
