//! End-to-end integration tests
//!
//! Full runs against the bundled `stubnode` participant, plus the
//! cloud-path cleanup guarantee against a mocked provider.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;

use harness::traits::{Instance, MockCloudProvider};
use harness::{
    ClusterManager, ClusterRequest, HarnessError, LogDir, Phase, RunCoordinator, SshCredentials,
    Timeouts,
};

use common::fixtures::small_plan;
use common::helpers::{local_coordinator, stubnode, RunDirs};

#[tokio::test]
async fn end_to_end_local_run_aggregates_every_client() {
    let dirs = RunDirs::new();
    let mut coordinator = local_coordinator(
        small_plan(),
        stubnode(),
        stubnode(),
        Duration::from_secs(30),
        &dirs,
    );

    let result = coordinator.run().await.unwrap();
    assert_eq!(coordinator.phase(), Phase::Done);

    // one latency record per client participant, means inside the stub's
    // simulated 1..=50 range
    assert_eq!(result.count, 3);
    assert_eq!(result.skipped_logs, 0);
    assert!((1..=50).contains(&result.mean_latency));

    // run artifacts land in a single timestamped directory
    let runs: Vec<_> = std::fs::read_dir(dirs.results.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("run_plan.json").exists());
    assert!(runs[0].join("aggregate.json").exists());

    // every participant logged into the explicit mapping
    for id in 1..=3 {
        assert!(dirs.logs.path().join(format!("server_{}.log", id)).exists());
        assert!(dirs.logs.path().join(format!("client_{}.log", id)).exists());
    }
}

#[tokio::test]
async fn servers_that_never_start_fail_the_run_with_a_timeout() {
    let dirs = RunDirs::new();
    // /bin/sleep rejects the server CLI contract and exits silently, so no
    // started marker ever appears
    let mut coordinator = local_coordinator(
        small_plan(),
        "/bin/sleep".into(),
        stubnode(),
        Duration::from_secs(2),
        &dirs,
    );

    let err = coordinator.run().await.unwrap_err();
    assert_eq!(coordinator.phase(), Phase::Failed);
    assert_matches!(err, HarnessError::Timeout { unready, .. } => {
        assert_eq!(unready, vec![1, 2, 3]);
    });
}

#[tokio::test]
async fn every_provisioned_machine_is_torn_down_when_a_later_phase_fails() {
    let plan = small_plan();
    let machine_count = plan.processes + plan.client_machines;

    let mut provider = MockCloudProvider::new();
    let counter = Arc::new(AtomicU32::new(0));
    let calls = counter.clone();
    provider
        .expect_create_instance()
        .times(machine_count as usize)
        .returning(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(Instance {
                id: format!("i-{:04}", n),
                public_ip: "127.0.0.1".to_string(),
            })
        });
    // the exactly-once guarantee under fault injection: one termination
    // per provisioned machine even though launching fails
    provider
        .expect_terminate_instance()
        .times(machine_count as usize)
        .returning(|_| Ok(()));

    let dirs = RunDirs::new();
    let cluster = ClusterManager::new(
        provider,
        SshCredentials {
            username: "ubuntu".to_string(),
            key_path: "/tmp/key.pem".into(),
        },
    );
    let request = ClusterRequest {
        count: 0,
        instance_type: "c5.large".to_string(),
    };

    // a server binary that does not exist makes the launch phase fail
    // right after provisioning succeeded
    let mut coordinator = RunCoordinator::new(
        plan,
        "/does/not/exist".into(),
        stubnode(),
        LogDir::new(dirs.logs.path()).unwrap(),
        Timeouts {
            start: Duration::from_secs(5),
            run: Duration::from_secs(5),
        },
    )
    .with_cloud(cluster, request);

    assert!(coordinator.run().await.is_err());
    assert_eq!(coordinator.phase(), Phase::Failed);
    // mock expectations verify the teardown pairing on drop
}

#[test]
fn a_nonviable_plan_exits_with_a_readable_cause() {
    // 2f >= N must be reported through the logging pipeline, not as a
    // Debug-printed error escaping main
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_harness"))
        .args(["--processes", "2", "--faults", "1"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(combined.contains("no viable quorum"));
    assert!(!combined.contains("Config {"));
}

#[tokio::test]
async fn stubnode_honors_the_client_cli_contract() {
    let output = std::process::Command::new(stubnode())
        .args([
            "--ids",
            "1-2",
            "--addresses",
            "127.0.0.1:4717",
            "--commands_per_client",
            "5",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("client 1 started"));
    assert!(stdout.contains("client 2 started"));
    assert!(stdout.contains("all clients ended"));
    assert_eq!(stdout.matches("avg=").count(), 2);
}
