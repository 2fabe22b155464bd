//! Run coordination
//!
//! Sequences one experiment end to end: configure, launch servers, await
//! readiness, launch clients, await readiness, await completion, aggregate,
//! tear down. Control flow is single-threaded and strictly phased; the
//! readiness barrier is the sole synchronization primitive. Teardown is
//! unconditional: a failure in any phase still reclaims every provisioned
//! machine before the error is surfaced.

use std::fmt;
use std::path::PathBuf;

use futures_util::future::join_all;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::core::logs::LogDir;
use crate::error::HarnessResult;
use crate::services::{
    AggregateResult, ClusterManager, ClusterRequest, ExecTarget, ParticipantStatus,
    ProcessLauncher, ReadinessBarrier, RunHandle, metrics,
};
use crate::topology::{self, ClientSpec, ParticipantKind, ProcessSpec, RunPlan};
use crate::traits::CloudProvider;

/// Startup barriers poll sub-second; the completion barrier covers a
/// multi-minute workload and polls coarsely.
const STARTUP_POLL: Duration = Duration::from_millis(250);
const COMPLETION_POLL: Duration = Duration::from_secs(5);

/// Phases of one run. Transitions are strictly forward; `Failed` is
/// reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Configuring,
    LaunchingServers,
    AwaitingServersReady,
    LaunchingClients,
    AwaitingClientsReady,
    AwaitingClientsEnded,
    Aggregating,
    TearingDown,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Configuring => "configuring",
            Phase::LaunchingServers => "launching servers",
            Phase::AwaitingServersReady => "awaiting servers ready",
            Phase::LaunchingClients => "launching clients",
            Phase::AwaitingClientsReady => "awaiting clients ready",
            Phase::AwaitingClientsEnded => "awaiting clients ended",
            Phase::Aggregating => "aggregating",
            Phase::TearingDown => "tearing down",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Barrier deadlines for the two kinds of awaiting phase.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Deadline for a participant to emit its started marker.
    pub start: Duration,
    /// Deadline for the whole client workload to finish.
    pub run: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(120),
            run: Duration::from_secs(1800),
        }
    }
}

/// Coordinates one benchmark run. Owns all specs and handles for the
/// duration of the run; nothing is retained across runs.
pub struct RunCoordinator<P: CloudProvider> {
    plan: RunPlan,
    server_binary: PathBuf,
    client_binary: PathBuf,
    log_dir: LogDir,
    results_dir: Option<PathBuf>,
    timeouts: Timeouts,
    cloud: Option<(ClusterManager<P>, ClusterRequest)>,
    phase: Phase,
}

impl<P: CloudProvider> RunCoordinator<P> {
    pub fn new(
        plan: RunPlan,
        server_binary: PathBuf,
        client_binary: PathBuf,
        log_dir: LogDir,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            plan,
            server_binary,
            client_binary,
            log_dir,
            results_dir: None,
            timeouts,
            cloud: None,
            phase: Phase::Idle,
        }
    }

    /// Run on provisioned cloud machines instead of the local box.
    pub fn with_cloud(mut self, cluster: ClusterManager<P>, request: ClusterRequest) -> Self {
        self.cloud = Some((cluster, request));
        self
    }

    /// Persist the run plan and the aggregate result under a timestamped
    /// directory inside `results_dir`.
    pub fn with_results_dir(mut self, results_dir: PathBuf) -> Self {
        self.results_dir = Some(results_dir);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Drive one experiment to completion. Teardown runs whether the
    /// experiment succeeded or not.
    pub async fn run(&mut self) -> HarnessResult<AggregateResult> {
        let mut participants: Vec<RunHandle> = Vec::new();
        let outcome = self.execute(&mut participants).await;

        if let Err(ref e) = outcome {
            let failed_while = self.phase;
            self.transition(Phase::Failed);
            error!("run failed while {}: {}", failed_while, e);
        } else {
            self.transition(Phase::TearingDown);
        }

        for handle in &mut participants {
            handle.reap().await;
        }
        if let Some((cluster, _)) = self.cloud.as_mut() {
            // leaks are logged inside teardown; they never mask the outcome
            let _ = cluster.teardown().await;
        }

        let result = outcome?;
        self.transition(Phase::Done);
        Ok(result)
    }

    /// Tear down without finishing the run (operator interrupt).
    pub async fn abort(&mut self) {
        self.transition(Phase::TearingDown);
        if let Some((cluster, _)) = self.cloud.as_mut() {
            let _ = cluster.teardown().await;
        }
        self.transition(Phase::Failed);
    }

    async fn execute(
        &mut self,
        participants: &mut Vec<RunHandle>,
    ) -> HarnessResult<AggregateResult> {
        self.transition(Phase::Configuring);
        let (server_hosts, server_targets, client_targets) = self.prepare_targets().await?;
        let specs = topology::process_specs(&self.plan, &server_hosts)?;
        let clients = topology::client_specs(&self.plan, &server_hosts);

        self.transition(Phase::LaunchingServers);
        let server_count = specs.len();
        self.launch_servers(&specs, &server_targets, participants)
            .await?;

        self.transition(Phase::AwaitingServersReady);
        let startup = ReadinessBarrier::new(STARTUP_POLL, self.timeouts.start);
        startup
            .await_all(
                &mut participants[..server_count],
                |h| format!("process {} started", h.id),
                ParticipantStatus::Running,
            )
            .await?;

        self.transition(Phase::LaunchingClients);
        self.launch_clients(&clients, &client_targets, participants)
            .await?;

        self.transition(Phase::AwaitingClientsReady);
        startup
            .await_all(
                &mut participants[server_count..],
                |h| {
                    // the highest simulated id in the participant's range
                    // starts last, so its marker signals the whole range
                    let spec = &clients[h.id as usize - 1];
                    format!("client {} started", spec.id_end)
                },
                ParticipantStatus::Running,
            )
            .await?;

        self.transition(Phase::AwaitingClientsEnded);
        let completion = ReadinessBarrier::new(COMPLETION_POLL, self.timeouts.run);
        completion
            .await_all(
                &mut participants[server_count..],
                |_| "all clients ended".to_string(),
                ParticipantStatus::Ended,
            )
            .await?;

        self.transition(Phase::Aggregating);
        let logs: Vec<PathBuf> = clients
            .iter()
            .map(|c| self.log_dir.path(ParticipantKind::Client, c.id))
            .collect();
        let result = metrics::aggregate(&logs).await?;
        if result.skipped_logs > 0 {
            warn!(
                "aggregate is partial: {} client log(s) skipped",
                result.skipped_logs
            );
        }
        info!(
            "mean latency {} over {} client record(s)",
            result.mean_latency, result.count
        );

        if let Some(results_dir) = self.results_dir.clone() {
            self.save_results(&results_dir, &result)?;
        }
        Ok(result)
    }

    /// Provision machines when running off-box and hand out one execution
    /// target per participant; local runs target the local box everywhere.
    async fn prepare_targets(
        &mut self,
    ) -> HarnessResult<(Vec<String>, Vec<ExecTarget>, Vec<ExecTarget>)> {
        let n = self.plan.processes as usize;
        let c = self.plan.client_machines as usize;

        match self.cloud.as_mut() {
            None => {
                let hosts = vec!["127.0.0.1".to_string(); n];
                Ok((
                    hosts,
                    vec![ExecTarget::Local; n],
                    vec![ExecTarget::Local; c],
                ))
            }
            Some((cluster, request)) => {
                let request = ClusterRequest {
                    count: (n + c) as u32,
                    ..request.clone()
                };
                cluster.provision(&request).await?;
                let machines = cluster.machines();
                let hosts = machines[..n]
                    .iter()
                    .map(|m| m.public_ip.clone())
                    .collect();
                let server_targets = machines[..n]
                    .iter()
                    .map(|m| ExecTarget::Remote(m.clone()))
                    .collect();
                let client_targets = machines[n..n + c]
                    .iter()
                    .map(|m| ExecTarget::Remote(m.clone()))
                    .collect();
                Ok((hosts, server_targets, client_targets))
            }
        }
    }

    async fn launch_servers(
        &self,
        specs: &[ProcessSpec],
        targets: &[ExecTarget],
        participants: &mut Vec<RunHandle>,
    ) -> HarnessResult<()> {
        let spawns = specs.iter().zip(targets).map(|(spec, target)| {
            let binary = self.server_binary.clone();
            let args = spec.to_args();
            let log_path = self.log_dir.path(ParticipantKind::Server, spec.id);
            let id = spec.id;
            async move {
                ProcessLauncher::spawn(
                    &binary,
                    &args,
                    ParticipantKind::Server,
                    id,
                    &log_path,
                    target,
                )
                .await
            }
        });
        for handle in join_all(spawns).await {
            participants.push(handle?);
        }
        Ok(())
    }

    async fn launch_clients(
        &self,
        clients: &[ClientSpec],
        targets: &[ExecTarget],
        participants: &mut Vec<RunHandle>,
    ) -> HarnessResult<()> {
        let spawns = clients.iter().zip(targets).map(|(spec, target)| {
            let binary = self.client_binary.clone();
            let args = spec.to_args();
            let log_path = self.log_dir.path(ParticipantKind::Client, spec.id);
            let id = spec.id;
            async move {
                ProcessLauncher::spawn(
                    &binary,
                    &args,
                    ParticipantKind::Client,
                    id,
                    &log_path,
                    target,
                )
                .await
            }
        });
        for handle in join_all(spawns).await {
            participants.push(handle?);
        }
        Ok(())
    }

    fn save_results(&self, results_dir: &PathBuf, result: &AggregateResult) -> HarnessResult<()> {
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let run_dir = results_dir.join(timestamp.to_string());
        std::fs::create_dir_all(&run_dir)?;

        let plan_file = std::fs::File::create(run_dir.join("run_plan.json"))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(plan_file), &self.plan)?;
        let result_file = std::fs::File::create(run_dir.join("aggregate.json"))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(result_file), result)?;

        info!("run artifacts saved in {}", run_dir.display());
        Ok(())
    }

    fn transition(&mut self, next: Phase) {
        info!("phase: {} -> {}", self.phase, next);
        self.phase = next;
    }
}
