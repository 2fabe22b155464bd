//! Main entry point for the harness binary
//!
//! Builds a run plan from the command line, wires up the coordinator (with
//! cloud provisioning when requested), runs one experiment, and exits 0
//! only on a clean, fully-aggregated run.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};

use harness::{
    AwsCliProvider, ClusterManager, ClusterRequest, HarnessError, HarnessResult, LogDir,
    RunCoordinator, RunPlan, SshCredentials, Timeouts,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Testbed {
    /// Run every participant on this box.
    Local,
    /// Provision EC2 machines and run the participants there.
    Aws,
}

/// Benchmark harness for distributed server/client clusters
#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Runs one end-to-end benchmark of a server/client cluster")]
struct Args {
    /// Number of server processes (N)
    #[arg(long, default_value = "3")]
    processes: u32,

    /// Fault-tolerance threshold (f); requires 2f < N
    #[arg(long, default_value = "1")]
    faults: u32,

    /// Number of shards; processes are assigned round-robin
    #[arg(long, default_value = "1")]
    shards: u32,

    /// Number of client participants
    #[arg(long, default_value = "3")]
    clients: u32,

    /// Simulated clients driven by each client participant
    #[arg(long, default_value = "1")]
    clients_per_machine: u32,

    /// Commands each simulated client issues
    #[arg(long, default_value = "100")]
    commands_per_client: u32,

    /// Server peer-connection port
    #[arg(long, default_value = "3717")]
    port: u16,

    /// Server client-facing port
    #[arg(long, default_value = "4717")]
    client_port: u16,

    /// Worker count passed through to the server binary
    #[arg(long, default_value = "1")]
    workers: u32,

    /// Executor count passed through to the server binary
    #[arg(long, default_value = "1")]
    executors: u32,

    /// Per-peer-link connection concurrency, opaque to the harness
    #[arg(long, default_value = "1")]
    multiplexing: u32,

    /// TCP buffer size in bytes passed through to the server binary
    #[arg(long, default_value = "8192")]
    tcp_buffer_size: u32,

    /// Server binary to launch (defaults to the bundled stub)
    #[arg(long, default_value = "target/debug/stubnode")]
    server_binary: PathBuf,

    /// Client binary to launch (defaults to the bundled stub)
    #[arg(long, default_value = "target/debug/stubnode")]
    client_binary: PathBuf,

    /// Where participants run
    #[arg(long, value_enum, default_value_t = Testbed::Local)]
    testbed: Testbed,

    /// AWS region (aws testbed)
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// EC2 instance type (aws testbed)
    #[arg(long, default_value = "c5.large")]
    instance_type: String,

    /// AMI to boot (aws testbed)
    #[arg(long)]
    image_id: Option<String>,

    /// EC2 key-pair name (aws testbed)
    #[arg(long)]
    key_name: Option<String>,

    /// ssh username on provisioned machines (aws testbed)
    #[arg(long, default_value = "ubuntu")]
    ssh_user: String,

    /// Private key for reaching provisioned machines (aws testbed)
    #[arg(long)]
    ssh_key: Option<PathBuf>,

    /// Directory participant logs are written to
    #[arg(long, default_value = "./logs")]
    log_dir: PathBuf,

    /// Directory run artifacts (plan + aggregate) are saved under
    #[arg(long, default_value = "./results")]
    results_dir: PathBuf,

    /// Seconds a participant gets to emit its started marker
    #[arg(long, default_value = "120")]
    start_timeout_secs: u64,

    /// Seconds the whole client workload gets to finish
    #[arg(long, default_value = "1800")]
    run_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Round-robin processes 1..=N over the requested shard count.
fn shard_assignment(processes: u32, shards: u32) -> Vec<Vec<u32>> {
    if shards <= 1 {
        return Vec::new();
    }
    let mut assignment = vec![Vec::new(); shards as usize];
    for id in 1..=processes {
        assignment[((id - 1) % shards) as usize].push(id);
    }
    assignment
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .init();

    // every failure, config-time included, surfaces as one readable line
    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Args) -> HarnessResult<i32> {
    let plan = RunPlan {
        processes: args.processes,
        faults: args.faults,
        shard_assignment: shard_assignment(args.processes, args.shards),
        client_machines: args.clients,
        clients_per_machine: args.clients_per_machine,
        commands_per_client: args.commands_per_client,
        port: args.port,
        client_port: args.client_port,
        workers: args.workers,
        executors: args.executors,
        multiplexing: args.multiplexing,
        tcp_buffer_size: args.tcp_buffer_size,
    };
    plan.validate()?;

    let timeouts = Timeouts {
        start: std::time::Duration::from_secs(args.start_timeout_secs),
        run: std::time::Duration::from_secs(args.run_timeout_secs),
    };
    let log_dir = LogDir::new(&args.log_dir)?;

    let mut coordinator = RunCoordinator::new(
        plan,
        args.server_binary,
        args.client_binary,
        log_dir,
        timeouts,
    )
    .with_results_dir(args.results_dir);

    if args.testbed == Testbed::Aws {
        let image_id = args
            .image_id
            .ok_or_else(|| HarnessError::config("--image-id is required with --testbed aws"))?;
        let key_name = args
            .key_name
            .ok_or_else(|| HarnessError::config("--key-name is required with --testbed aws"))?;
        let ssh_key = args
            .ssh_key
            .ok_or_else(|| HarnessError::config("--ssh-key is required with --testbed aws"))?;

        let provider = AwsCliProvider::new(args.region, image_id, key_name);
        let credentials = SshCredentials {
            username: args.ssh_user,
            key_path: ssh_key,
        };
        let request = ClusterRequest {
            // the coordinator sizes the cluster from the plan
            count: 0,
            instance_type: args.instance_type,
        };
        coordinator =
            coordinator.with_cloud(ClusterManager::new(provider, credentials), request);
    }

    let outcome = tokio::select! {
        result = coordinator.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(result)) => {
            info!(
                "run complete: mean latency {} over {} record(s)",
                result.mean_latency, result.count
            );
            Ok(0)
        }
        Some(Err(e)) => Err(e),
        None => {
            warn!("interrupted, tearing down");
            coordinator.abort().await;
            Ok(130)
        }
    }
}
