//! Stand-in participant binary
//!
//! Honors the server/client CLI contract the harness launches binaries
//! with, and emits the log markers the harness synchronizes on. It
//! implements no protocol: servers idle until killed, clients fabricate a
//! latency summary per simulated client. Used by the integration tests and
//! for local smoke runs.

use std::io::Write;
use std::time::Duration;

use clap::Parser;
use rand::Rng;

// most of the server contract is accepted and ignored; the stub only acts
// on the fields that drive its markers
#[allow(dead_code)]
#[derive(Parser)]
#[command(name = "stubnode")]
#[command(about = "Stand-in server/client participant emitting harness log markers")]
struct Args {
    // server mode
    #[arg(long)]
    id: Option<u32>,
    #[arg(long)]
    sorted: Option<String>,
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    addresses: Option<String>,
    #[arg(long = "client_port")]
    client_port: Option<u16>,
    #[arg(long)]
    processes: Option<u32>,
    #[arg(long)]
    faults: Option<u32>,
    #[arg(long)]
    workers: Option<u32>,
    #[arg(long)]
    executors: Option<u32>,
    #[arg(long)]
    multiplexing: Option<u32>,
    #[arg(long = "tcp_buffer_size")]
    tcp_buffer_size: Option<u32>,
    #[arg(long)]
    shards: Option<u32>,
    #[arg(long = "shard_id")]
    shard_id: Option<u32>,

    // client mode
    #[arg(long)]
    ids: Option<String>,
    #[arg(long = "commands_per_client")]
    commands_per_client: Option<u32>,
}

fn main() {
    let args = Args::parse();
    match (args.id, args.ids.as_deref()) {
        (Some(id), None) => server(id),
        (None, Some(ids)) => client(ids, args.commands_per_client.unwrap_or(0)),
        _ => {
            eprintln!("stubnode: pass --id (server mode) or --ids (client mode)");
            std::process::exit(2);
        }
    }
}

fn server(id: u32) -> ! {
    emit(format!("process {} started", id));
    // a real server runs until the harness kills it
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}

fn client(ids: &str, commands_per_client: u32) {
    let (start, end) = parse_range(ids);
    for id in start..=end {
        emit(format!("client {} started", id));
    }

    // pretend the workload takes a moment
    std::thread::sleep(Duration::from_millis(u64::from(commands_per_client).min(500)));

    let mut rng = rand::thread_rng();
    for id in start..=end {
        let samples: Vec<u64> = (0..commands_per_client.max(1))
            .map(|_| rng.gen_range(1..=50))
            .collect();
        let min = samples.iter().min().copied().unwrap_or(0);
        let max = samples.iter().max().copied().unwrap_or(0);
        let avg = samples.iter().sum::<u64>() / samples.len() as u64;
        emit(format!(
            "latency of client {}: min={} max={} avg={}",
            id, min, max, avg
        ));
    }
    emit("all clients ended".to_string());
}

fn parse_range(ids: &str) -> (u32, u32) {
    let parse = |s: &str| {
        s.parse::<u32>().unwrap_or_else(|_| {
            eprintln!("stubnode: malformed --ids range {:?}", ids);
            std::process::exit(2);
        })
    };
    match ids.split_once('-') {
        Some((start, end)) => (parse(start), parse(end)),
        None => {
            let id = parse(ids);
            (id, id)
        }
    }
}

fn emit(line: String) {
    println!("{}", line);
    // markers are read from the log file while we are still running
    let _ = std::io::stdout().flush();
}
