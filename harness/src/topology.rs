//! Topology configuration
//!
//! Pure derivation of per-participant launch arguments from a declarative
//! run plan. No side effects here: the coordinator decides which hosts the
//! participants land on and this module turns that into ordered
//! [`ProcessSpec`]/[`ClientSpec`] lists plus their CLI argument encodings.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

pub type ProcessId = u32;
pub type ShardId = u32;

/// The two kinds of participant the harness launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantKind {
    Server,
    Client,
}

impl fmt::Display for ParticipantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantKind::Server => write!(f, "server"),
            ParticipantKind::Client => write!(f, "client"),
        }
    }
}

/// Declarative description of one benchmark run.
///
/// Everything a run needs that is independent of where participants are
/// placed. Serialized as JSON into the results directory so a run can be
/// identified later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPlan {
    /// Number of server processes (N).
    pub processes: u32,
    /// Fault-tolerance threshold (f); quorums require 2f < N.
    pub faults: u32,
    /// Process ids per shard, indexed by shard id. Empty means a single
    /// shard containing all processes.
    pub shard_assignment: Vec<Vec<ProcessId>>,
    /// Number of client participants.
    pub client_machines: u32,
    /// Simulated clients driven by each client participant.
    pub clients_per_machine: u32,
    /// Commands each simulated client issues.
    pub commands_per_client: u32,
    /// Port servers listen on for peer connections.
    pub port: u16,
    /// Port servers listen on for client connections.
    pub client_port: u16,
    /// Concurrency knobs, opaque to the harness.
    pub workers: u32,
    pub executors: u32,
    pub multiplexing: u32,
    pub tcp_buffer_size: u32,
}

impl RunPlan {
    /// Number of shards in this plan.
    pub fn shards(&self) -> u32 {
        if self.shard_assignment.is_empty() {
            1
        } else {
            self.shard_assignment.len() as u32
        }
    }

    /// Validate quorum viability and shard-assignment consistency.
    pub fn validate(&self) -> HarnessResult<()> {
        if self.processes == 0 {
            return Err(HarnessError::config("at least one process is required"));
        }
        // widen before doubling so an enormous f cannot overflow u32
        if 2 * u64::from(self.faults) >= u64::from(self.processes) {
            return Err(HarnessError::config(format!(
                "no viable quorum: 2f = {} must be smaller than N = {}",
                2 * u64::from(self.faults),
                self.processes
            )));
        }
        let mut assigned = HashSet::new();
        for (shard_id, members) in self.shard_assignment.iter().enumerate() {
            let mut in_shard = HashSet::new();
            for &id in members {
                if !in_shard.insert(id) {
                    return Err(HarnessError::config(format!(
                        "duplicate process id {} in shard {}",
                        id, shard_id
                    )));
                }
                if !assigned.insert(id) {
                    return Err(HarnessError::config(format!(
                        "process id {} assigned to more than one shard",
                        id
                    )));
                }
                if id == 0 || id > self.processes {
                    return Err(HarnessError::config(format!(
                        "process id {} in shard {} outside 1..={}",
                        id, shard_id, self.processes
                    )));
                }
            }
        }
        if !self.shard_assignment.is_empty() && assigned.len() != self.processes as usize {
            return Err(HarnessError::config(format!(
                "shard assignment covers {} of {} processes",
                assigned.len(),
                self.processes
            )));
        }
        Ok(())
    }

    /// Shard served by each process, indexed by `process id - 1`.
    fn shard_of(&self) -> Vec<ShardId> {
        let mut shard_of = vec![0; self.processes as usize];
        for (shard_id, members) in self.shard_assignment.iter().enumerate() {
            for &id in members {
                shard_of[id as usize - 1] = shard_id as ShardId;
            }
        }
        shard_of
    }
}

/// Launch description for one server process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub id: ProcessId,
    pub shard_id: ShardId,
    /// Host this process binds on.
    pub host: String,
    pub port: u16,
    pub client_port: u16,
    /// Peer addresses keyed by (peer id, peer shard) in ascending order.
    /// The composite key lets one physical id serve several shards.
    pub peers: BTreeMap<(ProcessId, ShardId), String>,
    pub processes: u32,
    pub faults: u32,
    pub shards: u32,
    pub workers: u32,
    pub executors: u32,
    pub multiplexing: u32,
    pub tcp_buffer_size: u32,
}

impl ProcessSpec {
    /// Encode this spec as the server binary's CLI arguments.
    pub fn to_args(&self) -> Vec<String> {
        let sorted = std::iter::once(self.sorted_entry(self.id, self.shard_id))
            .chain(
                self.peers
                    .keys()
                    .map(|&(id, shard)| self.sorted_entry(id, shard)),
            )
            .collect::<Vec<_>>()
            .join(",");
        let addresses = self
            .peers
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");

        let mut args = vec![
            "--id".to_string(),
            self.id.to_string(),
            "--sorted".to_string(),
            sorted,
            "--port".to_string(),
            self.port.to_string(),
            "--addresses".to_string(),
            addresses,
            "--client_port".to_string(),
            self.client_port.to_string(),
            "--processes".to_string(),
            self.processes.to_string(),
            "--faults".to_string(),
            self.faults.to_string(),
            "--workers".to_string(),
            self.workers.to_string(),
            "--executors".to_string(),
            self.executors.to_string(),
            "--multiplexing".to_string(),
            self.multiplexing.to_string(),
            "--tcp_buffer_size".to_string(),
            self.tcp_buffer_size.to_string(),
        ];
        if self.shards > 1 {
            args.push("--shards".to_string());
            args.push(self.shards.to_string());
            args.push("--shard_id".to_string());
            args.push(self.shard_id.to_string());
        }
        args
    }

    fn sorted_entry(&self, id: ProcessId, shard: ShardId) -> String {
        if self.shards > 1 {
            format!("{}-{}", id, shard)
        } else {
            id.to_string()
        }
    }
}

/// Launch description for one client participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSpec {
    pub id: u32,
    /// Server client-facing addresses this participant targets.
    pub addresses: Vec<String>,
    /// Inclusive simulated-client id range.
    pub id_start: u32,
    pub id_end: u32,
    pub commands_per_client: u32,
}

impl ClientSpec {
    /// Encode this spec as the client binary's CLI arguments.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            "--ids".to_string(),
            format!("{}-{}", self.id_start, self.id_end),
            "--addresses".to_string(),
            self.addresses.join(","),
            "--commands_per_client".to_string(),
            self.commands_per_client.to_string(),
        ]
    }
}

/// Derive the ordered server specs for `plan`, with process i placed on
/// `hosts[i - 1]`. Deterministic given the same inputs.
pub fn process_specs(plan: &RunPlan, hosts: &[String]) -> HarnessResult<Vec<ProcessSpec>> {
    plan.validate()?;
    if hosts.len() != plan.processes as usize {
        return Err(HarnessError::config(format!(
            "{} hosts provided for {} processes",
            hosts.len(),
            plan.processes
        )));
    }

    let shard_of = plan.shard_of();
    let specs = (1..=plan.processes)
        .map(|id| {
            let peers = (1..=plan.processes)
                .filter(|&peer| peer != id)
                .map(|peer| {
                    let key = (peer, shard_of[peer as usize - 1]);
                    let address = format!("{}:{}", hosts[peer as usize - 1], plan.port);
                    (key, address)
                })
                .collect();
            ProcessSpec {
                id,
                shard_id: shard_of[id as usize - 1],
                host: hosts[id as usize - 1].clone(),
                port: plan.port,
                client_port: plan.client_port,
                peers,
                processes: plan.processes,
                faults: plan.faults,
                shards: plan.shards(),
                workers: plan.workers,
                executors: plan.executors,
                multiplexing: plan.multiplexing,
                tcp_buffer_size: plan.tcp_buffer_size,
            }
        })
        .collect();
    Ok(specs)
}

/// Derive the ordered client specs for `plan`. Every client participant
/// targets all server client-facing addresses.
pub fn client_specs(plan: &RunPlan, server_hosts: &[String]) -> Vec<ClientSpec> {
    let addresses: Vec<String> = server_hosts
        .iter()
        .map(|host| format!("{}:{}", host, plan.client_port))
        .collect();
    (1..=plan.client_machines)
        .map(|id| {
            // id range formula: the end is id * clients_per_machine, the
            // start reaches back one machine's worth plus one.
            let id_end = id * plan.clients_per_machine;
            let id_start = id_end - plan.clients_per_machine + 1;
            ClientSpec {
                id,
                addresses: addresses.clone(),
                id_start,
                id_end,
                commands_per_client: plan.commands_per_client,
            }
        })
        .collect()
}
