//! Run-plan fixtures

use harness::RunPlan;

/// The canonical small cluster: three servers tolerating one fault, three
/// client participants issuing ten commands each.
pub fn small_plan() -> RunPlan {
    RunPlan {
        processes: 3,
        faults: 1,
        shard_assignment: vec![],
        client_machines: 3,
        clients_per_machine: 1,
        commands_per_client: 10,
        port: 3717,
        client_port: 4717,
        workers: 1,
        executors: 1,
        multiplexing: 1,
        tcp_buffer_size: 8192,
    }
}
