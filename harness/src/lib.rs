//! Benchmark harness for distributed server/client clusters
//!
//! Drives one experiment end to end: derives per-participant launch
//! arguments from a declarative run plan, provisions machines when running
//! off-box, starts participants in dependency order, waits on observable
//! log markers, aggregates per-run latency metrics, and tears everything
//! down. The protocol binaries themselves are opaque collaborators reached
//! only through their CLI contract and log output.

pub mod core;
pub mod error;
pub mod services;
pub mod topology;
pub mod traits;

// Re-export commonly used types
pub use crate::core::{LogDir, Phase, RunCoordinator, Timeouts};
pub use crate::error::{HarnessError, HarnessResult};
pub use crate::services::{
    AggregateResult, AwsCliProvider, ClusterManager, ClusterRequest, ExecTarget, Machine,
    ParticipantStatus, ProcessLauncher, ReadinessBarrier, RunHandle, SshCredentials,
};
pub use crate::topology::{ClientSpec, ParticipantKind, ProcessSpec, RunPlan};
pub use crate::traits::{CloudProvider, Instance};
