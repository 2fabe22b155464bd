//! Service implementations
//!
//! Real implementations of the harness services: participant launching,
//! the readiness barrier, metric aggregation, and cluster lifecycle.

pub mod barrier;
pub mod cluster;
pub mod launcher;
pub mod metrics;
pub mod provider;

#[cfg(test)]
mod tests;

// Re-export the commonly used service types
pub use barrier::ReadinessBarrier;
pub use cluster::{ClusterManager, ClusterRequest, Machine, SshCredentials};
pub use launcher::{ExecTarget, ParticipantStatus, ProcessLauncher, RunHandle};
pub use metrics::AggregateResult;
pub use provider::AwsCliProvider;
