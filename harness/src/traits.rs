//! Trait definitions with mockall annotations for testing
//!
//! The cloud-provider seam is the one place the harness touches
//! infrastructure it cannot control in tests, so it is abstracted behind a
//! trait and mocked in the cluster-lifecycle tests (in particular the
//! provision/teardown pairing property under injected failures).

use async_trait::async_trait;

use crate::error::HarnessResult;

/// A provisioned cloud instance, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// Provider-assigned instance id, used for termination.
    pub id: String,
    /// Address the harness reaches the machine on.
    pub public_ip: String,
}

/// Cloud provisioning abstraction.
///
/// Implementations create and terminate raw machines and own their region;
/// retry policy and teardown bookkeeping live in the cluster lifecycle
/// manager, not here.
#[mockall::automock]
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Request a single instance. Transient failures (capacity, slow boot)
    /// surface as errors here and are retried by the caller.
    async fn create_instance(&self, instance_type: &str) -> HarnessResult<Instance>;

    /// Terminate a previously created instance.
    async fn terminate_instance(&self, id: &str) -> HarnessResult<()>;
}
