//! Cluster lifecycle management
//!
//! Provisions and tears down the remote machines a run executes on, and
//! exposes the uniform remote-execution capability (run a command, copy a
//! file) the launcher builds on. Local runs never construct one of these.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, HarnessResult};
use crate::traits::{CloudProvider, Instance};

/// Provisioning retry bounds: transient capacity/boot failures are retried
/// with doubling back-off before becoming a ProvisionError.
const MAX_PROVISION_ATTEMPTS: u32 = 4;
const PROVISION_BACKOFF: Duration = Duration::from_secs(2);

/// Credentials for reaching provisioned machines over ssh.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub username: String,
    pub key_path: PathBuf,
}

/// What to provision for one run. The region lives with the provider, so
/// creation and termination cannot disagree on it.
#[derive(Debug, Clone)]
pub struct ClusterRequest {
    pub count: u32,
    pub instance_type: String,
}

/// One provisioned machine: an address plus the remote-execution capability.
#[derive(Debug, Clone)]
pub struct Machine {
    pub instance_id: String,
    pub public_ip: String,
    credentials: SshCredentials,
}

impl Machine {
    pub fn new(instance: Instance, credentials: SshCredentials) -> Self {
        Self {
            instance_id: instance.id,
            public_ip: instance.public_ip,
            credentials,
        }
    }

    /// Build a local `ssh` command that runs `command` on this machine.
    /// The caller decides what to do with its stdio; the launcher redirects
    /// it into the participant's log file.
    pub fn prepare_command(&self, command: &str) -> tokio::process::Command {
        let ssh = format!(
            "ssh -o StrictHostKeyChecking=no {}@{} -i {} \"{}\"",
            self.credentials.username,
            self.public_ip,
            self.credentials.key_path.display(),
            command
        );
        debug!("{}", ssh);
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(ssh);
        cmd
    }

    /// Run `command` on this machine and return its trimmed stdout.
    pub async fn run(&self, command: &str) -> HarnessResult<String> {
        let out = self
            .prepare_command(command)
            .stdin(Stdio::null())
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Copy a local file onto this machine.
    pub async fn copy(&self, local: &Path, remote: &str) -> HarnessResult<()> {
        let scp = format!(
            "scp -o StrictHostKeyChecking=no -i {} {} {}@{}:{}",
            self.credentials.key_path.display(),
            local.display(),
            self.credentials.username,
            self.public_ip,
            remote
        );
        debug!("{}", scp);
        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&scp)
            .stdin(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(HarnessError::Io(std::io::Error::other(format!(
                "scp to {} exited with {}",
                self.public_ip, status
            ))));
        }
        Ok(())
    }
}

/// Owns every machine provisioned for one run and guarantees each one is
/// terminated exactly once, even when a later phase fails.
pub struct ClusterManager<P: CloudProvider> {
    provider: P,
    credentials: SshCredentials,
    machines: Vec<Machine>,
    terminated: HashSet<String>,
}

impl<P: CloudProvider> ClusterManager<P> {
    pub fn new(provider: P, credentials: SshCredentials) -> Self {
        Self {
            provider,
            credentials,
            machines: Vec::new(),
            terminated: HashSet::new(),
        }
    }

    /// Machines provisioned so far, in request order.
    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Provision `request.count` machines, retrying each slot on transient
    /// failure. Instances that did come up before a fatal failure stay
    /// registered so teardown can reclaim them.
    pub async fn provision(&mut self, request: &ClusterRequest) -> HarnessResult<()> {
        info!(
            "provisioning {} x {}",
            request.count, request.instance_type
        );
        for slot in 0..request.count {
            let instance = self.create_with_retry(request).await?;
            debug!(
                "machine {}/{} up: {} ({})",
                slot + 1,
                request.count,
                instance.public_ip,
                instance.id
            );
            self.machines
                .push(Machine::new(instance, self.credentials.clone()));
        }
        Ok(())
    }

    async fn create_with_retry(&self, request: &ClusterRequest) -> HarnessResult<Instance> {
        let mut backoff = PROVISION_BACKOFF;
        let mut last_reason = String::new();
        for attempt in 1..=MAX_PROVISION_ATTEMPTS {
            match self.provider.create_instance(&request.instance_type).await {
                Ok(instance) => return Ok(instance),
                Err(e) => {
                    warn!(
                        "provisioning attempt {}/{} failed: {}",
                        attempt, MAX_PROVISION_ATTEMPTS, e
                    );
                    last_reason = e.to_string();
                }
            }
            if attempt != MAX_PROVISION_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
        Err(HarnessError::Provision {
            attempts: MAX_PROVISION_ATTEMPTS,
            reason: last_reason,
        })
    }

    /// Terminate every provisioned machine. Best-effort and idempotent:
    /// failures are logged as resource-leak warnings and returned for the
    /// operator, never escalated, and already-terminated machines are
    /// skipped on repeated calls.
    pub async fn teardown(&mut self) -> Vec<HarnessError> {
        let Self {
            provider,
            machines,
            terminated,
            ..
        } = self;
        let mut leaks = Vec::new();
        for machine in machines.iter() {
            if !terminated.insert(machine.instance_id.clone()) {
                continue;
            }
            match provider.terminate_instance(&machine.instance_id).await {
                Ok(()) => debug!("terminated {}", machine.instance_id),
                Err(e) => {
                    let leak = HarnessError::Teardown {
                        machine: machine.instance_id.clone(),
                        reason: e.to_string(),
                    };
                    warn!("possible resource leak: {}", leak);
                    leaks.push(leak);
                }
            }
        }
        leaks
    }
}
