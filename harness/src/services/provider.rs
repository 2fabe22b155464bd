//! AWS provisioning via the `aws` CLI
//!
//! The cloud path shells out to the AWS CLI the same way the rest of the
//! remote machinery shells out to ssh/scp. Only the provisioning calls live
//! here; retry policy and teardown bookkeeping belong to the cluster
//! lifecycle manager.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::time::Duration;
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::traits::{CloudProvider, Instance};

/// How long to wait for a fresh instance to publish its address before the
/// attempt counts as a transient boot failure.
const BOOT_POLLS: u32 = 30;
const BOOT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct AwsCliProvider {
    region: String,
    image_id: String,
    key_name: String,
}

impl AwsCliProvider {
    pub fn new(region: String, image_id: String, key_name: String) -> Self {
        Self {
            region,
            image_id,
            key_name,
        }
    }

    async fn aws(&self, args: &str) -> HarnessResult<String> {
        let command = format!("aws ec2 {} --output text", args);
        debug!("{}", command);
        let out = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .output()
            .await?;
        if !out.status.success() {
            return Err(HarnessError::Provision {
                attempts: 1,
                reason: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

#[async_trait]
impl CloudProvider for AwsCliProvider {
    async fn create_instance(&self, instance_type: &str) -> HarnessResult<Instance> {
        let id = self
            .aws(&format!(
                "run-instances --region {} --instance-type {} --image-id {} \
                 --key-name {} --count 1 --query Instances[0].InstanceId",
                self.region, instance_type, self.image_id, self.key_name
            ))
            .await?;

        // a booting instance publishes its address a little later
        for _ in 0..BOOT_POLLS {
            let ip = self
                .aws(&format!(
                    "describe-instances --region {} --instance-ids {} \
                     --query Reservations[0].Instances[0].PublicIpAddress",
                    self.region, id
                ))
                .await?;
            if !ip.is_empty() && ip != "None" {
                return Ok(Instance { id, public_ip: ip });
            }
            tokio::time::sleep(BOOT_POLL_INTERVAL).await;
        }
        Err(HarnessError::Provision {
            attempts: 1,
            reason: format!("instance {} never published a public address", id),
        })
    }

    async fn terminate_instance(&self, id: &str) -> HarnessResult<()> {
        self.aws(&format!(
            "terminate-instances --region {} --instance-ids {} --query \
             TerminatingInstances[0].CurrentState.Name",
            self.region, id
        ))
        .await?;
        Ok(())
    }
}
