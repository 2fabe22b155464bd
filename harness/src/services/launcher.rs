//! Participant process launching
//!
//! Spawns one server or client participant and redirects its output into a
//! dedicated log file. Remote participants run over an ssh session whose
//! output streams back into the identical local log path, so the barrier
//! and the aggregator never distinguish local from remote runs.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{HarnessError, HarnessResult};
use crate::services::cluster::Machine;
use crate::topology::ParticipantKind;

/// Where a participant executes.
#[derive(Debug, Clone)]
pub enum ExecTarget {
    Local,
    Remote(Machine),
}

/// Lifecycle status of a launched participant. Mutated only by the
/// readiness barrier once the participant's marker is (not) observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    Starting,
    Running,
    Ended,
    Failed,
}

/// Handle for one launched participant. Exclusively owns the OS process
/// (or ssh session) until reaped.
#[derive(Debug)]
pub struct RunHandle {
    pub kind: ParticipantKind,
    pub id: u32,
    pub log_path: PathBuf,
    pub status: ParticipantStatus,
    child: Child,
}

impl RunHandle {
    /// Kill and reap the underlying process. Safe to call on an already
    /// exited participant.
    pub async fn reap(&mut self) {
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
    }

    /// Handle over an inert process, for exercising the barrier without a
    /// real participant.
    #[cfg(test)]
    pub(crate) fn inert(kind: ParticipantKind, id: u32, log_path: &Path) -> Self {
        let child = Command::new("sleep")
            .arg("600")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        Self {
            kind,
            id,
            log_path: log_path.to_path_buf(),
            status: ParticipantStatus::Starting,
            child,
        }
    }
}

/// Spawns participants against an execution target.
pub struct ProcessLauncher;

impl ProcessLauncher {
    /// Spawn one participant, redirecting stdout and stderr into
    /// `log_path` (created or truncated).
    pub async fn spawn(
        binary: &Path,
        args: &[String],
        kind: ParticipantKind,
        id: u32,
        log_path: &Path,
        target: &ExecTarget,
    ) -> HarnessResult<RunHandle> {
        let child = match target {
            ExecTarget::Local => Self::spawn_local(binary, args, kind, id, log_path)?,
            ExecTarget::Remote(machine) => {
                Self::spawn_remote(binary, args, kind, id, log_path, machine).await?
            }
        };
        debug!(
            "spawned {} {} (pid {:?}) logging to {}",
            kind,
            id,
            child.id(),
            log_path.display()
        );
        Ok(RunHandle {
            kind,
            id,
            log_path: log_path.to_path_buf(),
            status: ParticipantStatus::Starting,
            child,
        })
    }

    fn spawn_local(
        binary: &Path,
        args: &[String],
        kind: ParticipantKind,
        id: u32,
        log_path: &Path,
    ) -> HarnessResult<Child> {
        let log = std::fs::File::create(log_path)
            .map_err(|source| HarnessError::Launch { kind, id, source })?;
        let log_err = log
            .try_clone()
            .map_err(|source| HarnessError::Launch { kind, id, source })?;
        Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Launch { kind, id, source })
    }

    async fn spawn_remote(
        binary: &Path,
        args: &[String],
        kind: ParticipantKind,
        id: u32,
        log_path: &Path,
        machine: &Machine,
    ) -> HarnessResult<Child> {
        // ship the binary, then run it under the participant's name so the
        // remote side is identifiable
        let remote_binary = format!("./{}_{}", kind, id);
        machine.copy(binary, &remote_binary).await?;
        machine.run(&format!("chmod u+x {}", remote_binary)).await?;

        let log = std::fs::File::create(log_path)
            .map_err(|source| HarnessError::Launch { kind, id, source })?;
        let log_err = log
            .try_clone()
            .map_err(|source| HarnessError::Launch { kind, id, source })?;
        let command = format!("{} {}", remote_binary, args.join(" "));
        machine
            .prepare_command(&command)
            .stdin(Stdio::null())
            .stdout(log)
            .stderr(log_err)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| HarnessError::Launch { kind, id, source })
    }
}
