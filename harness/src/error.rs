//! Harness-specific error types

use std::time::Duration;
use thiserror::Error;

use crate::topology::ParticipantKind;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Invalid topology: {reason}")]
    Config { reason: String },

    #[error("Failed to launch {kind} {id}: {source}")]
    Launch {
        kind: ParticipantKind,
        id: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited:?} waiting for participants {unready:?}")]
    Timeout { unready: Vec<u32>, waited: Duration },

    #[error("Malformed latency line {line:?}: {reason}")]
    Parse { line: String, reason: String },

    #[error("No latency records found in any client log")]
    NoData,

    #[error("Provisioning failed after {attempts} attempts: {reason}")]
    Provision { attempts: u32, reason: String },

    #[error("Teardown of machine {machine} failed: {reason}")]
    Teardown { machine: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Shorthand for a [`HarnessError::Config`] with a formatted reason.
    pub fn config(reason: impl Into<String>) -> Self {
        HarnessError::Config { reason: reason.into() }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
