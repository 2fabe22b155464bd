//! Explicit log-path mapping
//!
//! The coordinator owns one of these per run and hands it to the launcher,
//! the barrier, and the aggregator, so every component agrees on where a
//! participant's output lives without any convention-based lookup.

use std::path::{Path, PathBuf};

use crate::error::HarnessResult;
use crate::topology::ParticipantKind;

#[derive(Debug, Clone)]
pub struct LogDir {
    root: PathBuf,
}

impl LogDir {
    /// Create the mapping rooted at `root`, creating the directory if
    /// needed.
    pub fn new(root: impl Into<PathBuf>) -> HarnessResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Log file for one participant.
    pub fn path(&self, kind: ParticipantKind, id: u32) -> PathBuf {
        self.root.join(format!("{}_{}.log", kind, id))
    }
}
