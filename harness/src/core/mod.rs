//! Run coordination core
//!
//! The phase-sequenced run coordinator and the explicit log-path mapping
//! it hands to every service.

pub mod coordinator;
pub mod logs;

pub use coordinator::{Phase, RunCoordinator, Timeouts};
pub use logs::LogDir;
