//! Shared test infrastructure for the integration suite

pub mod fixtures;
pub mod helpers;
