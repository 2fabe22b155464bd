//! Unit tests for the harness services

mod barrier;
mod metrics;
