//! `metronome-core` — configuration and shared types for the Metronome
//! scheduling tier.
//!
//! Metronome fires cron-defined schedules for long-lived agent processes,
//! exactly once across a fleet of redundant scheduler instances. This crate
//! holds the pieces every other subsystem needs: the figment-based config
//! loader and the small vocabulary types (execution status, trigger source)
//! that flow between the store, the scheduler and the control server.

pub mod config;
pub mod error;
pub mod types;

pub use config::MetronomeConfig;
pub use error::{CoreError, Result};
pub use types::{ExecutionStatus, TriggerSource};
