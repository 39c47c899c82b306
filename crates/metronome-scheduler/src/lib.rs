//! `metronome-scheduler` — the cron trigger engine and the execution
//! coordinator built on top of it.
//!
//! # Overview
//!
//! The [`engine::TriggerEngine`] keeps an in-process table of schedule ids
//! mapped to parsed cron expressions and next-fire times, ticking once a
//! second. Fired jobs flow over an mpsc channel into the
//! [`service::SchedulerService`], which runs the per-fire state machine:
//! acquire the distributed lock, re-validate the schedule against a fresh
//! store read, create the execution record, dispatch to the external
//! executor under a hard timeout, record the outcome, publish lifecycle
//! events and release the lock.
//!
//! Contention, disabled schedules and a powered-off autonomy flag are not
//! errors — they come back as [`service::FireOutcome`] variants so callers
//! and logs can tell an expected skip from a real failure.

pub mod cron;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod service;

pub use engine::{FiredJob, JobKind, TriggerEngine};
pub use error::{Result, SchedulerError};
pub use events::EventPublisher;
pub use executor::{
    ActivityRecorder, AgentExecutor, AgentReply, AgentUsage, HttpAgentExecutor,
    HttpWorkflowExecutor, WorkflowExecutor,
};
pub use service::{FireOutcome, SchedulerService, ServiceConfig, StatusSnapshot};
