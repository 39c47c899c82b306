//! `metronome-gateway` — the health/control HTTP surface of the scheduler.
//!
//! Exposes liveness (`/health`), the job table (`/status`), a service
//! identity document (`/`) and the manual-trigger endpoint
//! (`POST /api/schedules/{schedule_id}/trigger`), which funnels into the
//! same locked execution path as a cron fire. The binary in `main.rs` wires
//! config, store, lock store and the scheduler service together.

pub mod app;
pub mod http;
