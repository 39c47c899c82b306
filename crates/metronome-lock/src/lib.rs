//! `metronome-lock` — distributed mutual exclusion for schedule fires.
//!
//! # Overview
//!
//! Multiple scheduler instances run in parallel for availability; this crate
//! is what keeps them from firing the same schedule twice. There is no
//! leader election — correctness comes purely from per-schedule leasing
//! against a shared key/value store with atomic conditional operations and
//! TTL expiry.
//!
//! The protocol is token-based: every acquisition attempt generates a fresh
//! opaque token, and both release and renewal are conditional on the stored
//! value still equalling that token. A holder that lost its lease (stall,
//! crash, partition) can therefore never delete or extend a *different*
//! holder's live lease.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`LockStore`] | atomic conditional ops + pub/sub over the shared store |
//! | [`RedisLockStore`] | production backend (SET NX PX, scripted CAS) |
//! | [`MemoryLockStore`] | in-process backend for tests and single-instance runs |
//! | [`DistributedLock`] | one named, token-owned lease with optional auto-renewal |
//! | [`LockManager`] | per-schedule lock construction + instance heartbeats |

pub mod error;
pub mod lock;
pub mod manager;
pub mod store;

pub use error::{LockError, Result};
pub use lock::DistributedLock;
pub use manager::LockManager;
pub use store::{LockStore, MemoryLockStore, RedisLockStore};
