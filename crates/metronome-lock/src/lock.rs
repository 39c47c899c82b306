use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::store::LockStore;

/// Poll cadence for blocking acquisition.
const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Bound on waiting for the renewal task to wind down before the delete.
const RENEWAL_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A single named, token-owned lease on the shared lock store.
///
/// Ownership is defined purely by token equality at the store key: a lock
/// object holding a stale token never affects a key it no longer owns. The
/// store-side TTL expires independently of this object's lifetime; that is
/// the safety net against crashed holders.
pub struct DistributedLock {
    name: String,
    token: String,
    ttl: Duration,
    auto_renew: bool,
    store: Arc<dyn LockStore>,
    renewal: Option<RenewalHandle>,
}

struct RenewalHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn LockStore>, name: String, ttl: Duration, auto_renew: bool) -> Self {
        Self {
            name,
            token: Uuid::new_v4().to_string(),
            ttl,
            auto_renew,
            store,
            renewal: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attempt to take the lease.
    ///
    /// Non-blocking: a single conditional set with a freshly generated
    /// token; true iff the store accepted it. Blocking: polls every 100 ms
    /// until acquired or `blocking_timeout` (default: the lock TTL) lapses.
    pub async fn acquire(
        &mut self,
        blocking: bool,
        blocking_timeout: Option<Duration>,
    ) -> Result<bool> {
        if !blocking {
            return self.try_once().await;
        }

        let deadline = tokio::time::Instant::now() + blocking_timeout.unwrap_or(self.ttl);
        loop {
            if self.try_once().await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() + ACQUIRE_POLL_INTERVAL > deadline {
                return Ok(false);
            }
            tokio::time::sleep(ACQUIRE_POLL_INTERVAL).await;
        }
    }

    async fn try_once(&mut self) -> Result<bool> {
        // Fresh token per attempt: a reused token could collide with a
        // previous life of this lock still live in the store.
        self.token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_nx(&self.name, &self.token, self.ttl)
            .await?;
        if acquired {
            debug!(lock = %self.name, "lock acquired");
            if self.auto_renew {
                self.spawn_renewal();
            }
        }
        Ok(acquired)
    }

    /// Background renewal loop: wakes at TTL/2 and extends the lease iff the
    /// stored token is still ours. A failed extend means the lease already
    /// expired and someone else holds the key. The in-flight work may now be
    /// running concurrently with the new holder, so it is logged loudly
    /// rather than ignored.
    fn spawn_renewal(&mut self) {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let store = Arc::clone(&self.store);
        let name = self.name.clone();
        let token = self.token.clone();
        let ttl = self.ttl;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ttl / 2);
            // First tick completes immediately; skip it so the initial
            // extend happens at TTL/2, not at acquisition time.
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match store.extend_if_eq(&name, &token, ttl).await {
                            Ok(true) => debug!(lock = %name, "lease renewed"),
                            Ok(false) => {
                                warn!(lock = %name, "lock renewal failed: lease lost to another holder");
                                break;
                            }
                            Err(e) => {
                                // Transient store trouble: keep trying, the
                                // TTL decides if we lose the lease.
                                warn!(lock = %name, error = %e, "lease renewal attempt errored");
                            }
                        }
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        self.renewal = Some(RenewalHandle { stop_tx, task });
    }

    /// Release the lease.
    ///
    /// Stops the renewal loop first (bounded join, so a final extend in
    /// flight cannot race the delete), then atomically deletes the key iff
    /// it still holds our token. Returns whether this lock actually owned
    /// and removed the key.
    pub async fn release(&mut self) -> Result<bool> {
        if let Some(renewal) = self.renewal.take() {
            let _ = renewal.stop_tx.send(true);
            if tokio::time::timeout(RENEWAL_JOIN_TIMEOUT, renewal.task)
                .await
                .is_err()
            {
                warn!(lock = %self.name, "renewal task did not stop within join timeout");
            }
        }

        let owned = self.store.delete_if_eq(&self.name, &self.token).await?;
        if owned {
            debug!(lock = %self.name, "lock released");
        } else {
            debug!(lock = %self.name, "release skipped: key not owned by this token");
        }
        Ok(owned)
    }
}

impl Drop for DistributedLock {
    fn drop(&mut self) {
        // Dropped without release: stop renewing and let the store-side TTL
        // free the key. Aborting is safe; the extend script is atomic.
        if let Some(renewal) = self.renewal.take() {
            renewal.task.abort();
        }
    }
}
