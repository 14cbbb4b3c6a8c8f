//! Per-entity advisory lock for stores without scripting
//!
//! The lock is one string key holding the millisecond timestamp at which
//! it expires. A crashed holder therefore blocks writers for at most
//! `ttl_ms`.
//!
//! # Acquisition
//!
//! 1. `SETNX key expiry`; success means the lock is ours.
//! 2. Otherwise read the stamp. If it has expired, `GETSET` a fresh
//!    stamp. The value `GETSET` hands back tells whether we won: if it is
//!    still expired nobody beat us to the takeover, if it is live another
//!    waiter took over first and we keep waiting.
//! 3. Sleep with exponential backoff and jitter, until `acquire_timeout_ms`.
//!
//! Release happens when the guard drops, including on error paths. A guard
//! only deletes the key if it still holds its own stamp.
//!
//! The stamp check and the `DEL` are two round trips: the store offers no
//! conditional delete without scripting. Between them another writer can
//! only replace the stamp by taking over an expired lock, so the guard must
//! already have outlived `ttl_ms`. In that case the `DEL` may drop the new
//! holder's lock; sizing `ttl_ms` above the longest save keeps it out of
//! reach.

use chrono::Utc;
use rand::Rng;
use std::time::{Duration, Instant};
use tessera_core::{Error, Key, Result};
use tessera_storage::{Command, Store};
use tracing::{trace, warn};

use crate::config::LockConfig;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Unreadable stamps count as expired
fn is_expired(stamp: Option<&str>, now: i64) -> bool {
    match stamp.map(|s| s.parse::<i64>()) {
        Some(Ok(expires_at)) => expires_at < now,
        _ => true,
    }
}

/// A held entity lock; released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct EntityLock<'a> {
    store: &'a dyn Store,
    key: String,
    stamp: String,
}

impl<'a> EntityLock<'a> {
    /// Acquire the lock at `key`, waiting up to `config.acquire_timeout_ms`
    pub fn acquire(store: &'a dyn Store, key: &Key, config: &LockConfig) -> Result<Self> {
        let key = key.as_str().to_string();
        let ttl = config.ttl_ms as i64;
        let started = Instant::now();
        let mut backoff = config.backoff_initial_ms;
        let mut rng = rand::thread_rng();

        loop {
            let stamp = (now_ms() + ttl).to_string();
            let set = store
                .execute(Command::SetNx {
                    key: key.clone(),
                    value: stamp.clone(),
                })?
                .into_bool()?;
            if set {
                trace!(target: "tessera::lock", key = %key, "acquired");
                return Ok(Self { store, key, stamp });
            }

            let current = store
                .execute(Command::Get { key: key.clone() })?
                .into_opt_string()?;
            if is_expired(current.as_deref(), now_ms()) {
                let stamp = (now_ms() + ttl).to_string();
                let previous = store
                    .execute(Command::GetSet {
                        key: key.clone(),
                        value: stamp.clone(),
                    })?
                    .into_opt_string()?;
                if is_expired(previous.as_deref(), now_ms()) {
                    warn!(target: "tessera::lock", key = %key, previous = ?previous, "took over expired lock");
                    return Ok(Self { store, key, stamp });
                }
            }

            let waited = started.elapsed();
            if waited >= config.acquire_timeout() {
                return Err(Error::LockTimeout {
                    key,
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let jitter = rng.gen_range(0..=backoff / 2);
            std::thread::sleep(Duration::from_millis(backoff + jitter));
            backoff = (backoff * 2).min(config.backoff_max_ms);
        }
    }

    /// The lock key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release now instead of at drop
    pub fn release(self) {}

    // Not atomic; see the module docs for the window this leaves
    fn unlock(&self) -> Result<()> {
        let current = self
            .store
            .execute(Command::Get {
                key: self.key.clone(),
            })?
            .into_opt_string()?;
        if current.as_deref() == Some(self.stamp.as_str()) {
            self.store.execute(Command::del(self.key.clone()))?;
        } else {
            warn!(target: "tessera::lock", key = %self.key, "lock was taken over before release");
        }
        Ok(())
    }
}

impl Drop for EntityLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unlock() {
            warn!(target: "tessera::lock", key = %self.key, error = %e, "failed to release lock");
        }
    }
}
