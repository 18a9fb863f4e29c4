//! Per-key serialization of cache fills.
//!
//! The manager hands out at most one [`FillPermit`] per key at a time.
//! Entries are reference-counted by holders plus waiters and removed from
//! the table as soon as the last one is gone, so the table only ever
//! contains keys with an active or pending fill.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::CacheKey;

type LockTable = Mutex<HashMap<CacheKey, LockEntry>>;

#[derive(Debug, Default)]
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    /// Holder plus waiters currently interested in this key.
    members: usize,
}

/// Grants at most one concurrent fill permit per cache key.
///
/// Cheap to clone; all clones share one lock table. Owned explicitly by the
/// coordinator rather than living in a process global, so tests can use
/// independent instances.
#[derive(Debug, Default, Clone)]
pub struct KeyLockManager {
    table: Arc<LockTable>,
}

impl KeyLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the permit for `key` is free, then grants it.
    ///
    /// Dropping the returned future while it is still waiting releases this
    /// waiter's interest in the key without disturbing the current holder
    /// or the other waiters.
    pub async fn acquire(&self, key: &CacheKey) -> FillPermit {
        let lock = {
            let mut table = self.table.lock().unwrap();
            let entry = table.entry(key.clone()).or_default();
            entry.members += 1;
            Arc::clone(&entry.lock)
        };

        // Registered above; `Membership::drop` balances the registration
        // whether or not the permit is ever granted.
        let membership = Membership {
            table: Arc::clone(&self.table),
            key: key.clone(),
        };

        let guard = lock.lock_owned().await;

        FillPermit {
            _guard: guard,
            _membership: membership,
        }
    }

    /// Number of keys with an active or pending fill.
    pub fn active_keys(&self) -> usize {
        self.table.lock().unwrap().len()
    }
}

/// The per-key mutual exclusion token, released on drop.
#[derive(Debug)]
pub struct FillPermit {
    // Declaration order matters: the mutex is unlocked before the
    // membership bookkeeping decides whether to drop the table entry.
    _guard: OwnedMutexGuard<()>,
    _membership: Membership,
}

#[derive(Debug)]
struct Membership {
    table: Arc<LockTable>,
    key: CacheKey,
}

impl Drop for Membership {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap();
        if let Some(entry) = table.get_mut(&self.key) {
            entry.members -= 1;
            if entry.members == 0 {
                table.remove(&self.key);
            }
        }
    }
}
