//! Per-name mutual exclusion.
//!
//! Every mutation of a master key record is a read-modify-write of
//! the whole serialized identity.  Two mutations of the same name
//! must not interleave, or one of them is lost.  Mutations of
//! different names are independent.
//!
//! A [`LockProvider`] hands out the lock for a name.  The default
//! provider, [`ShardedLocks`], keeps a fixed table of mutexes and
//! maps names onto it by hash, so memory stays bounded no matter how
//! many names the vault sees.  Unrelated names may share a shard;
//! that only costs contention, never correctness.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

/// Default number of shards.
pub const DEFAULT_SHARDS: usize = 256;

/// Hands out exclusive locks keyed by name.
pub trait LockProvider: Send + Sync {
    /// Blocks until the lock for `name` is acquired.
    ///
    /// The lock is released when the guard is dropped.
    fn lock_for(&self, name: &str) -> MutexGuard<'_, ()>;
}

/// A fixed-size table of locks, selected by the hash of the name.
pub struct ShardedLocks {
    shards: Box<[Mutex<()>]>,
}

impl std::fmt::Debug for ShardedLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ShardedLocks")
            .field("shards", &self.shards.len())
            .finish()
    }
}

impl Default for ShardedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl ShardedLocks {
    /// Returns a table with `shards` locks.
    ///
    /// A table has at least one lock.
    pub fn new(shards: usize) -> Self {
        ShardedLocks {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Returns the number of shards.
    pub fn shards(&self) -> usize {
        self.shards.len()
    }

    /// Returns the index of the shard guarding `name`.
    pub fn shard_of(&self, name: &str) -> usize {
        let mut h = DefaultHasher::new();
        name.hash(&mut h);
        (h.finish() % self.shards.len() as u64) as usize
    }
}

impl LockProvider for ShardedLocks {
    fn lock_for(&self, name: &str) -> MutexGuard<'_, ()> {
        let shard = self.shard_of(name);
        log::debug!("Locking shard {} for {:?}", shard, name);
        // The guarded value is (), so a poisoned lock carries no
        // broken state.
        self.shards[shard].lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    quickcheck::quickcheck! {
        fn shard_is_stable(name: String, shards: usize) -> bool {
            let locks = ShardedLocks::new(shards % 512);
            let a = locks.shard_of(&name);
            a == locks.shard_of(&name) && a < locks.shards()
        }
    }

    #[test]
    fn at_least_one_shard() {
        let locks = ShardedLocks::new(0);
        assert_eq!(locks.shards(), 1);
        drop(locks.lock_for("anything"));
    }

    #[test]
    fn same_name_excludes() {
        let locks = Arc::new(ShardedLocks::new(4));
        let inside = Arc::new(AtomicUsize::new(0));
        let max = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8).map(|_| {
            let locks = locks.clone();
            let inside = inside.clone();
            let max = max.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let _g = locks.lock_for("alice");
                    let n = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max.fetch_max(n, Ordering::SeqCst);
                    std::thread::yield_now();
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        }).collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(max.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_shards_do_not_block() {
        let locks = ShardedLocks::new(DEFAULT_SHARDS);
        let a = "alice";
        // Find a name living in another shard.
        let b = (0..)
            .map(|i| format!("bob-{}", i))
            .find(|b| locks.shard_of(b) != locks.shard_of(a))
            .unwrap();

        let _ga = locks.lock_for(a);
        // Would deadlock if the shards were shared.
        let _gb = locks.lock_for(&b);
    }

    #[test]
    fn survives_poisoning() {
        let locks = Arc::new(ShardedLocks::new(1));
        let l = locks.clone();
        let _ = std::thread::spawn(move || {
            let _g = l.lock_for("x");
            panic!("poison the lock");
        }).join();

        drop(locks.lock_for("x"));
    }
}
