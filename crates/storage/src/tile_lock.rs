//! Per-tile write locks.
//!
//! At most one task writes a given tile at a time. Entries are created on
//! demand and dropped again once nobody holds or waits for them, so the map
//! only ever contains tiles that are in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use map_common::TileCoord;
use tokio::sync::OwnedMutexGuard;

type LockMap = HashMap<TileCoord, Arc<tokio::sync::Mutex<()>>>;

/// Registry of in-flight tile locks.
#[derive(Clone, Default)]
pub struct TileLocks {
    inner: Arc<Mutex<LockMap>>,
}

impl TileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `coord`.
    ///
    /// Dropping the returned future before it resolves releases the
    /// waiter's claim on the entry as well.
    pub async fn acquire(&self, coord: TileCoord) -> TileLockGuard {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(coord).or_default().clone()
        };
        let entry = LockEntry {
            coord,
            locks: Arc::clone(&self.inner),
        };
        let guard = slot.lock_owned().await;
        TileLockGuard {
            guard: Some(guard),
            entry,
        }
    }

    /// Number of tiles currently locked or awaited.
    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Claim on a map entry. Removes the entry on drop once no other holder
/// or waiter references it.
struct LockEntry {
    coord: TileCoord,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for LockEntry {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = map.get(&self.coord) {
            if Arc::strong_count(slot) == 1 {
                map.remove(&self.coord);
            }
        }
    }
}

/// Exclusive access to one tile, released on drop.
pub struct TileLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    entry: LockEntry,
}

impl TileLockGuard {
    pub fn coord(&self) -> TileCoord {
        self.entry.coord
    }
}

impl Drop for TileLockGuard {
    fn drop(&mut self) {
        // The mutex must be released before `entry` checks the count.
        drop(self.guard.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_entry_removed_after_release() {
        let locks = TileLocks::new();
        let coord = TileCoord::new(10, 1, 2);
        {
            let guard = locks.acquire(coord).await;
            assert_eq!(guard.coord(), coord);
            assert_eq!(locks.in_flight(), 1);
        }
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_same_tile_is_serialized() {
        let locks = TileLocks::new();
        let coord = TileCoord::new(10, 1, 2);

        let first = locks.acquire(coord).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(coord).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_different_tiles_do_not_block() {
        let locks = TileLocks::new();
        let _a = locks.acquire(TileCoord::new(10, 1, 2)).await;
        let _b = locks.acquire(TileCoord::new(10, 2, 1)).await;
        assert_eq!(locks.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_abandoned_waiter_does_not_leak_entry() {
        let locks = TileLocks::new();
        let coord = TileCoord::new(10, 1, 2);

        let holder = locks.acquire(coord).await;
        let mut waiter = Box::pin(locks.acquire(coord));
        let waited = tokio::time::timeout(Duration::from_millis(20), &mut waiter).await;
        assert!(waited.is_err());

        // The holder leaves while the waiter still references the entry.
        drop(holder);
        assert_eq!(locks.in_flight(), 1);

        drop(waiter);
        assert_eq!(locks.in_flight(), 0);
    }
}
