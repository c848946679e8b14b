//! Per-path exclusivity

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async locks keyed by mapping key. Different paths never contend.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only this table still holds are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of paths currently held or awaited
    #[cfg(test)]
    fn active(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_path_waits_for_release() {
        let locks = PathLocks::new();
        let guard = locks.lock("a.md").await;

        let pending = tokio::time::timeout(Duration::from_millis(20), locks.lock("a.md")).await;
        assert!(pending.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(20), locks.lock("a.md")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_paths_do_not_contend() {
        let locks = PathLocks::new();
        let _a = locks.lock("a.md").await;
        let b = tokio::time::timeout(Duration::from_millis(20), locks.lock("b.md")).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = PathLocks::new();
        drop(locks.lock("a.md").await);
        drop(locks.lock("b.md").await);
        assert_eq!(locks.active(), 0);
        assert!(locks.inner.lock().unwrap().len() <= 1);
    }
}
