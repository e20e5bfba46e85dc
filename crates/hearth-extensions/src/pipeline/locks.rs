//! Per-extension install locks

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = HashMap<String, Arc<Mutex<()>>>;

/// One async lock per extension id
///
/// An entry lives only while some task holds or waits for it. The map
/// itself is guarded by a std mutex that is never held across an await.
#[derive(Debug, Default)]
pub(crate) struct IdLocks {
    map: StdMutex<LockMap>,
}

impl IdLocks {
    fn map(&self) -> std::sync::MutexGuard<'_, LockMap> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until no other task holds the lock for `id`
    pub(crate) async fn acquire(&self, id: &str) -> IdGuard<'_> {
        let lock = Arc::clone(self.map().entry(id.to_string()).or_default());
        let guard = lock.lock_owned().await;
        IdGuard {
            locks: self,
            id: id.to_string(),
            guard: Some(guard),
        }
    }

    /// Ids currently held or waited for
    pub(crate) fn len(&self) -> usize {
        self.map().len()
    }
}

/// Held lock for one id; dropping it releases the lock
pub(crate) struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        // release before inspecting the count so our own reference is gone
        drop(self.guard.take());

        // clones are only taken under the map lock, so a count of one
        // means nobody else holds or waits for this id
        let mut map = self.locks.map();
        if map
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.id);
        }
    }
}
