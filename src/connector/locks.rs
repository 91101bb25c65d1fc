//! Per-resource single-writer locks.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::error::{AclError, Result};

#[derive(Debug, Default)]
pub(crate) struct ResourceLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Held while a resource is being mutated. Released on drop.
#[derive(Debug)]
pub(crate) struct ResourceGuard<'a> {
    locks: &'a ResourceLocks,
    resource_id: String,
}

impl ResourceLocks {
    /// Blocks until no other guard holds `resource_id`.
    pub(crate) fn acquire(&self, resource_id: &str) -> Result<ResourceGuard<'_>> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| AclError::Lock("resource lock registry poisoned".into()))?;
        while held.contains(resource_id) {
            held = self
                .released
                .wait(held)
                .map_err(|_| AclError::Lock("resource lock registry poisoned".into()))?;
        }
        held.insert(resource_id.to_string());
        Ok(ResourceGuard {
            locks: self,
            resource_id: resource_id.to_string(),
        })
    }

    #[cfg(test)]
    fn is_held(&self, resource_id: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(resource_id)
    }
}

impl Drop for ResourceGuard<'_> {
    fn drop(&mut self) {
        self.locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.resource_id);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn guard_releases_on_drop() {
        let locks = ResourceLocks::default();
        {
            let _guard = locks.acquire("r1").unwrap();
            assert!(locks.is_held("r1"));
            assert!(!locks.is_held("r2"));
        }
        assert!(!locks.is_held("r1"));
    }

    #[test]
    fn distinct_resources_do_not_block() {
        let locks = ResourceLocks::default();
        let _a = locks.acquire("r1").unwrap();
        let _b = locks.acquire("r2").unwrap();
        assert!(locks.is_held("r1") && locks.is_held("r2"));
    }

    #[test]
    fn same_resource_is_single_writer() {
        let locks = Arc::new(ResourceLocks::default());
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = locks.acquire("shared").unwrap();
                        let before = inside.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(before, 0, "two writers inside the same resource");
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!locks.is_held("shared"));
    }
}
