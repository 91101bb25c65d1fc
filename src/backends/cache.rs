//! In-memory cache backend with per-entry expiry.
//!
//! The ACL lives inside the cache entry, so it expires together with the
//! data. An expired entry reads as missing, which means the next writer
//! becomes its owner again.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::connector::{ResourceBackend, SecureConnector};
use crate::error::{AclError, Result};
use crate::types::{AccessCandidate, CacheSettings};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    acl: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| now < deadline)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at
            .map_or(Duration::ZERO, |deadline| deadline.saturating_duration_since(now))
    }
}

#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_settings(CacheSettings::default())
    }
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero `default_ttl_ms` makes entries live until deleted.
    #[must_use]
    pub fn with_settings(settings: CacheSettings) -> Self {
        Self::with_default_ttl(Duration::from_millis(settings.default_ttl_ms))
    }

    #[must_use]
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Remaining lifetime of a live entry. `Duration::ZERO` for entries
    /// without expiry, `None` for missing or expired ones.
    pub fn ttl(&self, resource_id: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .shared()?
            .get(resource_id)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.remaining(now)))
    }

    /// Resets the lifetime of a live entry. Returns false if it is missing.
    pub fn set_ttl(&self, resource_id: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.exclusive()?;
        match entries.get_mut(resource_id) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = deadline(now, ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drops every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let now = Instant::now();
        let mut entries = self.exclusive()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        let purged = before - entries.len();
        if purged > 0 {
            tracing::debug!(cache.purged = purged, "expired cache entries purged");
        }
        Ok(purged)
    }

    fn insert(&self, resource_id: &str, data: &[u8], acl: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.exclusive()?;
        entries.retain(|_, entry| entry.is_live(now));
        if entries.contains_key(resource_id) {
            return Err(AclError::AclConflict {
                resource_id: resource_id.to_string(),
            });
        }
        entries.insert(
            resource_id.to_string(),
            CacheEntry {
                data: data.to_vec(),
                acl: acl.to_string(),
                expires_at: deadline(now, ttl),
            },
        );
        Ok(())
    }

    fn replace(&self, resource_id: &str, data: &[u8], ttl: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.exclusive()?;
        let entry = entries
            .get_mut(resource_id)
            .filter(|entry| entry.is_live(now))
            .ok_or_else(|| AclError::Backend {
                reason: format!("cache entry '{resource_id}' expired before write"),
            })?;
        entry.data = data.to_vec();
        if let Some(ttl) = ttl {
            entry.expires_at = deadline(now, ttl);
        }
        Ok(())
    }

    fn live<T>(&self, resource_id: &str, project: impl FnOnce(&CacheEntry) -> T) -> Result<Option<T>> {
        let now = Instant::now();
        Ok(self
            .shared()?
            .get(resource_id)
            .filter(|entry| entry.is_live(now))
            .map(project))
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| AclError::Lock("memory cache poisoned".into()))
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| AclError::Lock("memory cache poisoned".into()))
    }
}

fn deadline(now: Instant, ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() {
        None
    } else {
        now.checked_add(ttl)
    }
}

impl ResourceBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "cache"
    }

    fn load_acl(&self, resource_id: &str) -> Result<Option<String>> {
        self.live(resource_id, |entry| entry.acl.clone())
    }

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        self.live(resource_id, |entry| entry.data.clone())
    }

    fn exists(&self, resource_id: &str) -> Result<bool> {
        Ok(self.live(resource_id, |_| ())?.is_some())
    }

    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()> {
        self.insert(resource_id, data, acl, self.default_ttl)
    }

    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        self.replace(resource_id, data, None)
    }

    fn delete(&self, resource_id: &str) -> Result<()> {
        self.exclusive()?.remove(resource_id);
        Ok(())
    }

    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.exclusive()?;
        match entries.get_mut(resource_id) {
            Some(entry) if entry.is_live(now) && entry.acl == expected => {
                entry.acl = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl SecureConnector<MemoryCache> {
    /// Gated `write` with an explicit lifetime for this entry.
    pub fn write_with_ttl(
        &self,
        candidate: &AccessCandidate,
        resource_id: &str,
        data: &[u8],
        ttl: Duration,
    ) -> Result<()> {
        self.gated_write(
            candidate,
            resource_id,
            |cache, acl| cache.insert(resource_id, data, acl, ttl),
            |cache| cache.replace(resource_id, data, Some(ttl)),
        )
    }

    /// Remaining lifetime, gated on `Read`.
    pub fn get_ttl(&self, candidate: &AccessCandidate, resource_id: &str) -> Result<Option<Duration>> {
        self.gated_read(candidate, resource_id, |cache| cache.ttl(resource_id))
            .map(Option::flatten)
    }
}
