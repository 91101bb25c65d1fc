//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::connector::ResourceBackend;
use crate::error::{AclError, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    acl: String,
}

/// Keeps resources and their ACLs in a single map, so data and ACL always
/// change together.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored resources.
    pub fn len(&self) -> Result<usize> {
        Ok(self.shared()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.shared()?.is_empty())
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredObject>>> {
        self.objects
            .read()
            .map_err(|_| AclError::Lock("memory storage poisoned".into()))
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredObject>>> {
        self.objects
            .write()
            .map_err(|_| AclError::Lock("memory storage poisoned".into()))
    }
}

impl ResourceBackend for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_acl(&self, resource_id: &str) -> Result<Option<String>> {
        Ok(self.shared()?.get(resource_id).map(|object| object.acl.clone()))
    }

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.shared()?.get(resource_id).map(|object| object.data.clone()))
    }

    fn exists(&self, resource_id: &str) -> Result<bool> {
        Ok(self.shared()?.contains_key(resource_id))
    }

    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()> {
        let mut objects = self.exclusive()?;
        if objects.contains_key(resource_id) {
            return Err(AclError::AclConflict {
                resource_id: resource_id.to_string(),
            });
        }
        objects.insert(
            resource_id.to_string(),
            StoredObject {
                data: data.to_vec(),
                acl: acl.to_string(),
            },
        );
        Ok(())
    }

    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        let mut objects = self.exclusive()?;
        let object = objects.get_mut(resource_id).ok_or_else(|| AclError::Backend {
            reason: format!("resource '{resource_id}' vanished before write"),
        })?;
        object.data = data.to_vec();
        Ok(())
    }

    fn delete(&self, resource_id: &str) -> Result<()> {
        self.exclusive()?.remove(resource_id);
        Ok(())
    }

    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool> {
        let mut objects = self.exclusive()?;
        match objects.get_mut(resource_id) {
            Some(object) if object.acl == expected => {
                object.acl = new.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_stores_data_and_acl_together() {
        let storage = MemoryStorage::new();
        storage.create("r1", b"payload", "v:1|a:a1/o").unwrap();
        assert_eq!(storage.read("r1").unwrap().as_deref(), Some(&b"payload"[..]));
        assert_eq!(storage.load_acl("r1").unwrap().as_deref(), Some("v:1|a:a1/o"));
        assert_eq!(storage.len().unwrap(), 1);
    }

    #[test]
    fn create_refuses_existing_resource() {
        let storage = MemoryStorage::new();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();
        let err = storage.create("r1", b"two", "v:1|a:a2/o").unwrap_err();
        assert!(matches!(err, AclError::AclConflict { .. }));
        assert_eq!(storage.read("r1").unwrap().as_deref(), Some(&b"one"[..]));
    }

    #[test]
    fn write_keeps_acl() {
        let storage = MemoryStorage::new();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();
        storage.write("r1", b"two").unwrap();
        assert_eq!(storage.read("r1").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(storage.load_acl("r1").unwrap().as_deref(), Some("v:1|a:a1/o"));
        assert!(storage.write("missing", b"x").is_err());
    }

    #[test]
    fn delete_removes_both_halves() {
        let storage = MemoryStorage::new();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();
        storage.delete("r1").unwrap();
        storage.delete("r1").unwrap();
        assert!(storage.load_acl("r1").unwrap().is_none());
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn compare_and_swap_on_missing_resource_fails() {
        let storage = MemoryStorage::new();
        assert!(!storage.compare_and_swap_acl("r1", "", "v:1").unwrap());
    }
}
