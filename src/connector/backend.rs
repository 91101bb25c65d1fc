//! Persistence seam between `SecureConnector` and a concrete medium.

use std::sync::Arc;

use crate::error::Result;

/// Storage capability a `SecureConnector` gates.
///
/// ACLs cross this boundary in their serialized form. Implementations must
/// keep a resource's data and ACL together: `create` stores both or neither,
/// and `delete` removes both.
pub trait ResourceBackend: Send + Sync {
    /// Short name used in log fields.
    fn name(&self) -> &'static str;

    /// Serialized ACL of the resource, `None` if the resource does not exist.
    fn load_acl(&self, resource_id: &str) -> Result<Option<String>>;

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>>;

    fn exists(&self, resource_id: &str) -> Result<bool>;

    /// Stores a new resource and its ACL as one unit.
    ///
    /// Fails with `AclError::AclConflict` if the resource already exists.
    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()>;

    /// Replaces the data of an existing resource, keeping its ACL.
    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()>;

    /// Removes data and ACL. Deleting a missing resource is not an error.
    fn delete(&self, resource_id: &str) -> Result<()>;

    /// Replaces the stored ACL iff it still equals `expected`.
    ///
    /// Returns `false` when the stored ACL differs or the resource is gone.
    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool>;
}

impl<B: ResourceBackend + ?Sized> ResourceBackend for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load_acl(&self, resource_id: &str) -> Result<Option<String>> {
        (**self).load_acl(resource_id)
    }

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        (**self).read(resource_id)
    }

    fn exists(&self, resource_id: &str) -> Result<bool> {
        (**self).exists(resource_id)
    }

    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()> {
        (**self).create(resource_id, data, acl)
    }

    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        (**self).write(resource_id, data)
    }

    fn delete(&self, resource_id: &str) -> Result<()> {
        (**self).delete(resource_id)
    }

    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool> {
        (**self).compare_and_swap_acl(resource_id, expected, new)
    }
}
