//! Directory-backed storage.
//!
//! Each resource is one `<blake3(resource_id)>.obj` file under the root: a
//! single JSON header line carrying the resource id and serialized ACL,
//! followed by the raw data. Files are replaced atomically, so a reader sees
//! either the old data and ACL or the new ones, never a mix. Mutations also
//! hold an advisory lock on `<root>/.lock` to serialize processes sharing the
//! directory.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use atomic_write_file::AtomicWriteFile;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::connector::ResourceBackend;
use crate::error::{AclError, Result};

const OBJECT_FORMAT: u32 = 1;
const OBJECT_EXTENSION: &str = "obj";
const LOCK_FILE: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
struct ObjectHeader {
    format: u32,
    resource_id: String,
    acl: String,
}

#[derive(Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens `root`, creating it when missing.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        tracing::debug!(storage.root = %root.display(), "local storage opened");
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, resource_id: &str) -> PathBuf {
        let digest = blake3::hash(resource_id.as_bytes());
        self.root
            .join(format!("{}.{OBJECT_EXTENSION}", digest.to_hex()))
    }

    fn open_object(&self, resource_id: &str) -> Result<Option<BufReader<File>>> {
        match File::open(self.object_path(resource_id)) {
            Ok(file) => Ok(Some(BufReader::new(file))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn read_header(
        &self,
        resource_id: &str,
        reader: &mut BufReader<File>,
    ) -> Result<ObjectHeader> {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let header: ObjectHeader = serde_json::from_str(line.trim_end()).map_err(|err| {
            AclError::Backend {
                reason: format!("corrupt object header for '{resource_id}': {err}"),
            }
        })?;
        if header.format != OBJECT_FORMAT {
            return Err(AclError::Backend {
                reason: format!(
                    "unsupported object format {} for '{resource_id}'",
                    header.format
                ),
            });
        }
        if header.resource_id != resource_id {
            return Err(AclError::Backend {
                reason: format!(
                    "object file for '{resource_id}' belongs to '{}'",
                    header.resource_id
                ),
            });
        }
        Ok(header)
    }

    fn read_object(&self, resource_id: &str) -> Result<Option<(ObjectHeader, Vec<u8>)>> {
        let Some(mut reader) = self.open_object(resource_id)? else {
            return Ok(None);
        };
        let header = self.read_header(resource_id, &mut reader)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Some((header, data)))
    }

    fn write_object(&self, header: &ObjectHeader, data: &[u8]) -> Result<()> {
        let path = self.object_path(&header.resource_id);
        let mut staging = AtomicWriteFile::open(&path)?;
        serde_json::to_writer(&mut staging, header)?;
        staging.write_all(b"\n")?;
        staging.write_all(data)?;
        staging.flush()?;
        staging.commit()?;
        tracing::debug!(
            storage.path = %path.display(),
            storage.bytes = data.len(),
            "object committed"
        );
        Ok(())
    }

    /// Runs `op` while holding the directory's exclusive lock.
    fn locked<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.root.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&lock)?;
        let outcome = op();
        // Closing the handle releases the lock even if unlock fails.
        if let Err(err) = FileExt::unlock(&lock) {
            tracing::warn!(storage.root = %self.root.display(), error = %err, "directory unlock failed");
        }
        outcome
    }
}

impl ResourceBackend for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn load_acl(&self, resource_id: &str) -> Result<Option<String>> {
        let Some(mut reader) = self.open_object(resource_id)? else {
            return Ok(None);
        };
        Ok(Some(self.read_header(resource_id, &mut reader)?.acl))
    }

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read_object(resource_id)?.map(|(_, data)| data))
    }

    fn exists(&self, resource_id: &str) -> Result<bool> {
        Ok(self.object_path(resource_id).is_file())
    }

    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()> {
        self.locked(|| {
            if self.object_path(resource_id).exists() {
                return Err(AclError::AclConflict {
                    resource_id: resource_id.to_string(),
                });
            }
            let header = ObjectHeader {
                format: OBJECT_FORMAT,
                resource_id: resource_id.to_string(),
                acl: acl.to_string(),
            };
            self.write_object(&header, data)
        })
    }

    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        self.locked(|| {
            let Some((header, _)) = self.read_object(resource_id)? else {
                return Err(AclError::Backend {
                    reason: format!("resource '{resource_id}' vanished before write"),
                });
            };
            self.write_object(&header, data)
        })
    }

    fn delete(&self, resource_id: &str) -> Result<()> {
        self.locked(|| match fs::remove_file(self.object_path(resource_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        })
    }

    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool> {
        self.locked(|| {
            let Some((mut header, data)) = self.read_object(resource_id)? else {
                return Ok(false);
            };
            if header.acl != expected {
                return Ok(false);
            }
            new.clone_into(&mut header.acl);
            self.write_object(&header, &data)?;
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn objects_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let storage = LocalStorage::open(dir.path()).unwrap();
            storage.create("docs/readme", b"hello\nworld", "v:1|u:u1/o").unwrap();
        }
        let storage = LocalStorage::open(dir.path()).unwrap();
        assert_eq!(
            storage.read("docs/readme").unwrap().as_deref(),
            Some(&b"hello\nworld"[..])
        );
        assert_eq!(
            storage.load_acl("docs/readme").unwrap().as_deref(),
            Some("v:1|u:u1/o")
        );
    }

    #[test]
    fn create_refuses_existing_object() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();
        let err = storage.create("r1", b"two", "v:1|a:a2/o").unwrap_err();
        assert!(matches!(err, AclError::AclConflict { .. }));
    }

    #[test]
    fn write_and_swap_preserve_the_other_half() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();

        storage.write("r1", b"two").unwrap();
        assert_eq!(storage.load_acl("r1").unwrap().as_deref(), Some("v:1|a:a1/o"));

        assert!(!storage.compare_and_swap_acl("r1", "v:1", "v:1|a:a2/o").unwrap());
        assert!(storage.compare_and_swap_acl("r1", "v:1|a:a1/o", "v:1|a:a1/orw").unwrap());
        assert_eq!(storage.read("r1").unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(storage.load_acl("r1").unwrap().as_deref(), Some("v:1|a:a1/orw"));
    }

    #[test]
    fn failed_mutation_reports_its_error_and_releases_lock() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();

        let err = storage.create("r1", b"two", "v:1|a:a2/o").unwrap_err();
        assert!(matches!(err, AclError::AclConflict { .. }));
        let err = storage.write("missing", b"x").unwrap_err();
        assert!(matches!(err, AclError::Backend { .. }));

        storage.write("r1", b"three").unwrap();
        assert_eq!(storage.read("r1").unwrap().as_deref(), Some(&b"three"[..]));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        storage.create("r1", b"one", "v:1|a:a1/o").unwrap();
        storage.delete("r1").unwrap();
        storage.delete("r1").unwrap();
        assert!(!storage.exists("r1").unwrap());
        assert!(storage.load_acl("r1").unwrap().is_none());
    }

    #[test]
    fn corrupt_header_is_a_backend_error() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        fs::write(storage.object_path("r1"), b"not json\npayload").unwrap();
        let err = storage.load_acl("r1").unwrap_err();
        assert!(matches!(err, AclError::Backend { .. }));
    }
}
