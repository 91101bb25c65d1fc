//! Team secrets kept in a JSON file.
//!
//! File shape: `{"<team>": {"<key>": <entry>}}`, where an entry is either a
//! bare string or `{"value": ..., "acl": ...}`. A bare string belongs to its
//! team, which holds `Owner` and `Read` on it. The resource id of a secret is
//! `<team>/<key>`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use atomic_write_file::AtomicWriteFile;
use serde::{Deserialize, Serialize};

use crate::acl::Acl;
use crate::connector::{ResourceBackend, SecureConnector};
use crate::error::{AclError, Result};
use crate::types::{AccessCandidate, AccessLevel, AccessRole};

const SECRET_ID_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum SecretEntry {
    Plain(String),
    Guarded { value: String, acl: String },
}

type Secrets = BTreeMap<String, BTreeMap<String, SecretEntry>>;

impl SecretEntry {
    fn value(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Guarded { value, .. } => value,
        }
    }

    fn acl(&self, team: &str) -> String {
        match self {
            Self::Plain(_) => team_acl(team),
            Self::Guarded { acl, .. } => acl.clone(),
        }
    }
}

fn team_acl(team: &str) -> String {
    let mut acl = Acl::new();
    acl.add_access(AccessRole::Team, team, AccessLevel::Owner)
        .add_access(AccessRole::Team, team, AccessLevel::Read);
    acl.serialize()
}

/// Splits `<team>/<key>`.
fn split_secret_id(resource_id: &str) -> Result<(&str, &str)> {
    match resource_id.split_once(SECRET_ID_SEPARATOR) {
        Some((team, key)) if !team.trim().is_empty() && !key.trim().is_empty() => Ok((team, key)),
        _ => Err(AclError::invalid(format!(
            "secret id '{resource_id}' must look like '<team>/<key>'"
        ))),
    }
}

fn secret_value(resource_id: &str, data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| AclError::invalid(format!("secret '{resource_id}' must be UTF-8")))
}

#[derive(Debug)]
pub struct JsonVault {
    path: PathBuf,
    secrets: RwLock<Secrets>,
}

impl JsonVault {
    /// Loads the vault at `path`. A missing file is an empty vault.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let secrets = match fs::read(&path) {
            Ok(raw) if raw.iter().all(u8::is_ascii_whitespace) => Secrets::new(),
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Secrets::new(),
            Err(err) => return Err(err.into()),
        };
        if let Some(team) = secrets
            .keys()
            .find(|team| team.trim().is_empty() || team.contains(SECRET_ID_SEPARATOR))
        {
            return Err(AclError::invalid(format!(
                "vault team name '{team}' must be non-blank and contain no '{SECRET_ID_SEPARATOR}'"
            )));
        }
        tracing::debug!(
            vault.path = %path.display(),
            vault.teams = secrets.len(),
            "vault loaded"
        );
        Ok(Self {
            path,
            secrets: RwLock::new(secrets),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys stored for `team`, unfiltered.
    pub fn keys(&self, team: &str) -> Result<Vec<String>> {
        Ok(self
            .shared()?
            .get(team)
            .map(|secrets| secrets.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn entry<T>(&self, resource_id: &str, project: impl FnOnce(&str, &SecretEntry) -> T) -> Result<Option<T>> {
        let (team, key) = split_secret_id(resource_id)?;
        Ok(self
            .shared()?
            .get(team)
            .and_then(|secrets| secrets.get(key))
            .map(|entry| project(team, entry)))
    }

    /// Applies `mutate` to a copy of the vault, persists it, then publishes it.
    fn commit<T>(&self, mutate: impl FnOnce(&mut Secrets) -> Result<T>) -> Result<T> {
        let mut secrets = self.exclusive()?;
        let mut next = secrets.clone();
        let outcome = mutate(&mut next)?;
        if next != *secrets {
            self.persist(&next)?;
            *secrets = next;
        }
        Ok(outcome)
    }

    fn persist(&self, secrets: &Secrets) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut staging = AtomicWriteFile::open(&self.path)?;
        serde_json::to_writer_pretty(&mut staging, secrets)?;
        staging.write_all(b"\n")?;
        staging.flush()?;
        staging.commit()?;
        tracing::debug!(vault.path = %self.path.display(), "vault persisted");
        Ok(())
    }

    fn shared(&self) -> Result<RwLockReadGuard<'_, Secrets>> {
        self.secrets
            .read()
            .map_err(|_| AclError::Lock("vault poisoned".into()))
    }

    fn exclusive(&self) -> Result<RwLockWriteGuard<'_, Secrets>> {
        self.secrets
            .write()
            .map_err(|_| AclError::Lock("vault poisoned".into()))
    }
}

impl ResourceBackend for JsonVault {
    fn name(&self) -> &'static str {
        "vault"
    }

    fn load_acl(&self, resource_id: &str) -> Result<Option<String>> {
        self.entry(resource_id, |team, entry| entry.acl(team))
    }

    fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        self.entry(resource_id, |_, entry| entry.value().as_bytes().to_vec())
    }

    fn exists(&self, resource_id: &str) -> Result<bool> {
        Ok(self.entry(resource_id, |_, _| ())?.is_some())
    }

    fn create(&self, resource_id: &str, data: &[u8], acl: &str) -> Result<()> {
        let (team, key) = split_secret_id(resource_id)?;
        let value = secret_value(resource_id, data)?;
        self.commit(|secrets| {
            let team_secrets = secrets.entry(team.to_string()).or_default();
            if team_secrets.contains_key(key) {
                return Err(AclError::AclConflict {
                    resource_id: resource_id.to_string(),
                });
            }
            team_secrets.insert(
                key.to_string(),
                SecretEntry::Guarded {
                    value,
                    acl: acl.to_string(),
                },
            );
            Ok(())
        })
    }

    fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        let (team, key) = split_secret_id(resource_id)?;
        let value = secret_value(resource_id, data)?;
        self.commit(|secrets| {
            let entry = secrets
                .get_mut(team)
                .and_then(|team_secrets| team_secrets.get_mut(key))
                .ok_or_else(|| AclError::Backend {
                    reason: format!("secret '{resource_id}' vanished before write"),
                })?;
            match entry {
                SecretEntry::Plain(current) | SecretEntry::Guarded { value: current, .. } => {
                    *current = value;
                }
            }
            Ok(())
        })
    }

    fn delete(&self, resource_id: &str) -> Result<()> {
        let (team, key) = split_secret_id(resource_id)?;
        self.commit(|secrets| {
            if let Some(team_secrets) = secrets.get_mut(team) {
                team_secrets.remove(key);
                if team_secrets.is_empty() {
                    secrets.remove(team);
                }
            }
            Ok(())
        })
    }

    fn compare_and_swap_acl(&self, resource_id: &str, expected: &str, new: &str) -> Result<bool> {
        let (team, key) = split_secret_id(resource_id)?;
        self.commit(|secrets| {
            let Some(entry) = secrets
                .get_mut(team)
                .and_then(|team_secrets| team_secrets.get_mut(key))
            else {
                return Ok(false);
            };
            if entry.acl(team) != expected {
                return Ok(false);
            }
            *entry = SecretEntry::Guarded {
                value: entry.value().to_string(),
                acl: new.to_string(),
            };
            Ok(true)
        })
    }
}

impl SecureConnector<JsonVault> {
    /// Keys of `team` the candidate may read.
    pub fn list_keys(&self, candidate: &AccessCandidate, team: &str) -> Result<Vec<String>> {
        let mut visible = Vec::new();
        for key in self.backend().keys(team)? {
            let request = candidate.read_request(format!("{team}{SECRET_ID_SEPARATOR}{key}"))?;
            if self.has_access(&request)? {
                visible.push(key);
            }
        }
        Ok(visible)
    }
}
