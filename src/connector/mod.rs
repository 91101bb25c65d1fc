//! Access-gated resource connectors.
//!
//! Every operation of a [`SecureConnector`] follows the same contract:
//! derive an [`AccessRequest`] for the candidate, load the resource ACL from
//! the backend, evaluate, and only then touch the medium. Denials surface as
//! [`AclError::AccessDenied`] with no I/O beyond the ACL fetch.
//!
//! Evaluation order on an existing resource:
//! 1. the candidate's exact entry (plus `Owner` when [`OwnerPolicy::Implies`]);
//! 2. the public entry, when `allow_public` is set;
//! 3. the candidate's team, when a [`TeamDirectory`] is attached.
//!
//! A missing resource has no ACL. Writing it makes the writer its `Owner`,
//! in the same backend call that stores the data. Other operations on a
//! missing resource observe absence, or are denied when `conceal_missing`
//! is set.

mod backend;
mod directory;
mod locks;

use std::sync::Arc;

pub use backend::ResourceBackend;
pub use directory::{StaticTeamDirectory, TeamDirectory};
use locks::ResourceLocks;

use crate::acl::Acl;
use crate::error::{AclError, Result};
use crate::types::{
    AccessCandidate, AccessLevel, AccessRequest, AccessResult, AccessRole, AccessTicket,
    ConnectorConfig, OwnerPolicy,
};

pub struct SecureConnector<B> {
    backend: B,
    config: ConnectorConfig,
    directory: Option<Arc<dyn TeamDirectory>>,
    locks: ResourceLocks,
}

impl<B: ResourceBackend> SecureConnector<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, ConnectorConfig::default())
    }

    pub fn with_config(backend: B, config: ConnectorConfig) -> Self {
        Self {
            backend,
            config,
            directory: None,
            locks: ResourceLocks::default(),
        }
    }

    #[must_use]
    pub fn with_team_directory(mut self, directory: Arc<dyn TeamDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Binds `candidate` for fluent calls.
    pub fn requester(&self, candidate: AccessCandidate) -> Requester<'_, B> {
        Requester {
            connector: self,
            candidate,
        }
    }

    /// Stored ACL of `resource_id`, `None` when the resource does not exist.
    pub fn resource_acl(&self, resource_id: &str) -> Result<Option<Acl>> {
        match self.backend.load_acl(resource_id)? {
            Some(raw) => self.parse_acl(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Evaluates `request` against the stored ACL.
    ///
    /// Returns the granted ticket, or `AccessDenied`.
    pub fn authorize(&self, request: &AccessRequest) -> Result<AccessTicket> {
        let acl = self.resource_acl(request.resource_id())?;
        self.check(request, acl.as_ref())
    }

    pub fn has_access(&self, request: &AccessRequest) -> Result<bool> {
        match self.authorize(request) {
            Ok(_) => Ok(true),
            Err(err) if err.is_access_denied() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn read(&self, candidate: &AccessCandidate, resource_id: &str) -> Result<Option<Vec<u8>>> {
        self.gated_read(candidate, resource_id, |backend| backend.read(resource_id))
            .map(Option::flatten)
    }

    pub fn exists(&self, candidate: &AccessCandidate, resource_id: &str) -> Result<bool> {
        self.gated_read(candidate, resource_id, |backend| backend.exists(resource_id))
            .map(|found| found.unwrap_or(false))
    }

    /// Writes `data`. The first writer of a resource becomes its owner.
    pub fn write(&self, candidate: &AccessCandidate, resource_id: &str, data: &[u8]) -> Result<()> {
        self.gated_write(
            candidate,
            resource_id,
            |backend, acl| backend.create(resource_id, data, acl),
            |backend| backend.write(resource_id, data),
        )
    }

    pub fn delete(&self, candidate: &AccessCandidate, resource_id: &str) -> Result<()> {
        let request = candidate.write_request(resource_id)?;
        let _guard = self.locks.acquire(resource_id)?;
        let acl = self.resource_acl(resource_id)?;
        self.check(&request, acl.as_ref())?;
        if acl.is_none() {
            return Ok(());
        }
        self.backend.delete(resource_id)
    }

    pub fn get_acl(&self, candidate: &AccessCandidate, resource_id: &str) -> Result<Option<Acl>> {
        let request = candidate.read_request(resource_id)?;
        let _guard = self.locks.acquire(resource_id)?;
        let acl = self.resource_acl(resource_id)?;
        self.check(&request, acl.as_ref())?;
        Ok(acl)
    }

    /// Replaces the ACL of an existing resource. Requires `Owner`.
    pub fn set_acl(&self, candidate: &AccessCandidate, resource_id: &str, acl: &Acl) -> Result<()> {
        self.update_acl(candidate, resource_id, |current| *current = acl.clone())
            .map(|_| ())
    }

    /// Read-modify-write of an existing resource's ACL. Requires `Owner`.
    ///
    /// Runs under the resource lock and persists through compare-and-swap,
    /// failing with `AclConflict` if another writer got there first.
    pub fn update_acl<F>(
        &self,
        candidate: &AccessCandidate,
        resource_id: &str,
        mutate: F,
    ) -> Result<Acl>
    where
        F: FnOnce(&mut Acl),
    {
        let request = candidate.owner_request(resource_id)?;
        let _guard = self.locks.acquire(resource_id)?;
        let Some(raw) = self.backend.load_acl(resource_id)? else {
            self.check(&request, None)?;
            return Err(AclError::invalid(format!(
                "cannot set ACL on missing resource '{resource_id}'"
            )));
        };
        let mut acl = self.parse_acl(&raw)?;
        self.check(&request, Some(&acl))?;

        mutate(&mut acl);
        let serialized = acl.serialize();
        if !self
            .backend
            .compare_and_swap_acl(resource_id, &raw, &serialized)?
        {
            return Err(AclError::AclConflict {
                resource_id: resource_id.to_string(),
            });
        }
        tracing::info!(
            acl.backend = self.backend.name(),
            acl.resource_id = resource_id,
            acl.candidate = %candidate,
            "resource ACL updated"
        );
        Ok(acl)
    }

    /// Shared read path: `fetch` runs only for an existing resource the
    /// candidate may read, under the same resource lock as the ACL check, so
    /// a concurrent delete, recreate or revoke cannot land in between.
    /// `None` means the resource does not exist.
    pub(crate) fn gated_read<T, F>(
        &self,
        candidate: &AccessCandidate,
        resource_id: &str,
        fetch: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&B) -> Result<T>,
    {
        let request = candidate.read_request(resource_id)?;
        let _guard = self.locks.acquire(resource_id)?;
        let acl = self.resource_acl(resource_id)?;
        self.check(&request, acl.as_ref())?;
        if acl.is_none() {
            return Ok(None);
        }
        fetch(&self.backend).map(Some)
    }

    /// Shared write path: `create` runs for a missing resource with the
    /// serialized initial ACL, `update` runs for an existing one.
    pub(crate) fn gated_write<C, U>(
        &self,
        candidate: &AccessCandidate,
        resource_id: &str,
        create: C,
        update: U,
    ) -> Result<()>
    where
        C: FnOnce(&B, &str) -> Result<()>,
        U: FnOnce(&B) -> Result<()>,
    {
        let request = candidate.write_request(resource_id)?;
        let _guard = self.locks.acquire(resource_id)?;

        if let Some(acl) = self.resource_acl(resource_id)? {
            self.check(&request, Some(&acl))?;
            return update(&self.backend);
        }

        // Anonymous callers cannot become owners.
        let granted = candidate.role() != AccessRole::Public;
        let ticket = AccessTicket::new(request, AccessResult::from_bool(granted));
        self.record(&ticket, true);
        if !granted {
            return Err(denied(&ticket.request));
        }

        let acl = self.initial_acl(candidate);
        tracing::info!(
            acl.backend = self.backend.name(),
            acl.resource_id = resource_id,
            acl.owner = %candidate,
            "assigning ownership on create"
        );
        create(&self.backend, &acl.serialize())
    }

    pub(crate) fn check(&self, request: &AccessRequest, acl: Option<&Acl>) -> Result<AccessTicket> {
        let granted = match acl {
            Some(acl) => self.evaluate(acl, request)?,
            None => !self.config.conceal_missing,
        };
        let ticket = AccessTicket::new(request.clone(), AccessResult::from_bool(granted));
        self.record(&ticket, acl.is_none());
        if granted {
            Ok(ticket)
        } else {
            Err(denied(request))
        }
    }

    fn evaluate(&self, acl: &Acl, request: &AccessRequest) -> Result<bool> {
        if self.holds(acl, request) {
            return Ok(true);
        }

        let candidate = request.candidate();
        if self.config.allow_public
            && candidate.role() != AccessRole::Public
            && acl.check_exact_access(&request.with_candidate(AccessCandidate::public()))
        {
            return Ok(true);
        }

        let Some(directory) = &self.directory else {
            return Ok(false);
        };
        if !matches!(candidate.role(), AccessRole::Agent | AccessRole::User) {
            return Ok(false);
        }
        let Some(team_id) = directory.team_of(candidate)? else {
            return Ok(false);
        };
        // A blank team id is no membership.
        let Ok(team) = AccessCandidate::team(team_id) else {
            return Ok(false);
        };
        Ok(self.holds(acl, &request.with_candidate(team)))
    }

    fn holds(&self, acl: &Acl, request: &AccessRequest) -> bool {
        if acl.check_exact_access(request) {
            return true;
        }
        self.config.owner_policy == OwnerPolicy::Implies
            && !request.levels().contains(&AccessLevel::None)
            && acl.check_exact_access(&request.with_level(AccessLevel::Owner))
    }

    fn initial_acl(&self, owner: &AccessCandidate) -> Acl {
        let mut acl = match self.config.hash_algorithm {
            Some(algorithm) => Acl::with_hash_algorithm(algorithm),
            None => Acl::new(),
        };
        acl.add_access(owner.role(), owner.id(), AccessLevel::Owner);
        if self.config.owner_policy == OwnerPolicy::Exact {
            acl.add_access(owner.role(), owner.id(), AccessLevel::Read)
                .add_access(owner.role(), owner.id(), AccessLevel::Write);
        }
        for grant in &self.config.default_grants {
            acl.add_access(grant.role, &grant.owner_id, grant.level);
        }
        acl
    }

    fn parse_acl(&self, raw: &str) -> Result<Acl> {
        if self.config.strict_acl_parse {
            Acl::deserialize(raw)
        } else {
            Ok(Acl::deserialize_or_deny(raw))
        }
    }

    fn record(&self, ticket: &AccessTicket, missing: bool) {
        let request = &ticket.request;
        if ticket.is_granted() {
            tracing::debug!(
                acl.backend = self.backend.name(),
                acl.request_id = %request.id(),
                acl.resource_id = request.resource_id(),
                acl.candidate = %request.candidate(),
                acl.levels = ?request.levels(),
                acl.missing = missing,
                "access granted"
            );
        } else {
            tracing::warn!(
                acl.backend = self.backend.name(),
                acl.request_id = %request.id(),
                acl.resource_id = request.resource_id(),
                acl.candidate = %request.candidate(),
                acl.levels = ?request.levels(),
                acl.missing = missing,
                "access denied"
            );
        }
    }
}

fn denied(request: &AccessRequest) -> AclError {
    AclError::AccessDenied {
        resource_id: request.resource_id().to_string(),
        candidate: request.candidate().clone(),
        levels: request.levels().to_vec(),
    }
}

/// A candidate bound to a connector.
pub struct Requester<'a, B> {
    connector: &'a SecureConnector<B>,
    candidate: AccessCandidate,
}

impl<B: ResourceBackend> Requester<'_, B> {
    #[must_use]
    pub fn candidate(&self) -> &AccessCandidate {
        &self.candidate
    }

    pub fn read(&self, resource_id: &str) -> Result<Option<Vec<u8>>> {
        self.connector.read(&self.candidate, resource_id)
    }

    pub fn exists(&self, resource_id: &str) -> Result<bool> {
        self.connector.exists(&self.candidate, resource_id)
    }

    pub fn write(&self, resource_id: &str, data: &[u8]) -> Result<()> {
        self.connector.write(&self.candidate, resource_id, data)
    }

    pub fn delete(&self, resource_id: &str) -> Result<()> {
        self.connector.delete(&self.candidate, resource_id)
    }

    pub fn get_acl(&self, resource_id: &str) -> Result<Option<Acl>> {
        self.connector.get_acl(&self.candidate, resource_id)
    }

    pub fn set_acl(&self, resource_id: &str, acl: &Acl) -> Result<()> {
        self.connector.set_acl(&self.candidate, resource_id, acl)
    }

    pub fn update_acl<F: FnOnce(&mut Acl)>(&self, resource_id: &str, mutate: F) -> Result<Acl> {
        self.connector.update_acl(&self.candidate, resource_id, mutate)
    }
}
