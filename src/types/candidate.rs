//! "Who is asking" and "what they want": candidates, requests and tickets.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::access::{AccessLevel, AccessResult, AccessRole};
use crate::constants::PUBLIC_OWNER_ID;
use crate::error::{AclError, Result};

/// A concrete `(role, id)` pair identifying the principal making a request.
///
/// Constructed fresh per call site and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccessCandidate {
    role: AccessRole,
    id: String,
}

impl AccessCandidate {
    /// Fails with [`AclError::InvalidInput`] when `id` is empty or blank, or
    /// when a public candidate names any id but the public owner id.
    pub fn new(role: AccessRole, id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AclError::invalid(format!("{role} candidate id must not be empty")));
        }
        if role == AccessRole::Public && id != PUBLIC_OWNER_ID {
            return Err(AclError::invalid(format!(
                "public candidate id must be '{PUBLIC_OWNER_ID}', got '{id}'"
            )));
        }
        Ok(Self { role, id })
    }

    pub fn agent(id: impl Into<String>) -> Result<Self> {
        Self::new(AccessRole::Agent, id)
    }

    pub fn user(id: impl Into<String>) -> Result<Self> {
        Self::new(AccessRole::User, id)
    }

    pub fn team(id: impl Into<String>) -> Result<Self> {
        Self::new(AccessRole::Team, id)
    }

    /// The anonymous candidate. Its id is the fixed public owner id.
    #[must_use]
    pub fn public() -> Self {
        Self {
            role: AccessRole::Public,
            id: PUBLIC_OWNER_ID.to_string(),
        }
    }

    #[must_use]
    pub fn role(&self) -> AccessRole {
        self.role
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request(&self, resource_id: impl Into<String>, level: AccessLevel) -> Result<AccessRequest> {
        AccessRequest::new(self.clone(), resource_id, [level])
    }

    /// Request requiring every level in `levels`.
    pub fn request_all(
        &self,
        resource_id: impl Into<String>,
        levels: &[AccessLevel],
    ) -> Result<AccessRequest> {
        AccessRequest::new(self.clone(), resource_id, levels.iter().copied())
    }

    pub fn read_request(&self, resource_id: impl Into<String>) -> Result<AccessRequest> {
        self.request(resource_id, AccessLevel::Read)
    }

    pub fn write_request(&self, resource_id: impl Into<String>) -> Result<AccessRequest> {
        self.request(resource_id, AccessLevel::Write)
    }

    pub fn owner_request(&self, resource_id: impl Into<String>) -> Result<AccessRequest> {
        self.request(resource_id, AccessLevel::Owner)
    }
}

impl fmt::Display for AccessCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

/// A candidate plus the resource and level(s) it needs.
///
/// Multiple levels are a conjunction: every level must be held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessRequest {
    id: Uuid,
    resource_id: String,
    candidate: AccessCandidate,
    levels: Vec<AccessLevel>,
}

impl AccessRequest {
    pub fn new(
        candidate: AccessCandidate,
        resource_id: impl Into<String>,
        levels: impl IntoIterator<Item = AccessLevel>,
    ) -> Result<Self> {
        let resource_id = resource_id.into();
        if resource_id.trim().is_empty() {
            return Err(AclError::invalid("resource id must not be empty"));
        }
        let mut levels: Vec<AccessLevel> = levels.into_iter().collect();
        levels.sort_unstable();
        levels.dedup();
        if levels.is_empty() {
            return Err(AclError::invalid(format!(
                "request for '{resource_id}' names no access level"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            resource_id,
            candidate,
            levels,
        })
    }

    /// Correlation id, unique per request.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    #[must_use]
    pub fn candidate(&self) -> &AccessCandidate {
        &self.candidate
    }

    #[must_use]
    pub fn levels(&self) -> &[AccessLevel] {
        &self.levels
    }

    /// Same correlation id and resource, single `level`.
    #[must_use]
    pub fn with_level(&self, level: AccessLevel) -> Self {
        Self {
            id: self.id,
            resource_id: self.resource_id.clone(),
            candidate: self.candidate.clone(),
            levels: vec![level],
        }
    }

    /// Same correlation id, resource and levels, asked on behalf of `candidate`.
    #[must_use]
    pub fn with_candidate(&self, candidate: AccessCandidate) -> Self {
        Self {
            id: self.id,
            resource_id: self.resource_id.clone(),
            candidate,
            levels: self.levels.clone(),
        }
    }
}

/// Audit record of one evaluation. Never accepted as authorization.
#[derive(Debug, Clone, Serialize)]
pub struct AccessTicket {
    pub request: AccessRequest,
    pub access: AccessResult,
    pub issued_at: DateTime<Utc>,
}

impl AccessTicket {
    #[must_use]
    pub fn new(request: AccessRequest, access: AccessResult) -> Self {
        Self {
            request,
            access,
            issued_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.access.is_granted()
    }
}
