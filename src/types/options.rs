//! Connector configuration. Loadable from JSON, or built fluently.

use serde::{Deserialize, Serialize};

use super::access::{AccessLevel, AccessRole};
use crate::acl::HashAlgorithm;
use crate::error::Result;

const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;

fn default_true() -> bool {
    true
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

/// Whether holding `Owner` satisfies requests for other levels.
///
/// `Acl::check_exact_access` never treats Owner as a superset; this policy is
/// applied by the connector on top of the exact check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OwnerPolicy {
    /// Owner grants only Owner.
    Exact,
    /// Owner satisfies Read and Write as well.
    #[default]
    Implies,
}

/// A grant added to every ACL created on first write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultGrant {
    pub role: AccessRole,
    pub owner_id: String,
    pub level: AccessLevel,
}

/// Enforcement options for a `SecureConnector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    #[serde(default)]
    pub owner_policy: OwnerPolicy,
    /// Consult the `public` entry when the candidate's own entry denies.
    #[serde(default = "default_true")]
    pub allow_public: bool,
    /// Deny every non-write operation on a missing resource, so that "not
    /// found" and "not permitted" look the same to the caller.
    #[serde(default)]
    pub conceal_missing: bool,
    /// Hash algorithm for ACLs created on first write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_grants: Vec<DefaultGrant>,
    /// When false, a malformed stored ACL denies all instead of erroring.
    #[serde(default = "default_true")]
    pub strict_acl_parse: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            owner_policy: OwnerPolicy::default(),
            allow_public: true,
            conceal_missing: false,
            hash_algorithm: None,
            default_grants: Vec::new(),
            strict_acl_parse: true,
        }
    }
}

impl ConnectorConfig {
    #[must_use]
    pub fn builder() -> ConnectorConfigBuilder {
        ConnectorConfigBuilder::default()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectorConfigBuilder {
    inner: ConnectorConfig,
}

impl ConnectorConfigBuilder {
    #[must_use]
    pub fn owner_policy(mut self, policy: OwnerPolicy) -> Self {
        self.inner.owner_policy = policy;
        self
    }

    #[must_use]
    pub fn allow_public(mut self, allow: bool) -> Self {
        self.inner.allow_public = allow;
        self
    }

    #[must_use]
    pub fn conceal_missing(mut self, conceal: bool) -> Self {
        self.inner.conceal_missing = conceal;
        self
    }

    #[must_use]
    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.inner.hash_algorithm = Some(algorithm);
        self
    }

    #[must_use]
    pub fn default_grant(
        mut self,
        role: AccessRole,
        owner_id: impl Into<String>,
        level: AccessLevel,
    ) -> Self {
        self.inner.default_grants.push(DefaultGrant {
            role,
            owner_id: owner_id.into(),
            level,
        });
        self
    }

    #[must_use]
    pub fn strict_acl_parse(mut self, strict: bool) -> Self {
        self.inner.strict_acl_parse = strict;
        self
    }

    #[must_use]
    pub fn build(self) -> ConnectorConfig {
        self.inner
    }
}

/// Settings for `MemoryCache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_ttl_ms")]
    pub default_ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }
}
