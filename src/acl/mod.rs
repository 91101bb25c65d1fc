//! Per-resource access control list.
//!
//! An [`Acl`] maps role → owner id → set of [`AccessLevel`]s. It is a plain
//! value: it holds no registry of resources and performs no I/O. Connectors
//! load it from resource metadata, ask [`Acl::check_exact_access`], and
//! persist it back through their own storage.
//!
//! Invariants:
//! - an empty ACL denies every request;
//! - no owner entry has an empty level set and no role maps to an empty
//!   owner map, so structurally equal ACLs serialize identically;
//! - `Owner` is a separate marker and does not imply `Read` or `Write` here.

mod codec;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::PUBLIC_OWNER_ID;
use crate::error::{AclError, Result};
use crate::types::{AccessLevel, AccessRequest, AccessRole};

/// Owner id → granted levels, for one role.
pub type OwnerEntries = BTreeMap<String, BTreeSet<AccessLevel>>;
/// Role → owner entries.
pub type AclEntries = BTreeMap<AccessRole, OwnerEntries>;

/// How owner ids are stored inside an ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// Owner ids stored verbatim.
    None,
    /// Owner ids stored as the hex BLAKE3 digest of the id.
    Blake3,
}

impl HashAlgorithm {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Blake3 => "blake3",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "none" => Some(Self::None),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }

    #[must_use]
    pub fn digest(self, owner_id: &str) -> String {
        match self {
            Self::None => owner_id.to_string(),
            Self::Blake3 => hex::encode(blake3::hash(owner_id.as_bytes()).as_bytes()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "AclModel")]
pub struct Acl {
    #[serde(skip_serializing_if = "Option::is_none")]
    hash_algorithm: Option<HashAlgorithm>,
    entries: AclEntries,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    migrated: bool,
}

/// Deserialization shape of [`Acl`]; converted through `prune`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AclModel {
    #[serde(default)]
    hash_algorithm: Option<HashAlgorithm>,
    #[serde(default)]
    entries: AclEntries,
    #[serde(default)]
    migrated: bool,
}

impl From<AclModel> for Acl {
    fn from(model: AclModel) -> Self {
        let mut acl = Self {
            hash_algorithm: model.hash_algorithm,
            entries: model.entries,
            migrated: model.migrated,
        };
        acl.prune();
        acl
    }
}

impl Acl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ACL whose owner ids will be stored through `algorithm`.
    #[must_use]
    pub fn with_hash_algorithm(algorithm: HashAlgorithm) -> Self {
        Self {
            hash_algorithm: Some(algorithm),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> Option<HashAlgorithm> {
        self.hash_algorithm
    }

    #[must_use]
    pub fn is_migrated(&self) -> bool {
        self.migrated
    }

    pub fn mark_migrated(&mut self) -> &mut Self {
        self.migrated = true;
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &AclEntries {
        &self.entries
    }

    fn key_for(&self, owner_id: &str) -> String {
        match self.hash_algorithm {
            Some(algorithm) => algorithm.digest(owner_id),
            None => owner_id.to_string(),
        }
    }

    /// Grants `level` to `(role, owner_id)`. Idempotent.
    ///
    /// Blank owner ids are ignored: they can never match a candidate.
    pub fn add_access(&mut self, role: AccessRole, owner_id: &str, level: AccessLevel) -> &mut Self {
        if owner_id.trim().is_empty() {
            tracing::warn!(acl.role = %role, acl.level = %level, "ignoring grant to blank owner id");
            return self;
        }
        let key = self.key_for(owner_id);
        self.entries
            .entry(role)
            .or_default()
            .entry(key)
            .or_default()
            .insert(level);
        self
    }

    /// Removes `level` from `(role, owner_id)`, pruning emptied entries.
    pub fn remove_access(
        &mut self,
        role: AccessRole,
        owner_id: &str,
        level: AccessLevel,
    ) -> &mut Self {
        let key = self.key_for(owner_id);
        let Some(owners) = self.entries.get_mut(&role) else {
            return self;
        };
        if let Some(levels) = owners.get_mut(&key) {
            levels.remove(&level);
            if levels.is_empty() {
                owners.remove(&key);
            }
        }
        if owners.is_empty() {
            self.entries.remove(&role);
        }
        self
    }

    pub fn add_public_access(&mut self, level: AccessLevel) -> &mut Self {
        self.add_access(AccessRole::Public, PUBLIC_OWNER_ID, level)
    }

    pub fn remove_public_access(&mut self, level: AccessLevel) -> &mut Self {
        self.remove_access(AccessRole::Public, PUBLIC_OWNER_ID, level)
    }

    /// Levels held by `(role, owner_id)`, if any.
    #[must_use]
    pub fn levels(&self, role: AccessRole, owner_id: &str) -> Option<&BTreeSet<AccessLevel>> {
        self.entries.get(&role)?.get(&self.key_for(owner_id))
    }

    /// Stored owner keys for `role` (hashed when a hash algorithm is set).
    pub fn owners(&self, role: AccessRole) -> impl Iterator<Item = &str> {
        self.entries
            .get(&role)
            .into_iter()
            .flat_map(|owners| owners.keys().map(String::as_str))
    }

    /// True iff the candidate's exact `(role, id)` entry holds every requested level.
    #[must_use]
    pub fn check_exact_access(&self, request: &AccessRequest) -> bool {
        let candidate = request.candidate();
        let Some(held) = self.levels(candidate.role(), candidate.id()) else {
            return false;
        };
        let required = request.levels();
        !required.is_empty() && required.iter().all(|level| held.contains(level))
    }

    /// Compact single-line form, see the crate docs for the grammar.
    #[must_use]
    pub fn serialize(&self) -> String {
        codec::encode(self)
    }

    /// Inverse of [`Acl::serialize`]. Blank input yields an empty ACL.
    pub fn deserialize(raw: &str) -> Result<Self> {
        codec::decode(raw)
    }

    /// Like [`Acl::deserialize`], but malformed input yields an empty,
    /// deny-all ACL.
    #[must_use]
    pub fn deserialize_or_deny(raw: &str) -> Self {
        match codec::decode(raw) {
            Ok(acl) => acl,
            Err(err) => {
                tracing::warn!(error = %err, "malformed ACL treated as deny-all");
                Self::default()
            }
        }
    }

    /// Builds an ACL from its JSON model.
    ///
    /// Accepts the current shape (`{"hashAlgorithm", "entries", "migrated"}`)
    /// and the legacy shape with roles at the top level, which is converted
    /// and flagged as migrated.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| AclError::malformed(err.column(), format!("invalid ACL JSON: {err}")))?;
        let Value::Object(map) = &value else {
            return Err(AclError::malformed(0, "ACL JSON must be an object"));
        };

        let is_legacy = !map.is_empty()
            && map
                .keys()
                .all(|key| key.parse::<AccessRole>().is_ok());

        let mut acl = if is_legacy {
            let entries: AclEntries = serde_json::from_value(value)
                .map_err(|err| AclError::malformed(0, format!("invalid legacy ACL: {err}")))?;
            Self {
                hash_algorithm: None,
                entries,
                migrated: true,
            }
        } else {
            serde_json::from_value::<Self>(value)
                .map_err(|err| AclError::malformed(0, format!("invalid ACL model: {err}")))?
        };
        acl.prune();
        Ok(acl)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn prune(&mut self) {
        for owners in self.entries.values_mut() {
            owners.retain(|owner, levels| !owner.trim().is_empty() && !levels.is_empty());
        }
        self.entries.retain(|_, owners| !owners.is_empty());
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for Acl {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        Self::deserialize(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessCandidate;

    fn agent(id: &str) -> AccessCandidate {
        AccessCandidate::agent(id).unwrap()
    }

    fn scenario_acl() -> Acl {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::Agent, "a1", AccessLevel::Write)
            .add_access(AccessRole::Agent, "a1", AccessLevel::Read)
            .add_access(AccessRole::Team, "t1", AccessLevel::Read);
        acl
    }

    #[test]
    fn empty_acl_denies_everything() {
        let acl = Acl::new();
        for level in AccessLevel::ALL {
            let request = agent("a1").request("r1", level).unwrap();
            assert!(!acl.check_exact_access(&request));
        }
        let public = AccessCandidate::public().read_request("r1").unwrap();
        assert!(!acl.check_exact_access(&public));
    }

    #[test]
    fn granted_writer_passes_and_stranger_fails() {
        let acl = scenario_acl();
        assert!(acl.check_exact_access(&agent("a1").write_request("r1").unwrap()));
        assert!(!acl.check_exact_access(&agent("a2").write_request("r1").unwrap()));
    }

    #[test]
    fn check_survives_serialization() {
        let acl = scenario_acl();
        let restored = Acl::deserialize(&acl.serialize()).unwrap();
        assert_eq!(restored, acl);
        assert!(restored.check_exact_access(&agent("a1").write_request("r1").unwrap()));
    }

    #[test]
    fn add_access_is_idempotent() {
        let mut once = Acl::new();
        once.add_access(AccessRole::User, "u1", AccessLevel::Read);
        let mut twice = Acl::new();
        twice
            .add_access(AccessRole::User, "u1", AccessLevel::Read)
            .add_access(AccessRole::User, "u1", AccessLevel::Read);
        assert_eq!(once, twice);
        assert_eq!(once.serialize(), twice.serialize());
    }

    #[test]
    fn multi_level_requests_are_conjunctive() {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::User, "u1", AccessLevel::Read);
        let user = AccessCandidate::user("u1").unwrap();

        let both = user
            .request_all("r1", &[AccessLevel::Read, AccessLevel::Write])
            .unwrap();
        assert!(!acl.check_exact_access(&both));
        assert!(acl.check_exact_access(&user.request_all("r1", &[AccessLevel::Read]).unwrap()));
    }

    #[test]
    fn removing_last_level_prunes_owner_and_role() {
        let mut acl = scenario_acl();
        acl.remove_access(AccessRole::Team, "t1", AccessLevel::Read);

        assert!(acl.levels(AccessRole::Team, "t1").is_none());
        assert!(!acl.entries().contains_key(&AccessRole::Team));
        let team = AccessCandidate::team("t1").unwrap();
        assert!(!acl.check_exact_access(&team.read_request("r1").unwrap()));
        assert!(!acl.serialize().contains("t1"));

        acl.remove_access(AccessRole::Agent, "a1", AccessLevel::Read);
        assert_eq!(
            acl.levels(AccessRole::Agent, "a1").map(BTreeSet::len),
            Some(1),
            "write is still held"
        );
    }

    #[test]
    fn removing_absent_entries_is_a_no_op() {
        let mut acl = scenario_acl();
        let before = acl.clone();
        acl.remove_access(AccessRole::User, "nobody", AccessLevel::Read)
            .remove_access(AccessRole::Agent, "a1", AccessLevel::Owner);
        assert_eq!(acl, before);
    }

    #[test]
    fn role_and_id_form_the_key() {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::Agent, "agent1", AccessLevel::Read);
        let team = AccessCandidate::team("agent1").unwrap();
        assert!(!acl.check_exact_access(&team.read_request("r1").unwrap()));
    }

    #[test]
    fn owner_alone_does_not_satisfy_read() {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::User, "user1", AccessLevel::Owner);
        let user = AccessCandidate::user("user1").unwrap();
        assert!(!acl.check_exact_access(&user.read_request("r1").unwrap()));
        assert!(acl.check_exact_access(&user.owner_request("r1").unwrap()));
    }

    #[test]
    fn none_level_is_an_explicit_marker() {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::Agent, "a1", AccessLevel::None);
        let a1 = agent("a1");
        assert!(!acl.check_exact_access(&a1.read_request("r1").unwrap()));
        assert!(acl.check_exact_access(&a1.request("r1", AccessLevel::None).unwrap()));
        assert!(acl.serialize().contains("a1/n"));
    }

    #[test]
    fn clone_is_independent() {
        let source = scenario_acl();
        let mut copy = source.clone();
        copy.add_access(AccessRole::User, "u9", AccessLevel::Write);
        assert!(source.levels(AccessRole::User, "u9").is_none());
        assert_ne!(copy, source);
    }

    #[test]
    fn blank_owner_ids_are_ignored() {
        let mut acl = Acl::new();
        acl.add_access(AccessRole::Agent, "  ", AccessLevel::Read);
        assert!(acl.is_empty());
    }

    #[test]
    fn hashed_acl_hides_raw_ids_but_still_matches() {
        let mut acl = Acl::with_hash_algorithm(HashAlgorithm::Blake3);
        acl.add_access(AccessRole::Agent, "agent-secret-id", AccessLevel::Read);

        let serialized = acl.serialize();
        assert!(!serialized.contains("agent-secret-id"));
        assert!(serialized.contains("h:blake3"));

        let restored = Acl::deserialize(&serialized).unwrap();
        assert_eq!(restored, acl);
        let request = agent("agent-secret-id").read_request("r1").unwrap();
        assert!(restored.check_exact_access(&request));
        assert!(!restored.check_exact_access(&agent("other").read_request("r1").unwrap()));
    }

    #[test]
    fn public_grants_use_public_owner() {
        let mut acl = Acl::new();
        acl.add_public_access(AccessLevel::Read);
        let public = AccessCandidate::public().read_request("r1").unwrap();
        assert!(acl.check_exact_access(&public));
        acl.remove_public_access(AccessLevel::Read);
        assert!(acl.is_empty());
    }

    #[test]
    fn legacy_json_is_migrated() {
        let acl = Acl::from_json(r#"{"agent":{"a1":["read","write"]},"team":{"t1":[]}}"#).unwrap();
        assert!(acl.is_migrated());
        assert!(acl.check_exact_access(&agent("a1").write_request("r1").unwrap()));
        assert!(!acl.entries().contains_key(&AccessRole::Team), "empty sets are pruned");

        let restored = Acl::deserialize(&acl.serialize()).unwrap();
        assert_eq!(restored, acl);
        assert!(restored.is_migrated());
    }

    #[test]
    fn json_model_round_trips() {
        let mut acl = scenario_acl();
        acl.mark_migrated();
        let json = acl.to_json().unwrap();
        assert!(json.contains("\"entries\""));
        let restored = Acl::from_json(&json).unwrap();
        assert_eq!(restored, acl);
    }

    #[test]
    fn invalid_json_is_malformed() {
        for raw in ["[1,2]", "{\"agent\":{\"a1\":[\"admin\"]}}", "not json"] {
            let err = Acl::from_json(raw).unwrap_err();
            assert!(matches!(err, AclError::MalformedAcl { .. }), "{raw}: {err:?}");
        }
    }

    #[test]
    fn lenient_parse_denies_on_garbage() {
        let acl = Acl::deserialize_or_deny("x:???");
        assert!(acl.is_empty());
    }

    #[test]
    fn serde_model_is_pruned_on_load() {
        let acl: Acl = serde_json::from_str(
            r#"{"entries": {"agent": {"a1": [], " ": ["read"], "a2": ["read"]}, "team": {}}}"#,
        )
        .unwrap();
        assert_eq!(acl.owners(AccessRole::Agent).collect::<Vec<_>>(), vec!["a2"]);
        assert!(!acl.entries().contains_key(&AccessRole::Team));
        assert_eq!(acl.serialize(), "v:1|a:a2/r");

        let empty: Acl = serde_json::from_str(r#"{"entries": {"user": {"u1": []}}}"#).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty, Acl::new());
    }
}
