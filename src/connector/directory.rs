//! Team membership lookup used for inherited access.

use std::collections::HashMap;

use crate::error::Result;
use crate::types::{AccessCandidate, AccessRole};

/// Resolves the team an agent or user belongs to.
///
/// When a connector has a directory, a candidate whose own entry denies is
/// re-checked as its team.
pub trait TeamDirectory: Send + Sync {
    fn team_of(&self, candidate: &AccessCandidate) -> Result<Option<String>>;
}

/// Fixed membership table.
#[derive(Debug, Clone, Default)]
pub struct StaticTeamDirectory {
    members: HashMap<AccessCandidate, String>,
}

impl StaticTeamDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `candidate` to `team_id`. Team and public candidates are ignored.
    #[must_use]
    pub fn with_member(mut self, candidate: AccessCandidate, team_id: impl Into<String>) -> Self {
        if matches!(candidate.role(), AccessRole::Agent | AccessRole::User) {
            self.members.insert(candidate, team_id.into());
        }
        self
    }
}

impl TeamDirectory for StaticTeamDirectory {
    fn team_of(&self, candidate: &AccessCandidate) -> Result<Option<String>> {
        Ok(self.members.get(candidate).cloned())
    }
}
