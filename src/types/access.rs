//! Access level and role vocabulary with their compact short codes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AclError;

/// Capability granted to an owner id.
///
/// Variant order is the canonical order used by the compact codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Explicit negative marker. Never satisfies a request for another level.
    None,
    Owner,
    Read,
    Write,
}

impl AccessLevel {
    pub const ALL: [Self; 4] = [Self::None, Self::Owner, Self::Read, Self::Write];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Owner => "owner",
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::None => 'n',
            Self::Owner => 'o',
            Self::Read => 'r',
            Self::Write => 'w',
        }
    }

    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.code() == code)
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| AclError::invalid(format!("unknown access level '{s}'")))
    }
}

/// Category of principal holding rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Agent,
    User,
    Team,
    Public,
}

impl AccessRole {
    pub const ALL: [Self; 4] = [Self::Agent, Self::User, Self::Team, Self::Public];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::User => "user",
            Self::Team => "team",
            Self::Public => "public",
        }
    }

    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Agent => 'a',
            Self::User => 'u',
            Self::Team => 't',
            Self::Public => 'p',
        }
    }

    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }
}

impl fmt::Display for AccessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessRole {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| AclError::invalid(format!("unknown access role '{s}'")))
    }
}

/// Outcome of an access evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessResult {
    Granted,
    Denied,
}

impl AccessResult {
    #[must_use]
    pub fn from_bool(granted: bool) -> Self {
        if granted { Self::Granted } else { Self::Denied }
    }

    #[must_use]
    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_codes_are_unique() {
        let level_codes: std::collections::HashSet<char> =
            AccessLevel::ALL.iter().map(|l| l.code()).collect();
        let role_codes: std::collections::HashSet<char> =
            AccessRole::ALL.iter().map(|r| r.code()).collect();
        assert_eq!(level_codes.len(), AccessLevel::ALL.len());
        assert_eq!(role_codes.len(), AccessRole::ALL.len());
        for level in AccessLevel::ALL {
            assert_eq!(AccessLevel::from_code(level.code()), Some(level));
        }
        for role in AccessRole::ALL {
            assert_eq!(AccessRole::from_code(role.code()), Some(role));
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("WRITE".parse::<AccessLevel>().unwrap(), AccessLevel::Write);
        assert_eq!(" Team ".parse::<AccessRole>().unwrap(), AccessRole::Team);
    }

    #[test]
    fn unknown_names_fail_fast() {
        let err = "admin".parse::<AccessLevel>().unwrap_err();
        assert!(matches!(err, AclError::InvalidInput { .. }));
        let err = "group".parse::<AccessRole>().unwrap_err();
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&AccessLevel::Owner).unwrap();
        assert_eq!(json, "\"owner\"");
        let role: AccessRole = serde_json::from_str("\"public\"").unwrap();
        assert_eq!(role, AccessRole::Public);
    }
}
