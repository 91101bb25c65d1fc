//! Error types for ACL parsing, access evaluation, and connector I/O.

use thiserror::Error;

use crate::types::{AccessCandidate, AccessLevel};

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, AclError>;

/// Coarse classification of an [`AclError`].
///
/// HTTP-facing callers map `Malformed` and `InvalidInput` to 400, `Denied` to
/// 403 and `Backend` to 500.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Malformed,
    Denied,
    InvalidInput,
    Backend,
}

#[derive(Debug, Error)]
pub enum AclError {
    /// A serialized ACL could not be parsed.
    #[error("malformed ACL at byte {offset}: {reason}")]
    MalformedAcl { offset: usize, reason: String },

    /// A well-formed request was evaluated and denied.
    #[error("access denied: {candidate} lacks {levels:?} on resource '{resource_id}'")]
    AccessDenied {
        resource_id: String,
        candidate: AccessCandidate,
        levels: Vec<AccessLevel>,
    },

    /// Rejected at construction time (unknown role/level, empty id, ...).
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The stored ACL changed between load and compare-and-swap.
    #[error("ACL for resource '{resource_id}' was modified concurrently")]
    AclConflict { resource_id: String },

    #[error("lock error: {0}")]
    Lock(String),

    #[error("backend error: {reason}")]
    Backend { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AclError {
    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedAcl {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedAcl { .. } => ErrorKind::Malformed,
            Self::AccessDenied { .. } => ErrorKind::Denied,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::AclConflict { .. }
            | Self::Lock(_)
            | Self::Backend { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Backend,
        }
    }

    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}
