//! Public value types exposed by the `sre-acl` crate.

pub mod access;
pub mod candidate;
pub mod options;

pub use access::{AccessLevel, AccessResult, AccessRole};
pub use candidate::{AccessCandidate, AccessRequest, AccessTicket};
pub use options::{
    CacheSettings, ConnectorConfig, ConnectorConfigBuilder, DefaultGrant, OwnerPolicy,
};
