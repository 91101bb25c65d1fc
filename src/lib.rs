#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(test, allow(clippy::uninlined_format_args))]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing. Public APIs
// still carry docs where the behavior is not obvious from the signature.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Pattern matching: these pedantic lints often reduce clarity.
#![allow(clippy::manual_let_else)]
#![allow(clippy::match_same_arms)]
//
// Low-value pedantic lints that add noise:
#![allow(clippy::struct_excessive_bools)] // Config structs naturally have many flags
#![allow(clippy::return_self_not_must_use)] // Builder patterns don't need must_use on every method
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::implicit_hasher)]
//
// Backends return Result uniformly so a medium can fail without an API break.
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::unused_self)]

//! Access control for shared resources.
//!
//! Every resource carries an [`Acl`] mapping `(role, owner id)` pairs to
//! access levels. Evaluation is deny-by-default: a request is granted only
//! when an entry holds every requested level.
//!
//! ACLs travel in a compact single-line form:
//!
//! ```text
//! v:1|h:blake3|m:1|a:<agent>/<levels>,...|u:...|t:...|p:*/r
//! ```
//!
//! Blocks are separated by `|`. Header blocks carry the format version
//! (`v`), the owner id hash algorithm (`h`, omitted when unset) and the
//! migration flag (`m`, omitted when false). Role blocks use the codes
//! `a` agent, `u` user, `t` team and `p` public, and level codes `n` none,
//! `o` owner, `r` read and `w` write. Reserved characters in owner ids are
//! percent-escaped.
//!
//! [`SecureConnector`] gates a [`ResourceBackend`] behind these checks and
//! makes the first writer of a resource its owner.

/// The sre-acl crate version (matches `Cargo.toml`).
pub const SRE_ACL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod acl;
pub mod backends;
pub mod connector;
pub mod constants;
pub mod error;
pub mod types;

pub use acl::{Acl, AclEntries, HashAlgorithm, OwnerEntries};
pub use backends::{JsonVault, LocalStorage, MemoryCache, MemoryStorage};
pub use connector::{
    Requester, ResourceBackend, SecureConnector, StaticTeamDirectory, TeamDirectory,
};
pub use constants::{ACL_FORMAT_VERSION, PUBLIC_OWNER_ID};
pub use error::{AclError, ErrorKind, Result};
pub use types::{
    AccessCandidate, AccessLevel, AccessRequest, AccessResult, AccessRole, AccessTicket,
    CacheSettings, ConnectorConfig, ConnectorConfigBuilder, DefaultGrant, OwnerPolicy,
};
