//! Wire-format constants shared by the ACL codec and the connectors.

/// Current compact ACL format version.
pub const ACL_FORMAT_VERSION: u32 = 1;

/// Separates top-level blocks (`v:1|h:blake3|a:...`).
pub const BLOCK_DELIMITER: char = '|';
/// Separates a block tag from its body.
pub const TAG_DELIMITER: char = ':';
/// Separates owner entries inside a role block.
pub const ENTRY_DELIMITER: char = ',';
/// Separates an owner id from its level codes.
pub const LEVEL_DELIMITER: char = '/';
/// Escape prefix for reserved characters in owner ids.
pub const ESCAPE_CHAR: char = '%';

/// Block tags for non-role header blocks.
pub const VERSION_TAG: &str = "v";
pub const HASH_TAG: &str = "h";
pub const MIGRATED_TAG: &str = "m";

/// Owner id used for public grants and the public candidate.
pub const PUBLIC_OWNER_ID: &str = "*";
