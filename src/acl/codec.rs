//! Compact ACL wire format.
//!
//! ```text
//! acl     := block ( '|' block )*
//! block   := 'v:' version | 'h:' hash-tag | 'm:' ('0'|'1') | role ':' entry ( ',' entry )*
//! entry   := owner-id '/' level-code+
//! ```
//!
//! Role blocks follow role order, entries follow owner-id order, level codes
//! follow level order. Owner ids escape `% | : , /` as `%XX`.

use std::collections::{BTreeSet, btree_map::Entry};

use super::{Acl, HashAlgorithm, OwnerEntries};
use crate::constants::{
    ACL_FORMAT_VERSION, BLOCK_DELIMITER, ENTRY_DELIMITER, ESCAPE_CHAR, HASH_TAG, LEVEL_DELIMITER,
    MIGRATED_TAG, TAG_DELIMITER, VERSION_TAG,
};
use crate::error::{AclError, Result};
use crate::types::{AccessLevel, AccessRole};

const RESERVED: [char; 5] = [
    ESCAPE_CHAR,
    BLOCK_DELIMITER,
    TAG_DELIMITER,
    ENTRY_DELIMITER,
    LEVEL_DELIMITER,
];

pub(super) fn encode(acl: &Acl) -> String {
    let mut blocks = vec![format!("{VERSION_TAG}{TAG_DELIMITER}{ACL_FORMAT_VERSION}")];
    if let Some(algorithm) = acl.hash_algorithm {
        blocks.push(format!("{HASH_TAG}{TAG_DELIMITER}{}", algorithm.tag()));
    }
    if acl.migrated {
        blocks.push(format!("{MIGRATED_TAG}{TAG_DELIMITER}1"));
    }
    for (role, owners) in &acl.entries {
        if owners.is_empty() {
            continue;
        }
        let entries: Vec<String> = owners
            .iter()
            .filter(|(_, levels)| !levels.is_empty())
            .map(|(owner, levels)| {
                let codes: String = levels.iter().map(|level| level.code()).collect();
                format!("{}{LEVEL_DELIMITER}{codes}", escape(owner))
            })
            .collect();
        if entries.is_empty() {
            continue;
        }
        blocks.push(format!(
            "{}{TAG_DELIMITER}{}",
            role.code(),
            entries.join(&ENTRY_DELIMITER.to_string())
        ));
    }
    blocks.join(&BLOCK_DELIMITER.to_string())
}

pub(super) fn decode(raw: &str) -> Result<Acl> {
    let mut acl = Acl::default();
    if raw.trim().is_empty() {
        return Ok(acl);
    }

    let mut seen_version = false;
    let mut seen_hash = false;
    let mut seen_migrated = false;
    let mut offset = 0usize;

    for block in raw.trim().split(BLOCK_DELIMITER) {
        let block_offset = offset;
        offset += block.len() + BLOCK_DELIMITER.len_utf8();

        let Some((tag, body)) = block.split_once(TAG_DELIMITER) else {
            return Err(AclError::malformed(block_offset, format!("block '{block}' has no tag")));
        };
        let body_offset = block_offset + tag.len() + TAG_DELIMITER.len_utf8();

        match tag {
            VERSION_TAG => {
                if seen_version {
                    return Err(AclError::malformed(block_offset, "duplicate version block"));
                }
                seen_version = true;
                let version: u32 = body.parse().map_err(|_| {
                    AclError::malformed(body_offset, format!("invalid version '{body}'"))
                })?;
                if version != ACL_FORMAT_VERSION {
                    return Err(AclError::malformed(
                        body_offset,
                        format!("unsupported ACL format version {version}"),
                    ));
                }
            }
            HASH_TAG => {
                if seen_hash {
                    return Err(AclError::malformed(block_offset, "duplicate hash block"));
                }
                seen_hash = true;
                let algorithm = HashAlgorithm::from_tag(body).ok_or_else(|| {
                    AclError::malformed(body_offset, format!("unknown hash algorithm '{body}'"))
                })?;
                acl.hash_algorithm = Some(algorithm);
            }
            MIGRATED_TAG => {
                if seen_migrated {
                    return Err(AclError::malformed(block_offset, "duplicate migrated block"));
                }
                seen_migrated = true;
                acl.migrated = match body {
                    "1" => true,
                    "0" => false,
                    _ => {
                        return Err(AclError::malformed(
                            body_offset,
                            format!("invalid migrated flag '{body}'"),
                        ));
                    }
                };
            }
            _ => {
                let role = parse_role_tag(tag, block_offset)?;
                let owners = decode_role_block(body, body_offset)?;
                match acl.entries.entry(role) {
                    Entry::Occupied(_) => {
                        return Err(AclError::malformed(
                            block_offset,
                            format!("duplicate block for role {role}"),
                        ));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(owners);
                    }
                }
            }
        }
    }

    Ok(acl)
}

fn parse_role_tag(tag: &str, offset: usize) -> Result<AccessRole> {
    let mut chars = tag.chars();
    match (chars.next(), chars.next()) {
        (Some(code), None) => AccessRole::from_code(code)
            .ok_or_else(|| AclError::malformed(offset, format!("unknown role code '{code}'"))),
        _ => Err(AclError::malformed(offset, format!("unknown block tag '{tag}'"))),
    }
}

fn decode_role_block(body: &str, offset: usize) -> Result<OwnerEntries> {
    if body.is_empty() {
        return Err(AclError::malformed(offset, "role block has no entries"));
    }
    let mut owners = OwnerEntries::new();
    let mut cursor = offset;
    for entry in body.split(ENTRY_DELIMITER) {
        let entry_offset = cursor;
        cursor += entry.len() + ENTRY_DELIMITER.len_utf8();

        let Some((raw_owner, codes)) = entry.split_once(LEVEL_DELIMITER) else {
            return Err(AclError::malformed(
                entry_offset,
                format!("entry '{entry}' has no level separator"),
            ));
        };
        let owner = unescape(raw_owner, entry_offset)?;
        if owner.trim().is_empty() {
            return Err(AclError::malformed(entry_offset, "empty owner id"));
        }
        let levels_offset = entry_offset + raw_owner.len() + LEVEL_DELIMITER.len_utf8();
        let levels = decode_levels(codes, levels_offset)?;
        if owners.insert(owner, levels).is_some() {
            return Err(AclError::malformed(entry_offset, "duplicate owner id in role block"));
        }
    }
    Ok(owners)
}

fn decode_levels(codes: &str, offset: usize) -> Result<BTreeSet<AccessLevel>> {
    if codes.is_empty() {
        return Err(AclError::malformed(offset, "owner entry has no levels"));
    }
    codes
        .char_indices()
        .map(|(index, code)| {
            AccessLevel::from_code(code).ok_or_else(|| {
                AclError::malformed(offset + index, format!("unknown level code '{code}'"))
            })
        })
        .collect()
}

fn escape(owner: &str) -> String {
    let mut escaped = String::with_capacity(owner.len());
    for ch in owner.chars() {
        if RESERVED.contains(&ch) {
            escaped.push(ESCAPE_CHAR);
            escaped.push_str(&format!("{:02X}", ch as u32));
        } else {
            escaped.push(ch);
        }
    }
    escaped
}

fn unescape(raw: &str, offset: usize) -> Result<String> {
    let mut owner = String::with_capacity(raw.len());
    let mut chars = raw.char_indices();
    while let Some((index, ch)) = chars.next() {
        if ch != ESCAPE_CHAR {
            owner.push(ch);
            continue;
        }
        let hex: String = chars.by_ref().take(2).map(|(_, c)| c).collect();
        let decoded = u8::from_str_radix(&hex, 16)
            .ok()
            .filter(|_| hex.len() == 2)
            .map(char::from)
            .filter(|c| RESERVED.contains(c))
            .ok_or_else(|| {
                AclError::malformed(offset + index, format!("invalid escape '%{hex}'"))
            })?;
        owner.push(decoded);
    }
    Ok(owner)
}
