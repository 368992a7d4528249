//! Key hashing and table naming.
//!
//! Caller keys never reach the database as strings. Each key is reduced to a
//! 64-bit [`KeyHash`] and every row of its flattened value refers to that hash.

use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;

/// The 64-bit hash under which a caller's string key is stored.
///
/// Computed as XxHash64 (seed 0) over the key's UTF-8 bytes and reinterpreted as a
/// signed integer so it fits a SQLite `INTEGER` column.
///
/// # Collisions
///
/// Collisions are an accepted and **undetected** risk. Two distinct keys with the
/// same hash address the same slot: storing one overwrites the other, and `get`
/// on either returns whichever was stored last. Nothing in the crate tries to
/// notice or repair this.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyHash(i64);

impl KeyHash {
    /// Hashes a caller key.
    pub fn of(key: &str) -> Self {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(key.as_bytes());
        Self(hasher.finish() as i64)
    }

    /// Wraps a raw column value read back from the table.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the value stored in the `key_hash` / `belongs_to_key` columns.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Debug for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyHash({:#018x})", self.0 as u64)
    }
}

impl fmt::Display for KeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0 as u64)
    }
}

impl From<&str> for KeyHash {
    fn from(key: &str) -> Self {
        Self::of(key)
    }
}

/// Name of the table holding the vault of `owner`, optionally narrowed to `group`.
pub fn table_name(owner: &str, group: Option<&str>) -> String {
    match group {
        Some(group) => format!("{owner}.{group}"),
        None => owner.to_string(),
    }
}

/// Quotes a table name as a SQL identifier.
///
/// Owner and group come from callers, so any character may appear; embedded
/// double quotes are doubled.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
