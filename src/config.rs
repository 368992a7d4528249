//! Configuration of a [`VaultManager`](crate::VaultManager).
//!
//! Options can be assembled with the builder returned by
//! [`VaultManager::builder`](crate::VaultManager::builder), or deserialized from any
//! serde format the application already uses for its settings:
//!
//! ```rust
//! use graphvault::config::{Database, VaultOptions};
//!
//! let options = VaultOptions {
//!     database: Database::File("vault.db".into()),
//!     rebuild_threads: Some(4),
//!     ..VaultOptions::default()
//! };
//! assert!(options.wal);
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::rebuild::DEFAULT_CHUNK_ROWS;

/// Where the vault tables live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Database {
    /// A SQLite database file, created on first use.
    File(PathBuf),
    /// A private in-memory database. Its contents do not survive a reconnect.
    #[default]
    Memory,
}

/// Tunables for a vault manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VaultOptions {
    /// Backing database.
    pub database: Database,
    /// Threads of the rebuild pool. `None` lets Rayon pick (one per core).
    pub rebuild_threads: Option<usize>,
    /// Rows handled by a single regroup task while loading a table.
    pub regroup_chunk_rows: usize,
    /// Switch the database to write-ahead logging on connect.
    pub wal: bool,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            database: Database::Memory,
            rebuild_threads: None,
            regroup_chunk_rows: DEFAULT_CHUNK_ROWS,
            wal: true,
        }
    }
}
