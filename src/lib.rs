//! # graphvault
//!
//! An object-graph persistence engine: a key/value store whose values are arbitrary
//! nested combinations of scalars, lists, tuples, sets and maps, kept in SQLite
//! tables behind an in-process write-through cache.
//!
//! ## Overview
//!
//! A relational table stores flat rows, so every value is *flattened* into a tree
//! of nodes before it is written, and *rebuilt* from those nodes when a table is
//! loaded. One table exists per (owner, group) pair; the first time a table is
//! requested it is read in full and rebuilt in parallel, after which every read is
//! a lookup in memory.
//!
//! ### The Node Model
//!
//! Flattening a value produces one node per scalar and one placeholder node per
//! container:
//! - Each composite placeholder gets a [`graph::LocalId`], unique within its key.
//! - Every other node records the id of the composite that contains it and, inside
//!   lists, tuples and maps, its position.
//! - Maps are stored as the alternating sequence `k0, v0, k1, v1, ...`.
//! - The top-level node carries the hashed key; all nodes record which key they
//!   belong to, so rows of many keys can be mixed freely in one table.
//!
//! ### Table Layout
//!
//! ```text
//! key_hash | value | type_tag | sequence_index | local_id | parent_local_id | belongs_to_key
//! ```
//!
//! See [`format`] for the meaning of each column and the scalar encoding.
//!
//! ## Core Concepts
//!
//! ### `FlatGraph`
//!
//! The [`graph::FlatGraph`] is the arena produced by [`visitor::flatten`]. It owns the
//! local id counter of one flatten call and converts to table rows.
//!
//! ### Rebuild
//!
//! The [`rebuild`] module regroups rows by key and reconstructs every key on a Rayon
//! pool. Containers are materialized bottom-up from an arena, which gives tuples
//! value semantics without patching them in place. A key with inconsistent rows
//! becomes unavailable; it never prevents the rest of the table from loading.
//!
//! ### Store, Vault and Manager
//!
//! The [`store::VaultStore`] owns the SQLite connection, re-establishing it once when
//! it is found dead. A [`Vault`] caches one table and skips writes whose value is
//! unchanged. The [`VaultManager`] pools vaults by table name.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use graphvault::{Value, VaultManager};
//!
//! # async fn run() -> graphvault::Result<()> {
//! let manager = VaultManager::builder().path("bot.db").open()?;
//!
//! let vault = manager.get("user-42", Some("settings")).await?;
//! let mut vault = vault.lock().await;
//!
//! vault
//!     .store(
//!         "counters",
//!         Value::map([
//!             ("x", Value::list([1, 2, 3])),
//!             ("y", Value::tuple(["a", "b"])),
//!         ]),
//!     )
//!     .await?;
//!
//! let counters = vault.get("counters", Value::map(Vec::<(Value, Value)>::new()));
//! println!("{counters}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Hash Collisions
//!
//! Keys are stored as a 64-bit hash ([`key::KeyHash`]). Two keys that collide share
//! a slot. This risk is accepted and not detected.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod config;
pub mod error;
pub mod format;
pub mod inspector;
pub mod key;
pub mod store;
pub mod value;

// --- ENGINE MODULES ---
pub mod graph;
pub mod rebuild;
pub mod visitor;

mod manager;
mod vault;

// --- RE-EXPORTS ---

pub use error::{Result, VaultError};
pub use format::TypeTag;
pub use inspector::VaultInspector;
pub use key::KeyHash;
pub use manager::{SharedVault, VaultManager, VaultManagerBuilder};
pub use store::{Connector, StoreStats, VaultStore};
pub use value::{Value, ValueMap};
pub use vault::Vault;
