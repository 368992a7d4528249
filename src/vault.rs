//! The per-owner façade: an in-memory dictionary in front of one table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::key::KeyHash;
use crate::rebuild::Slot;
use crate::store::VaultStore;
use crate::value::Value;
use crate::visitor::flatten;

/// Cached values of one (owner, group) pair.
///
/// A vault is created by [`VaultManager::get`](crate::VaultManager::get), which loads
/// and rebuilds the whole table once. From then on reads are pure map lookups and
/// writes go through to the table before the cache is updated.
///
/// Concurrent mutation of the same vault must be serialized by the caller; the
/// manager hands vaults out behind an async mutex for that purpose.
#[derive(Debug)]
pub struct Vault {
    owner: String,
    group: Option<String>,
    table: String,
    data: HashMap<KeyHash, Slot>,
    store: Arc<VaultStore>,
}

impl Vault {
    pub(crate) fn new(
        owner: &str,
        group: Option<&str>,
        table: String,
        store: Arc<VaultStore>,
        data: HashMap<KeyHash, Slot>,
    ) -> Self {
        Self {
            owner: owner.to_string(),
            group: group.map(str::to_string),
            table,
            data,
            store,
        }
    }

    /// The owner this vault belongs to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The group inside the owner, if any.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Name of the backing table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns a copy of the value under `key`, or `default` when there is none.
    ///
    /// A key whose stored rows are corrupt also yields `default`; the failure is
    /// logged. Use [`Vault::try_get`] to see it.
    pub fn get(&self, key: &str, default: impl Into<Value>) -> Value {
        let hash = KeyHash::of(key);
        match self.data.get(&hash) {
            Some(Ok(value)) => value.clone(),
            Some(Err(e)) => {
                warn!(table = %self.table, key, error = %e, "returning default for unavailable key");
                default.into()
            }
            None => default.into(),
        }
    }

    /// Looks up `key` without a default.
    ///
    /// Returns `Ok(None)` for an absent key and the key's
    /// [`CorruptEncoding`](crate::VaultError::CorruptEncoding) error when its rows
    /// could not be rebuilt.
    pub fn try_get(&self, key: &str) -> Result<Option<&Value>> {
        match self.data.get(&KeyHash::of(key)) {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(None),
        }
    }

    /// True when `key` has a slot, available or not.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(&KeyHash::of(key))
    }

    /// Number of keys, including unavailable ones.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the vault holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hashes of the keys whose rows could not be rebuilt.
    pub fn unavailable_keys(&self) -> Vec<KeyHash> {
        let mut keys: Vec<KeyHash> = self
            .data
            .iter()
            .filter(|(_, slot)| slot.is_err())
            .map(|(key, _)| *key)
            .collect();
        keys.sort();
        keys
    }

    /// Stores `value` under `key`.
    ///
    /// Storing a value equal to the cached one touches neither the flattener nor the
    /// table.
    pub async fn store(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.store_many([(key, value.into())]).await
    }

    /// Stores a batch of entries in one transaction.
    ///
    /// Unchanged entries are skipped. When a key appears more than once, the last
    /// value wins.
    pub async fn store_many<I, K, V>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut staged: HashMap<KeyHash, Value> = HashMap::new();
        for (key, value) in entries {
            let hash = KeyHash::of(key.as_ref());
            let value = value.into();
            if matches!(self.data.get(&hash), Some(Ok(cached)) if *cached == value) {
                staged.remove(&hash);
                continue;
            }
            staged.insert(hash, value);
        }

        if staged.is_empty() {
            debug!(table = %self.table, "store skipped, nothing changed");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        let staged = tokio::task::spawn_blocking(move || -> Result<HashMap<KeyHash, Value>> {
            let keys: Vec<KeyHash> = staged.keys().copied().collect();
            let rows: Vec<_> = staged
                .iter()
                .flat_map(|(key, value)| flatten(*key, value).to_rows())
                .collect();
            store.write(&table, &keys, &rows)?;
            Ok(staged)
        })
        .await??;

        for (key, value) in staged {
            self.data.insert(key, Ok(value));
        }
        Ok(())
    }

    /// Removes `key`. Removing an absent key is a no-op.
    pub async fn delete(&mut self, key: &str) -> Result<()> {
        let hash = KeyHash::of(key);
        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || store.delete(&table, hash)).await??;
        self.data.remove(&hash);
        Ok(())
    }

    /// Drops the whole table and empties the cache.
    pub async fn clear(&mut self) -> Result<()> {
        let store = Arc::clone(&self.store);
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || store.clear(&table)).await??;
        self.data.clear();
        Ok(())
    }
}
