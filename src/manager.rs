//! The registry of vaults.
//!
//! A [`VaultManager`] is built once at startup and passed to whoever needs a vault.
//! It owns the [`VaultStore`], the Rayon pool used to rebuild tables, and the pool of
//! vaults keyed by table name.
//!
//! The pool lock only guards the map itself. Each table has its own `OnceCell`, and
//! the first load of a table runs on that cell, so a slow load never holds up
//! callers asking for other tables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

use crate::config::{Database, VaultOptions};
use crate::error::{Result, VaultError};
use crate::key::{KeyHash, table_name};
use crate::rebuild::{Slot, rebuild};
use crate::store::{Connector, VaultStore};
use crate::vault::Vault;

/// A pooled vault, shared by every caller that asks for the same (owner, group).
pub type SharedVault = Arc<Mutex<Vault>>;

/// Entry point of the crate: hands out pooled [`Vault`]s.
#[derive(Debug)]
pub struct VaultManager {
    store: Arc<VaultStore>,
    rebuild_pool: Arc<rayon::ThreadPool>,
    chunk_rows: usize,
    pool: Mutex<HashMap<String, Arc<OnceCell<SharedVault>>>>,
}

impl VaultManager {
    /// Starts configuring a manager.
    pub fn builder() -> VaultManagerBuilder {
        VaultManagerBuilder::default()
    }

    /// Opens a manager over the database named in `options`.
    pub fn open(options: VaultOptions) -> Result<Self> {
        let connector = options.database.clone();
        Self::with_connector(options, connector)
    }

    /// Opens a manager whose connections come from `connector` instead of
    /// `options.database`.
    pub fn with_connector(options: VaultOptions, connector: impl Connector) -> Result<Self> {
        let mut pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("graphvault-rebuild-{i}"));
        if let Some(threads) = options.rebuild_threads {
            pool = pool.num_threads(threads);
        }
        let rebuild_pool = pool
            .build()
            .map_err(|e| VaultError::Internal(format!("Cannot start rebuild pool: {e}")))?;

        let store = VaultStore::open(connector, options.wal)?;
        info!(
            database = ?options.database,
            rebuild_threads = rebuild_pool.current_num_threads(),
            "vault manager ready"
        );

        Ok(Self {
            store: Arc::new(store),
            rebuild_pool: Arc::new(rebuild_pool),
            chunk_rows: options.regroup_chunk_rows,
            pool: Mutex::new(HashMap::new()),
        })
    }

    /// The store shared by all vaults of this manager.
    pub fn store(&self) -> &Arc<VaultStore> {
        &self.store
    }

    /// Returns the vault of `owner` (narrowed to `group` when given).
    ///
    /// The first call for a table reads and rebuilds all of its rows; every later
    /// call returns the same pooled instance without touching the database. Keys
    /// whose rows are corrupt load as unavailable and do not fail the call.
    pub async fn get(&self, owner: &str, group: Option<&str>) -> Result<SharedVault> {
        let table = table_name(owner, group);
        let cell = {
            let mut pool = self.pool.lock().await;
            Arc::clone(pool.entry(table.clone()).or_default())
        };

        // Concurrent first requests for the same table wait on the cell; a failed
        // load leaves it empty for the next caller to retry.
        let vault = cell
            .get_or_try_init(|| async {
                let data = self.load(&table).await?;
                Ok::<_, VaultError>(Arc::new(Mutex::new(Vault::new(
                    owner,
                    group,
                    table.clone(),
                    Arc::clone(&self.store),
                    data,
                ))))
            })
            .await?;
        Ok(Arc::clone(vault))
    }

    /// Number of vaults currently pooled.
    pub async fn pooled(&self) -> usize {
        self.pool
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    async fn load(&self, table: &str) -> Result<HashMap<KeyHash, Slot>> {
        let store = Arc::clone(&self.store);
        let rebuild_pool = Arc::clone(&self.rebuild_pool);
        let chunk_rows = self.chunk_rows;
        let owned_table = table.to_string();

        let output = tokio::task::spawn_blocking(move || {
            let rows = store.load_all(&owned_table)?;
            Ok::<_, VaultError>(rebuild_pool.install(|| rebuild(rows, chunk_rows)))
        })
        .await??;

        let corrupt = output.corrupt_keys();
        if !corrupt.is_empty() {
            warn!(table, corrupt = corrupt.len(), "vault loaded with unavailable keys");
        }
        info!(table, keys = output.values.len(), "vault loaded");
        Ok(output.values)
    }
}

/// Builder for [`VaultManager`].
#[derive(Debug, Default)]
pub struct VaultManagerBuilder {
    options: VaultOptions,
}

impl VaultManagerBuilder {
    /// Keeps the tables in a SQLite file.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.database = Database::File(path.into());
        self
    }

    /// Keeps the tables in a private in-memory database.
    pub fn in_memory(mut self) -> Self {
        self.options.database = Database::Memory;
        self
    }

    /// Number of threads rebuilding tables.
    pub fn rebuild_threads(mut self, threads: usize) -> Self {
        self.options.rebuild_threads = Some(threads);
        self
    }

    /// Rows handled by a single regroup task.
    pub fn regroup_chunk_rows(mut self, rows: usize) -> Self {
        self.options.regroup_chunk_rows = rows;
        self
    }

    /// Enables or disables write-ahead logging.
    pub fn wal(mut self, enabled: bool) -> Self {
        self.options.wal = enabled;
        self
    }

    /// Replaces every option at once.
    pub fn options(mut self, options: VaultOptions) -> Self {
        self.options = options;
        self
    }

    /// Opens the manager.
    pub fn open(self) -> Result<VaultManager> {
        VaultManager::open(self.options)
    }

    /// Opens the manager with a custom connector.
    pub fn open_with(self, connector: impl Connector) -> Result<VaultManager> {
        VaultManager::with_connector(self.options, connector)
    }
}
