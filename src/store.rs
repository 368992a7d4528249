//! The relational backing of every vault.
//!
//! [`VaultStore`] owns the single physical connection and translates between
//! [`Row`]s and table statements. All methods are blocking; the async layers call
//! them from Tokio's blocking pool. The connection sits behind a `Mutex`, so at
//! most one worker holds it at a time.
//!
//! Before each operation the connection is probed with `SELECT 1`. A dead (or
//! dropped) connection is replaced once; if the replacement cannot be opened or
//! fails the same probe, the operation fails with [`VaultError::ConnectionLost`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{Connection, params};
use tracing::{debug, error, info};

use crate::config::Database;
use crate::error::{Result, VaultError};
use crate::format::Row;
use crate::key::{KeyHash, quote_ident};

/// Something that can open a fresh connection to the backing database.
///
/// Implemented for [`Database`] and for any `Fn() -> rusqlite::Result<Connection>`.
pub trait Connector: Send + Sync + 'static {
    /// Opens a new connection.
    fn connect(&self) -> rusqlite::Result<Connection>;
}

impl Connector for Database {
    fn connect(&self) -> rusqlite::Result<Connection> {
        match self {
            Database::File(path) => Connection::open(path),
            Database::Memory => Connection::open_in_memory(),
        }
    }
}

impl<F> Connector for F
where
    F: Fn() -> rusqlite::Result<Connection> + Send + Sync + 'static,
{
    fn connect(&self) -> rusqlite::Result<Connection> {
        self()
    }
}

/// Counters describing the traffic a store has seen.
#[derive(Debug, Default)]
pub struct StoreStats {
    writes: AtomicU64,
    reads: AtomicU64,
    reconnects: AtomicU64,
}

impl StoreStats {
    /// Committed write transactions (stores, deletes, clears).
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Full-table reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Connections opened to replace a dead or dropped one.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Table access for all vaults of one database.
pub struct VaultStore {
    connector: Box<dyn Connector>,
    conn: Mutex<Option<Connection>>,
    wal: bool,
    stats: StoreStats,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("wal", &self.wal)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl VaultStore {
    /// Opens the store, connecting eagerly.
    ///
    /// With `wal` set, every connection switches the database to write-ahead logging.
    pub fn open(connector: impl Connector, wal: bool) -> Result<Self> {
        let store = Self {
            connector: Box::new(connector),
            conn: Mutex::new(None),
            wal,
            stats: StoreStats::default(),
        };
        let conn = store.connect()?;
        *store.lock()? = Some(conn);
        Ok(store)
    }

    /// Traffic counters.
    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Drops the current connection. The next operation reconnects.
    pub fn disconnect(&self) -> Result<()> {
        let dropped = self.lock()?.take();
        if dropped.is_some() {
            debug!("vault connection dropped");
        }
        Ok(())
    }

    /// Reads every row of `table`, creating the table first if needed.
    pub fn load_all(&self, table: &str) -> Result<Vec<Row>> {
        let rows = self.with_connection(|conn| {
            create_table(conn, table)?;
            let sql = format!("SELECT {} FROM {}", Row::COLUMNS, quote_ident(table));
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], Row::from_sql)?
                .collect::<rusqlite::Result<Vec<Row>>>()?;
            Ok(rows)
        })?;
        StoreStats::record(&self.stats.reads);
        debug!(table, rows = rows.len(), "loaded vault table");
        Ok(rows)
    }

    /// Replaces the rows of `keys` with `rows` in a single transaction.
    ///
    /// Every key's old rows are deleted before any new row is inserted, so a reader
    /// never sees a half-replaced key.
    pub fn write(&self, table: &str, keys: &[KeyHash], rows: &[Row]) -> Result<()> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;
            create_table(&tx, table)?;
            {
                let mut delete = tx.prepare_cached(&delete_sql(table))?;
                for key in keys {
                    delete.execute(params![key.as_i64()])?;
                }
                let mut insert = tx.prepare_cached(&format!(
                    "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    quote_ident(table),
                    Row::COLUMNS
                ))?;
                for row in rows {
                    insert.execute(params![
                        row.key_hash,
                        row.value,
                        row.type_tag,
                        row.sequence_index,
                        row.local_id,
                        row.parent_local_id,
                        row.belongs_to_key,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        StoreStats::record(&self.stats.writes);
        debug!(table, keys = keys.len(), rows = rows.len(), "wrote vault rows");
        Ok(())
    }

    /// Deletes every row of `key`. Returns the number of rows removed; an absent key
    /// removes nothing and is not an error.
    pub fn delete(&self, table: &str, key: KeyHash) -> Result<usize> {
        let removed = self.with_connection(|conn| {
            let tx = conn.transaction()?;
            create_table(&tx, table)?;
            let removed = tx.execute(&delete_sql(table), params![key.as_i64()])?;
            tx.commit()?;
            Ok(removed)
        })?;
        StoreStats::record(&self.stats.writes);
        debug!(table, %key, removed, "deleted vault key");
        Ok(removed)
    }

    /// Drops `table` entirely.
    pub fn clear(&self, table: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", quote_ident(table)))?;
            Ok(())
        })?;
        StoreStats::record(&self.stats.writes);
        debug!(table, "dropped vault table");
        Ok(())
    }

    /// Runs `op` on a live connection, reconnecting once if necessary.
    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock()?;

        let probe = match guard.as_ref() {
            Some(conn) => ping(conn).map_err(|e| e.to_string()),
            None => Err("no open connection".to_string()),
        };
        if let Err(reason) = probe {
            info!(%reason, "reconnecting to vault database");
            *guard = None;
            let conn = self.connect()?;
            StoreStats::record(&self.stats.reconnects);
            *guard = Some(conn);
        }

        let conn = guard
            .as_mut()
            .ok_or_else(|| VaultError::Internal("Connection vanished after reconnect".into()))?;
        op(conn)
    }

    /// Opens, configures and probes a new connection.
    fn connect(&self) -> Result<Connection> {
        let attempt = self.connector.connect().and_then(|conn| {
            if self.wal {
                conn.pragma_update(None, "journal_mode", "WAL")?;
            }
            ping(&conn)?;
            Ok(conn)
        });
        attempt.map_err(|e| {
            error!(error = %e, "failed to connect to vault database");
            VaultError::ConnectionLost(e.to_string())
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| VaultError::Internal("VaultStore Mutex poisoned".into()))
    }
}

fn ping(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("SELECT 1", [], |_| Ok(()))
}

/// Name of the `belongs_to_key` index of `table`.
///
/// Tables and indexes share one SQLite namespace, and table names are arbitrary
/// caller strings. The index is named after the table's hash under a fixed prefix
/// so that it never takes the plain name of another vault. An owner literally
/// named `graphvault_idx_<hash of another table>` still collides; like key
/// collisions this is accepted and not detected.
fn index_name(table: &str) -> String {
    format!("graphvault_idx_{}", KeyHash::of(table))
}

fn create_table(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table_ident} (
            key_hash INTEGER UNIQUE,
            value,
            type_tag INTEGER NOT NULL,
            sequence_index INTEGER,
            local_id INTEGER,
            parent_local_id INTEGER,
            belongs_to_key INTEGER
        );
        CREATE INDEX IF NOT EXISTS {index_ident} ON {table_ident} (belongs_to_key);",
        table_ident = quote_ident(table),
        index_ident = quote_ident(&index_name(table)),
    ))
}

fn delete_sql(table: &str) -> String {
    format!(
        "DELETE FROM {} WHERE belongs_to_key = ?1 OR key_hash = ?1",
        quote_ident(table)
    )
}
