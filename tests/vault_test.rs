#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use graphvault::{
    KeyHash, Result, Value, VaultError, VaultManager,
    format::Row,
    visitor::flatten,
};
use rusqlite::types::Value as SqlValue;

// --- HELPERS ---

fn counters() -> Value {
    Value::map([
        ("x", Value::list([1, 2, 3])),
        ("y", Value::tuple(["a", "b"])),
    ])
}

// --- TESTS ---

/// Storing the same value twice writes to the table once.
#[tokio::test]
async fn test_idempotent_store() -> Result<()> {
    let manager = VaultManager::builder().in_memory().open()?;
    let vault = manager.get("owner", None).await?;
    let mut vault = vault.lock().await;

    vault.store("k", Value::list([1, 2])).await?;
    vault.store("k", Value::list([1, 2])).await?;
    assert_eq!(manager.store().stats().writes(), 1);

    vault.store("k", Value::list([1, 2, 3])).await?;
    assert_eq!(manager.store().stats().writes(), 2);
    Ok(())
}

#[tokio::test]
async fn test_delete_then_get() -> Result<()> {
    let manager = VaultManager::builder().in_memory().open()?;
    let vault = manager.get("owner", Some("group")).await?;
    let mut vault = vault.lock().await;

    vault.store("k", "v").await?;
    assert_eq!(vault.get("k", 0), Value::from("v"));

    vault.delete("k").await?;
    assert_eq!(vault.get("k", 0), Value::from(0));
    assert!(!vault.contains("k"));

    // Deleting an absent key is fine.
    vault.delete("never-stored").await?;
    Ok(())
}

/// The value survives a full restart: new manager, new connection, new cache.
#[tokio::test]
async fn test_counters_survive_restart() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("vault.db");

    {
        let manager = VaultManager::builder().path(&path).open()?;
        let vault = manager.get("guild", Some("stats")).await?;
        vault.lock().await.store("counters", counters()).await?;
    }

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("guild", Some("stats")).await?;
    let vault = vault.lock().await;
    assert_eq!(vault.get("counters", Value::List(Vec::new())), counters());
    assert_eq!(vault.try_get("counters")?, Some(&counters()));
    Ok(())
}

#[tokio::test]
async fn test_shapes_survive_restart() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("shapes.db");
    let entries = [
        ("ordered", Value::map([("a", 1), ("b", 2), ("c", 3)])),
        ("nested", Value::tuple([Value::from(1), Value::tuple([2, 3]), Value::from(4)])),
        ("members", Value::set([1, 2, 3])),
        ("float", Value::Float(-0.125)),
        ("complex", Value::Complex(2.0, -1.0)),
        ("bytes", Value::Bytes(b"\x00raw".to_vec())),
        ("flag", Value::Bool(false)),
    ];

    {
        let manager = VaultManager::builder().path(&path).open()?;
        let vault = manager.get("shapes", None).await?;
        vault.lock().await.store_many(entries.clone()).await?;
        assert_eq!(manager.store().stats().writes(), 1);
    }

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("shapes", None).await?;
    let vault = vault.lock().await;
    assert_eq!(vault.len(), entries.len());
    for (key, value) in &entries {
        assert_eq!(&vault.get(key, Value::Int(-1)), value, "key {key}");
    }

    let Value::Map(map) = vault.get("ordered", 0) else {
        panic!("ordered must be a map");
    };
    let keys: Vec<Value> = map.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec![Value::from("a"), Value::from("b"), Value::from("c")]);
    Ok(())
}

#[tokio::test]
async fn test_vaults_are_pooled() -> Result<()> {
    let manager = VaultManager::builder().in_memory().open()?;

    let first = manager.get("owner", None).await?;
    let second = manager.get("owner", None).await?;
    let other = manager.get("owner", Some("group")).await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &other));
    assert_eq!(manager.pooled().await, 2);
    assert_eq!(manager.store().stats().reads(), 2);
    Ok(())
}

#[tokio::test]
async fn test_clear_drops_every_key() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("clear.db");

    {
        let manager = VaultManager::builder().path(&path).open()?;
        let vault = manager.get("owner", None).await?;
        let mut vault = vault.lock().await;
        vault.store_many([("a", 1), ("b", 2)]).await?;
        vault.clear().await?;
        assert!(vault.is_empty());

        // The table is recreated on the next write.
        vault.store("c", 3).await?;
    }

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("owner", None).await?;
    let vault = vault.lock().await;
    assert_eq!(vault.len(), 1);
    assert_eq!(vault.get("a", 0), Value::from(0));
    assert_eq!(vault.get("c", 0), Value::from(3));
    Ok(())
}

/// A key with broken rows loads as unavailable; its neighbours load normally.
#[tokio::test]
async fn test_corrupt_key_loads_unavailable() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("corrupt.db");

    {
        let manager = VaultManager::builder().path(&path).open()?;
        let store = manager.store();

        let good = KeyHash::of("good");
        let bad = KeyHash::of("bad");
        let mut rows = flatten(good, &Value::list([1, 2])).to_rows();
        let mut broken: Vec<Row> = flatten(bad, &Value::list([1, 2])).to_rows();
        broken[2].parent_local_id = Some(7);
        rows.extend(broken);
        store.write("owner", &[good, bad], &rows)?;
    }

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("owner", None).await?;
    let mut vault = vault.lock().await;

    assert_eq!(vault.get("good", 0), Value::list([1, 2]));
    assert_eq!(vault.get("bad", 0), Value::from(0));
    assert!(vault.contains("bad"));
    assert_eq!(vault.unavailable_keys(), vec![KeyHash::of("bad")]);
    assert!(matches!(
        vault.try_get("bad"),
        Err(VaultError::CorruptEncoding { .. })
    ));

    // Overwriting the key repairs it.
    vault.store("bad", "fixed").await?;
    assert_eq!(vault.try_get("bad")?, Some(&Value::from("fixed")));
    assert!(vault.unavailable_keys().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reconnects_after_disconnect() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("reconnect.db");

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("owner", None).await?;
    let mut vault = vault.lock().await;

    vault.store("before", 1).await?;
    manager.store().disconnect()?;
    vault.store("after", 2).await?;

    assert_eq!(manager.store().stats().reconnects(), 1);
    assert_eq!(manager.store().stats().writes(), 2);

    let rows = manager.store().load_all("owner")?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_reconnect_is_fatal() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("flaky.db");
    let gone = dir.path().join("missing").join("flaky.db");
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let counter = Arc::clone(&calls);
    let manager = VaultManager::builder().open_with(move || {
        if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            rusqlite::Connection::open(&path)
        } else {
            rusqlite::Connection::open(&gone)
        }
    })?;

    let vault = manager.get("owner", None).await?;
    let mut vault = vault.lock().await;
    vault.store("kept", 1).await?;

    manager.store().disconnect()?;
    let result = vault.store("lost", 2).await;
    assert!(matches!(result, Err(VaultError::ConnectionLost(_))));

    // The failed write left the cache untouched.
    assert_eq!(vault.get("lost", 0), Value::from(0));
    assert_eq!(vault.get("kept", 0), Value::from(1));
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn test_unreachable_database_fails_to_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let result = VaultManager::builder()
        .path(dir.path().join("missing").join("vault.db"))
        .open();
    assert!(matches!(result, Err(VaultError::ConnectionLost(_))));
}

#[tokio::test]
async fn test_scalar_float_column_accepts_integer() -> Result<()> {
    // Tables written by other tools may store integral floats as INTEGER.
    let key = KeyHash::of("ratio");
    let mut rows = flatten(key, &Value::Float(2.0)).to_rows();
    rows[0].value = SqlValue::Integer(2);

    let manager = VaultManager::builder().in_memory().open()?;
    manager.store().write("owner", &[key], &rows)?;

    // The cache of a fresh vault is filled from the table.
    let vault = manager.get("owner", None).await?;
    assert_eq!(vault.lock().await.get("ratio", 0), Value::Float(2.0));
    Ok(())
}

#[tokio::test]
async fn test_repeated_key_in_batch_last_wins() -> Result<()> {
    let manager = VaultManager::builder().in_memory().open()?;
    let vault = manager.get("owner", None).await?;
    let mut vault = vault.lock().await;

    vault.store_many([("k", 1), ("k", 2)]).await?;
    assert_eq!(vault.get("k", 0), Value::from(2));
    assert_eq!(manager.store().stats().writes(), 1);

    // The last value equals the cached one, so the batch changes nothing.
    vault.store_many([("k", 3), ("k", 2)]).await?;
    assert_eq!(vault.get("k", 0), Value::from(2));
    assert_eq!(manager.store().stats().writes(), 1);

    let rows = manager.store().load_all("owner")?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, SqlValue::Integer(2));
    Ok(())
}

/// Owner names may contain any character, including ones that look like
/// generated identifiers.
#[tokio::test]
async fn test_owner_named_like_an_index() -> Result<()> {
    let manager = VaultManager::builder().in_memory().open()?;

    for owner in ["team", "team#belongs_to_key", "team\"; DROP TABLE team; --"] {
        let vault = manager.get(owner, None).await?;
        vault.lock().await.store("k", owner).await?;
    }
    for owner in ["team", "team#belongs_to_key", "team\"; DROP TABLE team; --"] {
        let rows = manager.store().load_all(owner)?;
        assert_eq!(rows.len(), 1, "owner {owner}");
    }
    Ok(())
}

/// A table whose first load is stuck must not hold up callers of other tables.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_load_does_not_block_pooled_vault() -> Result<()> {
    let dir = tempfile::tempdir().map_err(|e| VaultError::Internal(e.to_string()))?;
    let path = dir.path().join("slow.db");

    let db_path = path.clone();
    let connector = move || -> rusqlite::Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        Ok(conn)
    };
    let manager = Arc::new(VaultManager::builder().open_with(connector)?);
    manager.get("ready", None).await?;

    // A second connection holds the write lock, so creating the next table waits.
    let blocker = rusqlite::Connection::open(&path)?;
    blocker.execute_batch("BEGIN IMMEDIATE")?;

    let loading = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.get("stuck", None).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!loading.is_finished());

    let ready = tokio::time::timeout(Duration::from_secs(2), manager.get("ready", None)).await;
    assert!(matches!(ready, Ok(Ok(_))), "pooled vault waited on another table");

    blocker.execute_batch("COMMIT")?;
    loading.await??;
    assert_eq!(manager.pooled().await, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_first_gets_load_once() -> Result<()> {
    let manager = Arc::new(VaultManager::builder().in_memory().open()?);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.get("owner", Some("group")).await })
        })
        .collect();

    let mut vaults = Vec::new();
    for task in tasks {
        vaults.push(task.await??);
    }
    assert!(vaults.iter().all(|v| Arc::ptr_eq(v, &vaults[0])));
    assert_eq!(manager.store().stats().reads(), 1);
    Ok(())
}
