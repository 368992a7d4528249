//! Stores a few values, reopens the database and prints what came back.
//!
//! Run with `RUST_LOG=graphvault=debug cargo run --example vault_basics`.

use graphvault::{Value, VaultInspector, VaultManager};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> graphvault::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let dir = std::env::temp_dir().join("graphvault-demo");
    std::fs::create_dir_all(&dir).map_err(|e| graphvault::VaultError::Internal(e.to_string()))?;
    let path = dir.join("demo.db");

    {
        let manager = VaultManager::builder().path(&path).open()?;
        let vault = manager.get("demo-user", Some("settings")).await?;
        let mut vault = vault.lock().await;
        vault
            .store_many([
                (
                    "counters",
                    Value::map([
                        ("x", Value::list([1, 2, 3])),
                        ("y", Value::tuple(["a", "b"])),
                    ]),
                ),
                ("notify", Value::Bool(true)),
                ("roles", Value::set(["admin", "mod"])),
            ])
            .await?;
    }

    let manager = VaultManager::builder().path(&path).open()?;
    let vault = manager.get("demo-user", Some("settings")).await?;
    let vault = vault.lock().await;
    for key in ["counters", "notify", "roles", "missing"] {
        println!("{key:>10} = {}", vault.get(key, "<default>"));
    }

    let report = VaultInspector::inspect(manager.store(), vault.table())?;
    println!("\n{report}");
    Ok(())
}
