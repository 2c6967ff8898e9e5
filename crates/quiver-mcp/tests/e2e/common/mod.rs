//! Shared harness: server state over in-memory SQLite, with a seeded
//! sales table in the data database.

use std::sync::Arc;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use quiver_core::{Dialect, QuiverConfig};
use quiver_mcp::state::DataSession;
use quiver_mcp::{Dispatcher, ServerState};

/// One-connection pools keep every query on the same in-memory database.
async fn memory_pool() -> AnyPool {
    sqlx::any::install_default_drivers();
    AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite pool")
}

async fn seed_sales(pool: &AnyPool) {
    sqlx::query(
        "CREATE TABLE sales (
            id INTEGER PRIMARY KEY,
            business_date TEXT NOT NULL,
            store TEXT NOT NULL,
            department TEXT NOT NULL,
            amount REAL NOT NULL
        )",
    )
    .execute(pool)
    .await
    .expect("create sales table");

    let rows = [
        ("2024-03-01", "A", "toys", 120.5),
        ("2024-03-01", "A", "books", 80.0),
        ("2024-03-01", "B", "toys", 55.0),
        ("2024-03-02", "B", "books", 33.0),
        ("2024-03-02", "C", "toys", 910.0),
    ];
    for (date, store, department, amount) in rows {
        sqlx::query(
            "INSERT INTO sales (business_date, store, department, amount)
             VALUES (?, ?, ?, ?)",
        )
        .bind(date)
        .bind(store)
        .bind(department)
        .bind(amount)
        .execute(pool)
        .await
        .expect("insert sales row");
    }
}

fn test_config() -> QuiverConfig {
    let mut config = QuiverConfig::default();
    config.databases.metadata_url = "sqlite::memory:".to_string();
    config.dashboard.enabled = true;
    config.dashboard.storage_dir = std::env::temp_dir()
        .join("quiver-e2e-dashboards")
        .to_string_lossy()
        .into_owned();
    config
}

/// Full online state: seeded registry plus a data session with sales data.
pub async fn online_state() -> Arc<ServerState> {
    let meta = memory_pool().await;
    let data = memory_pool().await;
    seed_sales(&data).await;
    ServerState::open_with_pools(
        test_config(),
        meta,
        Some(DataSession {
            pool: data,
            dialect: Dialect::Sqlite,
        }),
    )
    .await
    .expect("open server state")
}

/// Offline state: no data session at all.
pub async fn offline_state() -> Arc<ServerState> {
    let meta = memory_pool().await;
    ServerState::open_with_pools(test_config(), meta, None)
        .await
        .expect("open server state")
}

pub async fn online_dispatcher() -> Dispatcher {
    Dispatcher::new(online_state().await)
}
