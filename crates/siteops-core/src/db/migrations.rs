//! Database migrations
//!
//! Migrations only ever add tables, columns and indexes. Existing unsynced
//! records must survive every upgrade.

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Execute statements inside a single transaction, rolling back on failure
async fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

/// Migration to version 1: outbox and response cache
async fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            "CREATE TABLE IF NOT EXISTS outbox_records (
                id TEXT NOT NULL,
                category TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER,
                enqueued_at INTEGER NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                PRIMARY KEY (category, id)
            )",
            "CREATE TABLE IF NOT EXISTS response_cache (
                key TEXT PRIMARY KEY,
                response TEXT NOT NULL,
                stored_at INTEGER NOT NULL
            )",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )
    .await?;

    tracing::info!("Migrated outbox database to version 1");
    Ok(())
}

/// Migration to version 2: attempt tracking and retention support
async fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "ALTER TABLE outbox_records ADD COLUMN attempts INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE outbox_records ADD COLUMN synced_at INTEGER",
            "CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox_records(category, synced)",
            "CREATE INDEX IF NOT EXISTS idx_outbox_synced_at ON outbox_records(synced_at)",
            "CREATE INDEX IF NOT EXISTS idx_cache_stored_at ON response_cache(stored_at)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )
    .await?;

    tracing::info!("Migrated outbox database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn count_rows(conn: &Connection, sql: &str) -> i64 {
        let mut rows = conn.query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_v2_upgrade_keeps_unsynced_records() {
        let conn = setup().await;
        migrate_v1(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO outbox_records (id, category, payload, created_at, enqueued_at)
             VALUES ('r1', 'attendance', '{}', 10, 11)",
            (),
        )
        .await
        .unwrap();

        run(&conn).await.unwrap();

        assert_eq!(
            count_rows(
                &conn,
                "SELECT COUNT(*) FROM outbox_records WHERE synced = 0 AND attempts = 0"
            )
            .await,
            1
        );
        assert_eq!(get_version(&conn).await.unwrap(), CURRENT_VERSION);
    }
}
