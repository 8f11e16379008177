//! Schema migration framework.
//!
//! Numbered SQL migrations are embedded at compile time via `include_str!`.
//! Each migration runs exactly once, tracked by the `schema_version` table.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Create the `schema_version` table if it doesn't exist.
fn ensure_schema_version_table(conn: &Connection) -> Result<(), String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))
}

/// Return the highest applied migration version, or 0 if none.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Apply all pending migrations in order.
pub fn run_migrations(conn: &Connection) -> Result<(), String> {
    ensure_schema_version_table(conn)?;
    let applied = current_version(conn)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("Migration {} failed: {}", migration.version, e))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("Failed to record migration {}: {}", migration.version, e))?;
        log::info!("Applied schema migration v{}", migration.version);
    }

    Ok(())
}
