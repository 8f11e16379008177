//! SQLite persistence for the contract hierarchy.
//!
//! The database lives at `~/.workboard/workboard.db` and is the source of
//! truth for the entity tree; the folder mirror and the operational board are
//! projections rebuilt from it. One handle owns one connection; the
//! orchestrator wraps it in a mutex and keeps calls short.

use std::path::PathBuf;

use rusqlite::Connection;

mod types;
pub use types::*;

mod cases;
mod catalog;
mod contracts;
mod milestones;
mod tasks;

pub use tasks::BoardTaskRecord;

pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    /// Open (or create) the database at `~/.workboard/workboard.db`.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Useful for testing.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open an in-memory database with the full schema. Test-only convenience
    /// that keeps scenario tests off the filesystem.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        // Cascading child deletion happens at the SQL level
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| DbError::Transaction(format!("Failed to begin: {}", e)))?;
        match f(self) {
            Ok(val) => {
                self.conn
                    .execute_batch("COMMIT")
                    .map_err(|e| DbError::Transaction(format!("Failed to commit: {}", e)))?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Resolve the default database path: `~/.workboard/workboard.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".workboard").join("workboard.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_at_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("tracker.db");
        let db = TrackerDb::open_at(path.clone()).unwrap();
        drop(db);
        assert!(path.exists());
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let db = TrackerDb::open_in_memory().unwrap();
        let result: Result<(), DbError> = db.with_transaction(|db| {
            db.conn_ref()
                .execute("INSERT INTO projects (name) VALUES ('Doomed')", [])?;
            Err(DbError::Transaction("forced".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn transaction_commits_on_ok() {
        let db = TrackerDb::open_in_memory().unwrap();
        let inserted: Result<i64, DbError> = db.with_transaction(|db| {
            db.conn_ref()
                .execute("INSERT INTO projects (name) VALUES ('Kept')", [])?;
            Ok(db.conn_ref().last_insert_rowid())
        });
        assert!(inserted.unwrap() > 0);

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
