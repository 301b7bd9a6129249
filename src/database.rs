use log::info;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;

use crate::error::MigrateError;

const CREATE_MIGRATION_LOG_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self, MigrateError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(MigrateError::Error(format!(
                    "Database folder '{}' does not exist or is not a directory",
                    parent.display()
                )));
            }
        }

        let conn = Connection::open(db_path)?;
        info!("Database opened at: {}", db_path.display());

        Self::init(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, MigrateError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, MigrateError> {
        // Cascades on order_pets and driver references depend on this
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(CREATE_MIGRATION_LOG_SQL)?;

        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>, MigrateError> {
        Ok(self.conn.transaction()?)
    }

    pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, MigrateError> {
        Self::exists_in_master(conn, "table", table)
    }

    #[cfg(test)]
    pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, MigrateError> {
        Self::exists_in_master(conn, "index", index)
    }

    fn exists_in_master(conn: &Connection, kind: &str, name: &str) -> Result<bool, MigrateError> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2 LIMIT 1",
                [kind, name],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        Ok(found)
    }

    pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, MigrateError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |row| row.get(0),
        )?;

        Ok(count > 0)
    }

    /// Names of the columns of `table` in declaration order. Empty if the table is missing.
    #[cfg(test)]
    pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, MigrateError> {
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(names)
    }

    pub fn applied_at(conn: &Connection, unit: &str) -> Result<Option<String>, MigrateError> {
        let applied_at = conn
            .query_row(
                "SELECT applied_at FROM schema_migrations WHERE name = ?",
                [unit],
                |row| row.get(0),
            )
            .optional()?;

        Ok(applied_at)
    }

    pub fn record_applied(
        conn: &Connection,
        unit: &str,
        kind: &str,
        applied_at: &str,
    ) -> Result<(), MigrateError> {
        conn.execute(
            "INSERT INTO schema_migrations (name, kind, applied_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET kind = excluded.kind, applied_at = excluded.applied_at",
            [unit, kind, applied_at],
        )?;

        Ok(())
    }
}
