// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection handling and per-type table management.
//!
//! Every statement runs on tokio-rusqlite's background thread for the
//! connection it was issued on.

use tessera_core::TesseraError;
use tracing::debug;

/// Convert a tokio-rusqlite error into `TesseraError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TesseraError {
    TesseraError::Storage {
        source: Box::new(e),
    }
}

/// Quote a type name for use as a table identifier.
///
/// Type names are dotted paths such as `billing.Invoice`, so they always need
/// quoting. Embedded quotes are doubled.
pub fn table_ident(type_name: &str) -> String {
    format!("\"{}\"", type_name.replace('"', "\"\""))
}

/// A single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (or create) the database at `path` and apply connection pragmas.
    pub async fn open(path: &str) -> Result<Self, TesseraError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TesseraError::Storage {
                source: Box::new(e),
            })?;

        conn.call(|conn| -> Result<(), rusqlite::Error> {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create one `(id, data)` table per type name if missing.
    pub async fn ensure_tables(&self, type_names: &[String]) -> Result<(), TesseraError> {
        let statements: String = type_names
            .iter()
            .map(|t| {
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, data TEXT NOT NULL);\n",
                    table_ident(t)
                )
            })
            .collect();
        if statements.is_empty() {
            return Ok(());
        }

        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&statements)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Names of every user table, sorted.
    pub async fn tables(&self) -> Result<Vec<String>, TesseraError> {
        self.conn
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master
                     WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint the WAL. Called before a connection is dropped.
    pub async fn checkpoint(&self) -> Result<(), TesseraError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn table_ident_quotes_and_escapes() {
        assert_eq!(table_ident("billing.Invoice"), "\"billing.Invoice\"");
        assert_eq!(table_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[tokio::test]
    async fn open_creates_file_and_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tables.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        assert!(path.exists());

        db.ensure_tables(&["b.Two".to_string(), "a.One".to_string()])
            .await
            .unwrap();
        // Idempotent.
        db.ensure_tables(&["a.One".to_string()]).await.unwrap();

        assert_eq!(db.tables().await.unwrap(), vec!["a.One", "b.Two"]);
    }

    #[tokio::test]
    async fn empty_type_list_is_a_no_op() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("empty.db").to_str().unwrap())
            .await
            .unwrap();
        db.ensure_tables(&[]).await.unwrap();
        assert!(db.tables().await.unwrap().is_empty());
    }
}
