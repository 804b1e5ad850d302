// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the PersistenceManager trait.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rusqlite::params;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use tessera_core::{Persistable, PersistenceManager, PoolHandle, PoolKind, Schema, TesseraError};

use crate::database::{Database, map_tr_err, table_ident};

/// SQLite-backed persistence manager.
///
/// Every registered type gets its own `(id, data)` table holding JSON
/// documents. The manager reports a ready pool after its first successful
/// [`PersistenceManager::reconnect`].
///
/// In [`PoolKind::Shared`] mode one connection serves every operation; in
/// [`PoolKind::Pseudo`] mode each operation opens its own.
pub struct SqliteManager {
    data_source: String,
    path: String,
    kind: PoolKind,
    shared: Mutex<Option<Database>>,
    schema: RwLock<Schema>,
    ready: AtomicBool,
}

impl SqliteManager {
    /// Open the datasource at `path`.
    ///
    /// Fails if the file cannot be opened, which the lifecycle treats as
    /// "datasource not available yet".
    pub async fn open(data_source: &str, path: &str, kind: PoolKind) -> Result<Self, TesseraError> {
        let db = Database::open(path).await?;
        let shared = match kind {
            PoolKind::Shared => Some(db),
            PoolKind::Pseudo => None,
        };
        Ok(Self {
            data_source: data_source.to_string(),
            path: path.to_string(),
            kind,
            shared: Mutex::new(shared),
            schema: RwLock::new(Schema::default()),
            ready: AtomicBool::new(false),
        })
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    /// The connection to run the next operation on.
    async fn db(&self) -> Result<Database, TesseraError> {
        match self.kind {
            PoolKind::Pseudo => Database::open(&self.path).await,
            PoolKind::Shared => self
                .shared
                .lock()
                .await
                .clone()
                .ok_or_else(|| TesseraError::Storage {
                    source: format!("datasource `{}` is closed", self.data_source).into(),
                }),
        }
    }

    async fn bound_table(&self, type_name: &str) -> Result<String, TesseraError> {
        if !self.schema.read().await.contains(type_name) {
            return Err(TesseraError::Storage {
                source: format!("type `{type_name}` is not bound to `{}`", self.data_source)
                    .into(),
            });
        }
        Ok(table_ident(type_name))
    }

    /// Insert or replace the JSON document stored for `id`.
    pub async fn put(
        &self,
        type_name: &str,
        id: Uuid,
        data: &serde_json::Value,
    ) -> Result<(), TesseraError> {
        let table = self.bound_table(type_name).await?;
        let sql = format!("INSERT OR REPLACE INTO {table} (id, data) VALUES (?1, ?2)");
        let id = id.to_string();
        let data = data.to_string();
        self.db()
            .await?
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(&sql, params![id, data])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fetch the JSON document stored for `id`.
    pub async fn get(
        &self,
        type_name: &str,
        id: Uuid,
    ) -> Result<Option<serde_json::Value>, TesseraError> {
        let table = self.bound_table(type_name).await?;
        let sql = format!("SELECT data FROM {table} WHERE id = ?1");
        let id = id.to_string();
        let raw = self
            .db()
            .await?
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                match conn.query_row(&sql, params![id], |row| row.get(0)) {
                    Ok(data) => Ok(Some(data)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await
            .map_err(map_tr_err)?;

        raw.map(|data| serde_json::from_str(&data))
            .transpose()
            .map_err(|e| TesseraError::Storage {
                source: Box::new(e),
            })
    }

    /// Number of rows stored for `type_name`.
    pub async fn count(&self, type_name: &str) -> Result<u64, TesseraError> {
        let table = self.bound_table(type_name).await?;
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.db()
            .await?
            .connection()
            .call(move |conn| -> Result<u64, rusqlite::Error> {
                conn.query_row(&sql, [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and release the shared connection. The pool is no longer
    /// ready afterwards.
    pub async fn close(&self) -> Result<(), TesseraError> {
        self.ready.store(false, Ordering::SeqCst);
        if let Some(db) = self.shared.lock().await.take() {
            db.checkpoint().await?;
            debug!(data_source = %self.data_source, "shared connection closed");
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceManager for SqliteManager {
    async fn reconnect(&self, schema: &Schema) -> Result<(), TesseraError> {
        let db = self.db().await?;
        db.ensure_tables(&schema.types)
            .await
            .map_err(|e| TesseraError::Reconnect {
                source: Box::new(e),
            })?;
        *self.schema.write().await = schema.clone();
        self.ready.store(true, Ordering::SeqCst);
        info!(
            data_source = %self.data_source,
            types = schema.types.len(),
            "persistence manager reconnected"
        );
        Ok(())
    }

    fn connection_pool(&self) -> Option<PoolHandle> {
        self.ready.load(Ordering::SeqCst).then(|| PoolHandle {
            data_source: self.data_source.clone(),
            kind: self.kind,
        })
    }

    async fn delete(&self, object: &dyn Persistable) -> Result<(), TesseraError> {
        let type_name = object.type_name();
        let Some(id) = object.object_id() else {
            return Err(TesseraError::Storage {
                source: format!("cannot delete `{type_name}` without an id").into(),
            });
        };
        let table = self.bound_table(type_name).await?;
        let sql = format!("DELETE FROM {table} WHERE id = ?1");
        let key = id.to_string();
        let removed = self
            .db()
            .await?
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(&sql, params![key])
            })
            .await
            .map_err(map_tr_err)?;
        debug!(type_name, %id, removed, "object deleted");
        Ok(())
    }
}
