// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory persistence manager and a switchable manager factory.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use tessera_core::{
    ManagerFactory, Persistable, PersistenceManager, PoolHandle, PoolKind, Schema, TesseraError,
};

/// A persistence manager that stores nothing and records everything.
///
/// The connection pool starts out *not ready*; call [`MemoryManager::set_ready`]
/// to simulate the pool coming up.
pub struct MemoryManager {
    data_source: String,
    ready: AtomicBool,
    fail_reconnect: AtomicBool,
    fail_delete: HashSet<Uuid>,
    reconnects: Mutex<Vec<Schema>>,
    deleted: Mutex<Vec<(String, Option<Uuid>)>>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self {
            data_source: "db_sop".to_string(),
            ready: AtomicBool::new(false),
            fail_reconnect: AtomicBool::new(false),
            fail_delete: HashSet::new(),
            reconnects: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// A manager whose pool is ready from the start.
    pub fn ready() -> Self {
        let manager = Self::new();
        manager.set_ready(true);
        manager
    }

    /// Make `delete` fail for the object with this id.
    pub fn failing_delete_of(mut self, id: Uuid) -> Self {
        self.fail_delete.insert(id);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_fail_reconnect(&self, fail: bool) {
        self.fail_reconnect.store(fail, Ordering::SeqCst);
    }

    /// Every schema passed to `reconnect`, oldest first.
    pub async fn reconnects(&self) -> Vec<Schema> {
        self.reconnects.lock().await.clone()
    }

    /// The schema of the most recent reconnect.
    pub async fn last_schema(&self) -> Option<Schema> {
        self.reconnects.lock().await.last().cloned()
    }

    /// Ids of deleted objects, in deletion order. Id-less objects are skipped.
    pub async fn deleted_ids(&self) -> Vec<Uuid> {
        self.deleted
            .lock()
            .await
            .iter()
            .filter_map(|(_, id)| *id)
            .collect()
    }

    pub async fn delete_count(&self) -> usize {
        self.deleted.lock().await.len()
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceManager for MemoryManager {
    async fn reconnect(&self, schema: &Schema) -> Result<(), TesseraError> {
        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(TesseraError::Reconnect {
                source: "simulated reconnect failure".into(),
            });
        }
        self.reconnects.lock().await.push(schema.clone());
        Ok(())
    }

    fn connection_pool(&self) -> Option<PoolHandle> {
        self.ready.load(Ordering::SeqCst).then(|| PoolHandle {
            data_source: self.data_source.clone(),
            kind: PoolKind::Shared,
        })
    }

    async fn delete(&self, object: &dyn Persistable) -> Result<(), TesseraError> {
        if let Some(id) = object.object_id()
            && self.fail_delete.contains(&id)
        {
            return Err(TesseraError::Storage {
                source: format!("simulated delete failure for {id}").into(),
            });
        }
        self.deleted
            .lock()
            .await
            .push((object.type_name().to_string(), object.object_id()));
        Ok(())
    }
}

/// A manager factory whose datasource is unavailable until switched on.
pub struct ToggleFactory {
    manager: Arc<MemoryManager>,
    available: AtomicBool,
    attempts: AtomicUsize,
}

impl ToggleFactory {
    /// A factory that fails until [`ToggleFactory::set_available`] is called.
    pub fn unavailable(manager: Arc<MemoryManager>) -> Self {
        Self {
            manager,
            available: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    /// A factory that succeeds on the first attempt.
    pub fn available(manager: Arc<MemoryManager>) -> Self {
        let factory = Self::unavailable(manager);
        factory.set_available(true);
        factory
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `create` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }
}

#[async_trait]
impl ManagerFactory for ToggleFactory {
    async fn create(&self) -> Result<Arc<dyn PersistenceManager>, TesseraError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(TesseraError::DataSourceUnavailable {
                name: self.manager.data_source.clone(),
            });
        }
        Ok(self.manager.clone())
    }
}
