// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence manager traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TesseraError;
use crate::traits::object::Persistable;
use crate::types::{PoolHandle, Schema};

/// The shared persistence manager all consumers are bound to.
#[async_trait]
pub trait PersistenceManager: Send + Sync + 'static {
    /// Re-binds the manager to the given set of registered types.
    async fn reconnect(&self, schema: &Schema) -> Result<(), TesseraError>;

    /// The connection pool, or `None` while the manager cannot serve requests.
    fn connection_pool(&self) -> Option<PoolHandle>;

    /// Deletes a single object. Does not touch related objects.
    async fn delete(&self, object: &dyn Persistable) -> Result<(), TesseraError>;
}

/// Builds the persistence manager once its datasource is reachable.
///
/// The lifecycle keeps calling [`ManagerFactory::create`] until it succeeds;
/// an error means "not available yet", not "give up".
#[async_trait]
pub trait ManagerFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn PersistenceManager>, TesseraError>;
}
