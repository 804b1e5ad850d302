// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds a [`SqliteManager`] once its datasource is registered.

use std::sync::Arc;

use async_trait::async_trait;
use tessera_config::ServiceConfig;
use tessera_core::{ManagerFactory, PersistenceManager, PoolKind, TesseraError};
use tracing::debug;

use crate::datasources::DataSources;
use crate::manager::SqliteManager;

pub struct SqliteManagerFactory {
    sources: DataSources,
    data_source: String,
    kind: PoolKind,
}

impl SqliteManagerFactory {
    pub fn new(sources: DataSources, data_source: &str, kind: PoolKind) -> Self {
        Self {
            sources,
            data_source: data_source.to_string(),
            kind,
        }
    }

    /// Factory for the datasource and pool mode named in `config`.
    pub fn from_config(config: &ServiceConfig, sources: DataSources) -> Self {
        let kind = if config.use_pseudo_pool {
            PoolKind::Pseudo
        } else {
            PoolKind::Shared
        };
        Self::new(sources, &config.data_source_name, kind)
    }
}

#[async_trait]
impl ManagerFactory for SqliteManagerFactory {
    async fn create(&self) -> Result<Arc<dyn PersistenceManager>, TesseraError> {
        let path = self
            .sources
            .resolve(&self.data_source)
            .ok_or_else(|| TesseraError::DataSourceUnavailable {
                name: self.data_source.clone(),
            })?;
        debug!(data_source = %self.data_source, path = %path, "opening datasource");
        let manager = SqliteManager::open(&self.data_source, &path, self.kind).await?;
        Ok(Arc::new(manager))
    }
}
