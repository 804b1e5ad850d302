// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime table of datasources the manager factory can bind to.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tessera_config::TesseraConfig;
use tracing::info;

/// Named SQLite datasources, shared between the factory and whoever
/// provisions them.
///
/// A datasource that is not registered is "not available yet": the
/// lifecycle keeps polling until it appears.
#[derive(Debug, Clone, Default)]
pub struct DataSources {
    paths: Arc<RwLock<BTreeMap<String, String>>>,
}

impl DataSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the table from the `[datasources]` section of the config.
    pub fn from_config(config: &TesseraConfig) -> Self {
        let sources = Self::new();
        for (name, ds) in &config.datasources {
            sources.register(name, &ds.path);
        }
        sources
    }

    /// Make `name` available at `path`, replacing any earlier path.
    pub fn register(&self, name: &str, path: &str) {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), path.to_string());
        info!(data_source = name, path, "datasource registered");
    }

    /// Returns true if `name` was registered.
    pub fn unregister(&self, name: &str) -> bool {
        self.paths
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some()
    }

    pub fn resolve(&self, name: &str) -> Option<String> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.paths
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
