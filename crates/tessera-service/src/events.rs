// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry mutations driven by plugin discovery.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tessera_config::DuplicatePolicy;
use tessera_core::{Consumer, TesseraError};
use tessera_registry::{Insertion, OnConflict, PluginListener, RegistryHook, RegistrySnapshot};
use tracing::{debug, error, info, warn};

use crate::{ConsumerService, Inner};

/// Rebinds the manager (if one exists yet) to the registry content.
///
/// Runs while the registry mutex is held. A failed reconnect is logged and
/// never rolls the mutation back.
pub(crate) struct ReconnectHook<'a> {
    inner: &'a Inner,
}

impl<'a> ReconnectHook<'a> {
    pub(crate) fn new(inner: &'a Inner) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<'a> RegistryHook for ReconnectHook<'a> {
    async fn registry_changed(&self, snapshot: &RegistrySnapshot) {
        let Some(manager) = self.inner.manager() else {
            debug!("no persistence manager yet; reconnect deferred");
            return;
        };
        if let Err(e) = manager.reconnect(&snapshot.schema()).await {
            error!(
                error = %e,
                types = snapshot.len(),
                "persistence manager reconnect failed"
            );
        }
    }
}

#[async_trait]
impl PluginListener for ConsumerService {
    async fn attach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        let inner = &self.inner;
        let type_name = consumer.type_name().to_string();
        let policy = inner.config.duplicate_policy;
        inner.ensure_open("attach")?;

        if let Some(existing) = inner.registry.get(&type_name).await {
            if existing.holds(&consumer) {
                debug!(type_name = %type_name, "consumer already registered; treating attach as update");
                return self.update(consumer).await;
            }
            if policy == DuplicatePolicy::Reject {
                warn!(type_name = %type_name, "duplicate consumer rejected");
                return Err(TesseraError::DuplicateConsumer { type_name });
            }
        }

        consumer.initialize(inner.manager()).await.inspect_err(|e| {
            warn!(type_name = %type_name, error = %e, "consumer initialization failed; not registered");
        })?;
        inner.revive(&consumer);

        let on_conflict = match policy {
            DuplicatePolicy::Replace => OnConflict::Replace,
            DuplicatePolicy::Reject => OnConflict::Keep,
        };
        let entry = match inner
            .registry
            .insert(consumer.clone(), on_conflict, &ReconnectHook::new(inner))
            .await
        {
            Insertion::Inserted(entry) => {
                info!(type_name = %type_name, version = %consumer.version(), "consumer registered");
                entry
            }
            Insertion::Replaced { entry, previous } => {
                warn!(type_name = %type_name, "consumer replaced an already registered one");
                inner.destroy_once(&previous.consumer).await;
                entry
            }
            Insertion::Rejected { .. } => {
                // Lost a race against another attach for the same type.
                warn!(type_name = %type_name, "duplicate consumer rejected");
                inner.destroy_once(&consumer).await;
                return Err(TesseraError::DuplicateConsumer { type_name });
            }
        };

        if let Some(cache) = inner.decision_cache() {
            cache.invalidate_type(&type_name);
        }
        // Deactivation may have cleared the registry while we were inserting.
        if let Err(e) = inner.ensure_open("attach") {
            inner
                .registry
                .remove(&consumer, &ReconnectHook::new(inner))
                .await;
            inner.destroy_once(&consumer).await;
            return Err(e);
        }
        // Re-read: the start routine may have bound the manager while we
        // were initializing. Double scheduling is filtered out.
        if inner.manager().is_some() {
            self.schedule_post_init(entry);
        }
        Ok(())
    }

    async fn update(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        debug!(type_name = %consumer.type_name(), "consumer modified");
        self.inner
            .registry
            .touch(&ReconnectHook::new(&self.inner))
            .await;
        Ok(())
    }

    async fn detach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        let type_name = consumer.type_name().to_string();
        // A displaced instance was destroyed when it lost its slot.
        self.inner.destroy_once(&consumer).await;

        let removed = self
            .inner
            .registry
            .remove(&consumer, &ReconnectHook::new(&self.inner))
            .await;
        match removed {
            Some(_) => {
                info!(type_name = %type_name, "consumer unregistered");
                if let Some(cache) = self.inner.decision_cache() {
                    cache.invalidate_type(&type_name);
                }
            }
            None => debug!(type_name = %type_name, "detached consumer was not the registered instance"),
        }
        Ok(())
    }
}

/// Listener handed to the discovery tracker.
///
/// The tracker is owned by the service, so it only keeps a weak reference
/// back to it.
pub(crate) struct WeakListener {
    inner: Weak<Inner>,
}

impl WeakListener {
    pub(crate) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }

    fn service(&self) -> Result<ConsumerService, TesseraError> {
        self.inner
            .upgrade()
            .map(|inner| ConsumerService { inner })
            .ok_or_else(|| TesseraError::Internal("consumer service dropped".into()))
    }
}

#[async_trait]
impl PluginListener for WeakListener {
    async fn attach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        self.service()?.attach(consumer).await
    }

    async fn update(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        self.service()?.update(consumer).await
    }

    async fn detach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError> {
        self.service()?.detach(consumer).await
    }
}
