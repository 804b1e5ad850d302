// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Tessera consumer service.
//!
//! A [`ConsumerService`] owns the consumer registry and the shared
//! persistence manager. It:
//! - Waits in the background for the manager's datasource to appear
//! - Registers consumers as discovery reports them, reconnecting the manager
//!   after every change
//! - Runs each consumer's second initialization phase once the pool is ready
//! - Deletes CHILD-linked descendants of an object across all consumers
//! - Delegates permission checks and lookups to the owning consumer

pub mod access;
pub mod cascade;
mod events;
pub mod lifecycle;
mod post_init;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tessera_config::ServiceConfig;
use tessera_core::{Consumer, LifecycleState, ManagerFactory, PersistenceManager, TesseraError};
use tessera_registry::{
    ConsumerRegistry, DiscoveryTracker, PluginSource, RegistrationId, RegistrySnapshot,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use access::{DecisionCache, DecisionKey, TtlDecisionCache};
pub use cascade::CascadeReport;

/// Cloneable handle to a consumer service instance.
///
/// One instance goes through `None → Activated → Started → Closed` exactly
/// once. Call [`ConsumerService::deactivate`] before dropping the last
/// handle; background tasks keep the instance alive until then.
#[derive(Clone)]
pub struct ConsumerService {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: ServiceConfig,
    factory: Arc<dyn ManagerFactory>,
    source: Arc<dyn PluginSource>,
    state: watch::Sender<LifecycleState>,
    registry: ConsumerRegistry,
    manager: RwLock<Option<Arc<dyn PersistenceManager>>>,
    cancel: CancellationToken,
    start_task: Mutex<Option<JoinHandle<()>>>,
    tracker: tokio::sync::Mutex<Option<DiscoveryTracker>>,
    /// Registrations whose post-initialization has been scheduled during this activation.
    scheduled: Mutex<HashSet<RegistrationId>>,
    decision_cache: RwLock<Option<Arc<dyn DecisionCache>>>,
    /// Instances already destroyed since their last successful initialize.
    destroyed: Mutex<Vec<Weak<dyn Consumer>>>,
}

impl Inner {
    pub(crate) fn manager(&self) -> Option<Arc<dyn PersistenceManager>> {
        self.manager
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_manager(&self, manager: Option<Arc<dyn PersistenceManager>>) {
        *self.manager.write().unwrap_or_else(PoisonError::into_inner) = manager;
    }

    pub(crate) fn decision_cache(&self) -> Option<Arc<dyn DecisionCache>> {
        self.decision_cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Fails with `InvalidTransition` once the service is closed.
    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<(), TesseraError> {
        match self.state() {
            LifecycleState::Closed => Err(TesseraError::InvalidTransition {
                operation,
                state: LifecycleState::Closed,
            }),
            _ => Ok(()),
        }
    }

    /// Call `destroy` on `consumer` unless it was already destroyed.
    pub(crate) async fn destroy_once(&self, consumer: &Arc<dyn Consumer>) {
        {
            let mut destroyed = self.destroyed.lock().unwrap_or_else(PoisonError::into_inner);
            destroyed.retain(|weak| weak.strong_count() > 0);
            if destroyed
                .iter()
                .any(|weak| std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(consumer)))
            {
                debug!(type_name = %consumer.type_name(), "consumer already destroyed");
                return;
            }
            destroyed.push(Arc::downgrade(consumer));
        }
        consumer.destroy().await;
    }

    /// A freshly initialized instance may be destroyed again.
    pub(crate) fn revive(&self, consumer: &Arc<dyn Consumer>) {
        self.destroyed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|weak| !std::ptr::addr_eq(weak.as_ptr(), Arc::as_ptr(consumer)));
    }
}

impl ConsumerService {
    /// Create a service in the `None` state.
    ///
    /// `factory` builds the persistence manager once its datasource is
    /// reachable; `source` is where consumer plugins are discovered.
    pub fn new(
        config: ServiceConfig,
        factory: Arc<dyn ManagerFactory>,
        source: Arc<dyn PluginSource>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::None);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                source,
                state,
                registry: ConsumerRegistry::new(),
                manager: RwLock::new(None),
                cancel: CancellationToken::new(),
                start_task: Mutex::new(None),
                tracker: tokio::sync::Mutex::new(None),
                scheduled: Mutex::new(HashSet::new()),
                decision_cache: RwLock::new(None),
                destroyed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Install a cache for authorization verdicts.
    pub fn with_decision_cache(self, cache: Arc<dyn DecisionCache>) -> Self {
        *self
            .inner
            .decision_cache
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(cache);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Current lifecycle state.
    pub fn status(&self) -> LifecycleState {
        self.inner.state()
    }

    /// Wait until the lifecycle has reached `target` (or moved past it).
    ///
    /// Returns the state observed when the wait ended.
    pub async fn wait_for_state(&self, target: LifecycleState) -> LifecycleState {
        let mut rx = self.inner.state.subscribe();
        match rx.wait_for(|state| *state >= target).await {
            Ok(state) => *state,
            // The sender lives in `inner`, which we hold.
            Err(_) => self.status(),
        }
    }

    /// The persistence manager, once constructed.
    pub fn manager(&self) -> Option<Arc<dyn PersistenceManager>> {
        self.inner.manager()
    }

    /// Point-in-time copy of the registered consumers.
    pub async fn consumers(&self) -> RegistrySnapshot {
        self.inner.registry.snapshot().await
    }
}

impl std::fmt::Debug for ConsumerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerService")
            .field("service_name", &self.inner.config.service_name)
            .field("state", &self.status())
            .finish()
    }
}
