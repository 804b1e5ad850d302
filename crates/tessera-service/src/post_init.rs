// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Second initialization phase.
//!
//! One task per registration waits until the service is `Started` and the
//! manager's pool is ready, then calls `post_initialize` exactly once.
//! State changes wake the task through the watch channel; pool readiness has
//! no notification and is re-checked on a tick.

use std::sync::{Arc, PoisonError};

use tessera_core::{LifecycleState, PersistenceManager};
use tessera_registry::RegisteredConsumer;
use tracing::{debug, info, warn};

use crate::{ConsumerService, Inner};

impl ConsumerService {
    /// Schedule the post-initialization of `entry`, once per activation.
    pub(crate) fn schedule_post_init(&self, entry: RegisteredConsumer) {
        let first = self
            .inner
            .scheduled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry.id);
        if !first {
            debug!(type_name = %entry.type_name(), id = entry.id, "post-initialization already scheduled");
            return;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let Some(manager) = wait_until_ready(&inner).await else {
                debug!(type_name = %entry.type_name(), "post-initialization cancelled");
                return;
            };
            if !inner.registry.is_registered(entry.id).await {
                debug!(type_name = %entry.type_name(), "consumer detached before post-initialization");
                return;
            }
            match entry.consumer.post_initialize(manager).await {
                Ok(()) => info!(type_name = %entry.type_name(), "consumer post-initialized"),
                Err(e) => warn!(
                    type_name = %entry.type_name(),
                    error = %e,
                    "consumer post-initialization failed"
                ),
            }
        });
    }
}

/// Resolves to the manager once the service is started and the pool is
/// ready, or `None` if the service is deactivated first.
async fn wait_until_ready(inner: &Inner) -> Option<Arc<dyn PersistenceManager>> {
    let cancel = inner.cancel.clone();
    let mut state = inner.state.subscribe();
    let mut interval = tokio::time::interval(inner.config.post_init_poll_interval());

    loop {
        let current = *state.borrow_and_update();
        match current {
            LifecycleState::Closed => return None,
            LifecycleState::Started => {
                if let Some(manager) = inner.manager()
                    && manager.connection_pool().is_some()
                {
                    return Some(manager);
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    _ = interval.tick() => {}
                }
            }
            LifecycleState::None | LifecycleState::Activated => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    changed = state.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tessera_config::ServiceConfig;
    use tessera_registry::{PluginHost, PluginListener};
    use tessera_test_utils::{MemoryManager, ScriptedConsumer, ToggleFactory};

    use super::*;

    fn service(manager: Arc<MemoryManager>) -> (ConsumerService, Arc<ToggleFactory>) {
        let factory = Arc::new(ToggleFactory::unavailable(manager));
        let service = ConsumerService::new(
            ServiceConfig::default(),
            factory.clone(),
            Arc::new(PluginHost::new()),
        );
        (service, factory)
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_settings_do_not_stall_the_service() {
        let manager = Arc::new(MemoryManager::new());
        let factory = Arc::new(ToggleFactory::available(manager.clone()));
        let config = ServiceConfig {
            start_poll_secs: 0,
            post_init_poll_ms: 0,
            ..ServiceConfig::default()
        };
        let service = ConsumerService::new(config, factory, Arc::new(PluginHost::new()));
        let consumer = Arc::new(ScriptedConsumer::new("t.A"));
        service.attach(consumer.clone()).await.unwrap();

        service.activate().unwrap();
        service.wait_for_state(LifecycleState::Started).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.set_ready(true);
        assert!(consumer.wait_post_initialized(Duration::from_secs(5)).await);
        assert_eq!(consumer.post_initialize_calls(), 1);

        service.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn early_consumer_is_post_initialized_once_after_start_and_pool() {
        let manager = Arc::new(MemoryManager::new());
        let (service, factory) = service(manager.clone());
        let consumer = Arc::new(ScriptedConsumer::new("t.A"));
        service.attach(consumer.clone()).await.unwrap();

        service.activate().unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(consumer.post_initialize_calls(), 0);

        factory.set_available(true);
        service.wait_for_state(LifecycleState::Started).await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        // Started, but the pool is not ready yet.
        assert_eq!(consumer.post_initialize_calls(), 0);

        manager.set_ready(true);
        assert!(consumer.wait_post_initialized(Duration::from_secs(5)).await);
        assert!(consumer.pool_ready_at_post_init());

        // Updates and later mutations never re-trigger it.
        service.update(consumer.clone()).await.unwrap();
        service
            .attach(Arc::new(ScriptedConsumer::new("t.B")))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(consumer.post_initialize_calls(), 1);

        service.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn late_consumer_is_post_initialized_once() {
        let manager = Arc::new(MemoryManager::ready());
        let (service, factory) = service(manager);
        factory.set_available(true);
        service.activate().unwrap();
        service.wait_for_state(LifecycleState::Started).await;

        let consumer = Arc::new(ScriptedConsumer::new("t.Late"));
        service.attach(consumer.clone()).await.unwrap();
        assert!(consumer.wait_post_initialized(Duration::from_secs(5)).await);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(consumer.post_initialize_calls(), 1);

        service.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn detached_consumer_is_skipped() {
        let manager = Arc::new(MemoryManager::new());
        let (service, factory) = service(manager.clone());
        factory.set_available(true);
        service.activate().unwrap();
        service.wait_for_state(LifecycleState::Started).await;

        let consumer = Arc::new(ScriptedConsumer::new("t.Gone"));
        service.attach(consumer.clone()).await.unwrap();
        service.detach(consumer.clone()).await.unwrap();

        manager.set_ready(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(consumer.post_initialize_calls(), 0);

        service.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_is_logged_not_propagated() {
        let manager = Arc::new(MemoryManager::ready());
        let (service, factory) = service(manager);
        factory.set_available(true);
        service.activate().unwrap();
        service.wait_for_state(LifecycleState::Started).await;

        let consumer = Arc::new(ScriptedConsumer::new("t.Bad").failing_post_initialize());
        service.attach(consumer.clone()).await.unwrap();
        assert!(consumer.wait_post_initialized(Duration::from_secs(5)).await);
        assert!(service.get_consumer("t.Bad").await.is_ok());

        service.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_cancels_pending_waiters() {
        let manager = Arc::new(MemoryManager::new());
        let (service, factory) = service(manager.clone());
        factory.set_available(true);
        service.activate().unwrap();
        service.wait_for_state(LifecycleState::Started).await;

        let consumer = Arc::new(ScriptedConsumer::new("t.A"));
        service.attach(consumer.clone()).await.unwrap();
        service.deactivate().await;

        manager.set_ready(true);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(consumer.post_initialize_calls(), 0);
    }
}
