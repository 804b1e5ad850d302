// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Activation, background start and deactivation.
//!
//! `activate` returns immediately. The start routine then polls the manager
//! factory until the datasource is reachable, binds the manager to the
//! registry and opens plugin discovery.

use std::sync::{Arc, PoisonError};

use tessera_core::{LifecycleState, TesseraError};
use tessera_registry::DiscoveryTracker;
use tracing::{debug, info, warn};

use crate::events::{ReconnectHook, WeakListener};
use crate::{ConsumerService, Inner};

impl Inner {
    /// Move the lifecycle forward to `to`. Returns false if the state is
    /// already at or past `to`.
    pub(crate) fn advance(&self, to: LifecycleState) -> bool {
        let moved = self.state.send_if_modified(|state| {
            if *state < to {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            info!(service = %self.config.service_name, state = %to, "lifecycle state changed");
        }
        moved
    }
}

impl ConsumerService {
    /// Activate the service.
    ///
    /// Moves to `Activated` and, when the service is enabled, spawns the
    /// start routine. Only valid from `None`.
    pub fn activate(&self) -> Result<(), TesseraError> {
        let state = self.status();
        if state != LifecycleState::None || !self.inner.advance(LifecycleState::Activated) {
            return Err(TesseraError::InvalidTransition {
                operation: "activate",
                state,
            });
        }

        if !self.inner.config.enabled {
            info!(
                service = %self.inner.config.service_name,
                "consumer service is not enabled; staying activated"
            );
            return Ok(());
        }

        let handle = tokio::spawn(start(self.clone()));
        *self
            .inner
            .start_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Deactivate the service.
    ///
    /// Moves to `Closed`, stops every background task, closes discovery
    /// (detaching the plugins it attached), destroys whatever is still
    /// registered and drops the manager. Calling it again is a no-op.
    pub async fn deactivate(&self) {
        if !self.inner.advance(LifecycleState::Closed) {
            debug!("deactivate on a closed service ignored");
            return;
        }
        self.inner.cancel.cancel();

        let start_task = self
            .inner
            .start_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = start_task
            && let Err(e) = task.await
        {
            warn!(error = %e, "start routine ended abnormally");
        }

        if let Some(tracker) = self.inner.tracker.lock().await.take() {
            tracker.close().await;
        }

        for entry in self.inner.registry.clear().await {
            debug!(type_name = %entry.type_name(), "destroying consumer on deactivate");
            self.inner.destroy_once(&entry.consumer).await;
        }
        if let Some(cache) = self.inner.decision_cache() {
            cache.clear();
        }
        self.inner.set_manager(None);
        info!(service = %self.inner.config.service_name, "consumer service stopped");
    }
}

/// Background start routine: runs until the manager exists or the service
/// is deactivated.
async fn start(service: ConsumerService) {
    let inner = &service.inner;
    let cancel = inner.cancel.clone();
    let mut interval = tokio::time::interval(inner.config.start_poll_interval());

    let manager = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            attempt = inner.factory.create() => attempt,
        };
        match attempt {
            Ok(manager) => break manager,
            Err(e) => info!(
                data_source = %inner.config.data_source_name,
                error = %e,
                "waiting for datasource"
            ),
        }
    };

    inner.set_manager(Some(manager));
    inner.registry.touch(&ReconnectHook::new(inner)).await;

    // Plugins registered before the manager existed get their second phase now.
    for entry in inner.registry.snapshot().await.entries() {
        service.schedule_post_init(entry.clone());
    }

    let listener = Arc::new(WeakListener::new(Arc::downgrade(&service.inner)));
    let tracker = DiscoveryTracker::open(inner.source.as_ref(), listener);
    *inner.tracker.lock().await = Some(tracker);

    inner.advance(LifecycleState::Started);
}
