// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery: where consumers come from and how their arrival is tracked.
//!
//! A [`PluginSource`] publishes consumers; opening it yields every consumer
//! already published followed by live events. A [`DiscoveryTracker`] drains
//! that stream on a background task and forwards each event to a
//! [`PluginListener`] (normally the consumer service).

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tessera_core::{Consumer, TesseraError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A change in the set of published consumers.
#[derive(Clone)]
pub enum DiscoveryEvent {
    Attached(Arc<dyn Consumer>),
    Modified(Arc<dyn Consumer>),
    Detached(Arc<dyn Consumer>),
}

impl DiscoveryEvent {
    pub fn consumer(&self) -> &Arc<dyn Consumer> {
        match self {
            DiscoveryEvent::Attached(c) | DiscoveryEvent::Modified(c) | DiscoveryEvent::Detached(c) => c,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            DiscoveryEvent::Attached(_) => "attached",
            DiscoveryEvent::Modified(_) => "modified",
            DiscoveryEvent::Detached(_) => "detached",
        }
    }
}

impl std::fmt::Debug for DiscoveryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.consumer().type_name())
    }
}

/// Receiver of attach/update/detach notifications.
#[async_trait]
pub trait PluginListener: Send + Sync {
    async fn attach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError>;

    async fn update(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError>;

    async fn detach(&self, consumer: Arc<dyn Consumer>) -> Result<(), TesseraError>;
}

/// The hosting platform's discovery primitive.
pub trait PluginSource: Send + Sync {
    /// Subscribe to consumer events.
    ///
    /// The stream starts with an `Attached` event for every consumer that is
    /// already published.
    fn open(&self) -> mpsc::UnboundedReceiver<DiscoveryEvent>;
}

#[derive(Default)]
struct HostState {
    published: Vec<Arc<dyn Consumer>>,
    subscribers: Vec<mpsc::UnboundedSender<DiscoveryEvent>>,
}

impl HostState {
    fn broadcast(&mut self, event: DiscoveryEvent) {
        self.subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-process [`PluginSource`]: consumers are published by calling methods on it.
#[derive(Default)]
pub struct PluginHost {
    state: Mutex<HostState>,
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a consumer and notify subscribers.
    pub fn publish(&self, consumer: Arc<dyn Consumer>) {
        let mut state = self.state();
        state.published.push(consumer.clone());
        state.broadcast(DiscoveryEvent::Attached(consumer));
    }

    /// Announce that a published consumer changed its properties.
    ///
    /// Returns false if `consumer` is not published.
    pub fn modify(&self, consumer: &Arc<dyn Consumer>) -> bool {
        let mut state = self.state();
        if !state.published.iter().any(|c| Arc::ptr_eq(c, consumer)) {
            return false;
        }
        state.broadcast(DiscoveryEvent::Modified(consumer.clone()));
        true
    }

    /// Withdraw a published consumer.
    ///
    /// Returns false if `consumer` is not published.
    pub fn withdraw(&self, consumer: &Arc<dyn Consumer>) -> bool {
        let mut state = self.state();
        let Some(pos) = state.published.iter().position(|c| Arc::ptr_eq(c, consumer)) else {
            return false;
        };
        let removed = state.published.remove(pos);
        state.broadcast(DiscoveryEvent::Detached(removed));
        true
    }

    pub fn published(&self) -> usize {
        self.state().published.len()
    }
}

impl PluginSource for PluginHost {
    fn open(&self) -> mpsc::UnboundedReceiver<DiscoveryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        for consumer in &state.published {
            // The receiver is alive, so this cannot fail.
            let _ = tx.send(DiscoveryEvent::Attached(consumer.clone()));
        }
        state.subscribers.push(tx);
        rx
    }
}

/// Forwards discovery events to a listener until closed.
pub struct DiscoveryTracker {
    cancel: CancellationToken,
    task: JoinHandle<Vec<Arc<dyn Consumer>>>,
    listener: Arc<dyn PluginListener>,
}

impl DiscoveryTracker {
    /// Open `source` and start forwarding its events to `listener`.
    pub fn open(source: &dyn PluginSource, listener: Arc<dyn PluginListener>) -> Self {
        let cancel = CancellationToken::new();
        let events = source.open();
        let task = tokio::spawn(track(events, listener.clone(), cancel.clone()));
        Self {
            cancel,
            task,
            listener,
        }
    }

    /// Stop forwarding and detach every consumer this tracker attached.
    pub async fn close(self) {
        self.cancel.cancel();
        let tracked = match self.task.await {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(error = %e, "discovery task ended abnormally");
                return;
            }
        };

        for consumer in tracked.into_iter().rev() {
            if let Err(e) = self.listener.detach(consumer.clone()).await {
                warn!(type_name = %consumer.type_name(), error = %e, "detach on close failed");
            }
        }
    }
}

async fn track(
    mut events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    listener: Arc<dyn PluginListener>,
    cancel: CancellationToken,
) -> Vec<Arc<dyn Consumer>> {
    let mut tracked: Vec<Arc<dyn Consumer>> = Vec::new();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        debug!(event = ?event, "discovery event");
        let consumer = event.consumer().clone();
        let result = match &event {
            DiscoveryEvent::Attached(_) => {
                let result = listener.attach(consumer.clone()).await;
                if result.is_ok() {
                    tracked.push(consumer.clone());
                }
                result
            }
            DiscoveryEvent::Modified(_) => listener.update(consumer.clone()).await,
            DiscoveryEvent::Detached(_) => {
                let Some(pos) = tracked.iter().position(|c| Arc::ptr_eq(c, &consumer)) else {
                    // Never attached successfully; nothing to undo.
                    continue;
                };
                tracked.remove(pos);
                listener.detach(consumer.clone()).await
            }
        };

        if let Err(e) = result {
            warn!(
                type_name = %consumer.type_name(),
                event = event.kind(),
                error = %e,
                "discovery event handling failed"
            );
        }
    }

    tracked
}
