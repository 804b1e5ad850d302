// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted consumer plugin for testing.
//!
//! Everything a [`ScriptedConsumer`] answers is fixed up front with builder
//! methods; everything the service does to it is counted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uuid::Uuid;

use tessera_core::{
    Action, Consumer, LookupKey, Persistable, PersistenceManager, Reference, ReferenceCollector,
    TesseraError,
};

/// A consumer whose answers are scripted and whose lifecycle calls are counted.
pub struct ScriptedConsumer {
    type_name: String,
    version: semver::Version,
    allowed: HashSet<Action>,
    objects: HashMap<LookupKey, Arc<dyn Persistable>>,
    references: HashMap<Uuid, Vec<Reference>>,
    initialize_delay: Option<Duration>,
    fail_initialize: bool,
    fail_post_initialize: bool,
    fail_references: bool,
    fail_authorize: bool,
    initialize_calls: AtomicUsize,
    post_initialize_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    initialized_with_manager: AtomicBool,
    pool_ready_at_post_init: AtomicBool,
    post_initialized: Notify,
}

impl ScriptedConsumer {
    /// A consumer for `type_name` that denies everything and knows nothing.
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            version: semver::Version::new(1, 0, 0),
            allowed: HashSet::new(),
            objects: HashMap::new(),
            references: HashMap::new(),
            initialize_delay: None,
            fail_initialize: false,
            fail_post_initialize: false,
            fail_references: false,
            fail_authorize: false,
            initialize_calls: AtomicUsize::new(0),
            post_initialize_calls: AtomicUsize::new(0),
            destroy_calls: AtomicUsize::new(0),
            initialized_with_manager: AtomicBool::new(false),
            pool_ready_at_post_init: AtomicBool::new(false),
            post_initialized: Notify::new(),
        }
    }

    pub fn with_version(mut self, version: semver::Version) -> Self {
        self.version = version;
        self
    }

    /// Grant `action` on every object.
    pub fn allowing(mut self, action: Action) -> Self {
        self.allowed.insert(action);
        self
    }

    /// Answer lookups for `key` with `object`.
    pub fn with_object(mut self, key: impl Into<LookupKey>, object: Arc<dyn Persistable>) -> Self {
        self.objects.insert(key.into(), object);
        self
    }

    /// Report `reference` whenever asked about `source`.
    ///
    /// Sources without an id cannot carry references.
    pub fn with_reference(mut self, source: &dyn Persistable, reference: Reference) -> Self {
        if let Some(id) = source.object_id() {
            self.references.entry(id).or_default().push(reference);
        }
        self
    }

    /// Shorthand for a child reference from `source` to `target`.
    pub fn with_child(self, source: &dyn Persistable, target: Arc<dyn Persistable>) -> Self {
        self.with_reference(source, Reference::child(target))
    }

    /// Sleep this long inside `initialize`.
    pub fn with_initialize_delay(mut self, delay: Duration) -> Self {
        self.initialize_delay = Some(delay);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn failing_post_initialize(mut self) -> Self {
        self.fail_post_initialize = true;
        self
    }

    pub fn failing_references(mut self) -> Self {
        self.fail_references = true;
        self
    }

    pub fn failing_authorize(mut self) -> Self {
        self.fail_authorize = true;
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn post_initialize_calls(&self) -> usize {
        self.post_initialize_calls.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    /// Whether the last `initialize` received a manager.
    pub fn initialized_with_manager(&self) -> bool {
        self.initialized_with_manager.load(Ordering::SeqCst)
    }

    /// Whether the connection pool was ready when `post_initialize` ran.
    pub fn pool_ready_at_post_init(&self) -> bool {
        self.pool_ready_at_post_init.load(Ordering::SeqCst)
    }

    /// Wait until `post_initialize` has been called at least once.
    ///
    /// Returns false if `timeout` elapses first.
    pub async fn wait_post_initialized(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.post_initialized.notified();
                if self.post_initialize_calls() > 0 {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

#[async_trait]
impl Consumer for ScriptedConsumer {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn version(&self) -> semver::Version {
        self.version.clone()
    }

    async fn initialize(
        &self,
        manager: Option<Arc<dyn PersistenceManager>>,
    ) -> Result<(), TesseraError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.initialized_with_manager
            .store(manager.is_some(), Ordering::SeqCst);
        if let Some(delay) = self.initialize_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_initialize {
            return Err(TesseraError::consumer(&self.type_name, "scripted initialize failure"));
        }
        Ok(())
    }

    async fn post_initialize(
        &self,
        manager: Arc<dyn PersistenceManager>,
    ) -> Result<(), TesseraError> {
        self.pool_ready_at_post_init
            .store(manager.connection_pool().is_some(), Ordering::SeqCst);
        self.post_initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.post_initialized.notify_waiters();
        if self.fail_post_initialize {
            return Err(TesseraError::consumer(
                &self.type_name,
                "scripted post-initialize failure",
            ));
        }
        Ok(())
    }

    async fn destroy(&self) {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn authorize(
        &self,
        action: Action,
        _object: &dyn Persistable,
    ) -> Result<bool, TesseraError> {
        if self.fail_authorize {
            return Err(TesseraError::consumer(&self.type_name, "scripted authorize failure"));
        }
        Ok(self.allowed.contains(&action))
    }

    async fn lookup(
        &self,
        _type_name: &str,
        key: &LookupKey,
    ) -> Result<Option<Arc<dyn Persistable>>, TesseraError> {
        Ok(self.objects.get(key).cloned())
    }

    async fn collect_references(
        &self,
        object: &dyn Persistable,
        collector: &mut dyn ReferenceCollector,
    ) -> Result<(), TesseraError> {
        if self.fail_references {
            return Err(TesseraError::consumer(&self.type_name, "scripted reference failure"));
        }
        let Some(id) = object.object_id() else {
            return Ok(());
        };
        for reference in self.references.get(&id).into_iter().flatten() {
            collector.found_reference(reference.clone());
        }
        Ok(())
    }
}
