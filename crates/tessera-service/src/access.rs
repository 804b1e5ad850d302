// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Permission delegation and object lookup through the owning consumer.
//!
//! A denied or undecidable permission check is `false`, never an error.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tessera_config::ServiceConfig;
use tessera_core::{Action, Consumer, LookupKey, Persistable, PersistableType, TesseraError};
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ConsumerService;

/// Identity of a cached authorization verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub action: Action,
    pub type_name: String,
    pub object_id: Uuid,
}

/// Storage for authorization verdicts.
///
/// Only objects with an id are ever cached.
pub trait DecisionCache: Send + Sync {
    fn get(&self, key: &DecisionKey) -> Option<bool>;

    fn put(&self, key: DecisionKey, allowed: bool);

    /// Forget every verdict for `type_name`. Called when its consumer changes.
    fn invalidate_type(&self, type_name: &str);

    fn clear(&self);
}

/// Entry count above which `put` sweeps expired verdicts.
const SWEEP_THRESHOLD: usize = 1024;

/// A [`DecisionCache`] whose entries expire after a fixed time to live.
///
/// Verdicts are shared by every caller of the service. Install it only when
/// consumer decisions do not depend on who is asking.
pub struct TtlDecisionCache {
    ttl: Duration,
    sweep_threshold: usize,
    entries: DashMap<DecisionKey, (bool, Instant)>,
}

impl TtlDecisionCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_sweep_threshold(ttl, SWEEP_THRESHOLD)
    }

    /// Like [`TtlDecisionCache::new`], sweeping once more than `threshold` entries are held.
    pub fn with_sweep_threshold(ttl: Duration, threshold: usize) -> Self {
        Self {
            ttl,
            sweep_threshold: threshold,
            entries: DashMap::new(),
        }
    }

    /// The cache configured by `decision_cache_ttl_secs`, or `None` when it is 0.
    pub fn from_config(config: &ServiceConfig) -> Option<Self> {
        config.decision_cache_ttl().map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DecisionCache for TtlDecisionCache {
    fn get(&self, key: &DecisionKey) -> Option<bool> {
        let (allowed, stored_at) = *self.entries.get(key)?;
        if stored_at.elapsed() >= self.ttl {
            self.entries.remove(key);
            return None;
        }
        Some(allowed)
    }

    fn put(&self, key: DecisionKey, allowed: bool) {
        if self.entries.len() >= self.sweep_threshold {
            let ttl = self.ttl;
            self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
        }
        self.entries.insert(key, (allowed, Instant::now()));
    }

    fn invalidate_type(&self, type_name: &str) {
        self.entries.retain(|key, _| key.type_name != type_name);
    }

    fn clear(&self) {
        self.entries.clear();
    }
}

impl ConsumerService {
    /// The consumer registered for `type_name`.
    ///
    /// A blank name or an unregistered type is a `Lookup` error.
    pub async fn get_consumer(&self, type_name: &str) -> Result<Arc<dyn Consumer>, TesseraError> {
        if type_name.trim().is_empty() {
            return Err(TesseraError::lookup(type_name, "type name is empty"));
        }
        self.inner
            .registry
            .get(type_name)
            .await
            .map(|entry| entry.consumer)
            .ok_or_else(|| TesseraError::lookup(type_name, "no consumer registered"))
    }

    /// Look an object of `type_name` up through its consumer.
    pub async fn get_object(
        &self,
        type_name: &str,
        key: impl Into<LookupKey>,
    ) -> Result<Option<Arc<dyn Persistable>>, TesseraError> {
        let consumer = self.get_consumer(type_name).await?;
        consumer.lookup(type_name, &key.into()).await
    }

    /// Typed variant of [`ConsumerService::get_object`].
    ///
    /// A consumer that answers with an object of another concrete type is an
    /// `Internal` error.
    pub async fn get_typed<T: PersistableType>(
        &self,
        key: impl Into<LookupKey>,
    ) -> Result<Option<Arc<T>>, TesseraError> {
        let Some(object) = self.get_object(T::TYPE_NAME, key).await? else {
            return Ok(None);
        };
        object.into_any().downcast::<T>().map(Some).map_err(|_| {
            TesseraError::Internal(format!(
                "consumer for `{}` returned an object of another type",
                T::TYPE_NAME
            ))
        })
    }

    /// Whether `action` is allowed on `object`.
    ///
    /// Unregistered types, blank type names and consumer errors all deny.
    pub async fn authorize(&self, action: Action, object: &dyn Persistable) -> bool {
        let type_name = object.type_name();
        let cache = self.inner.decision_cache();
        let key = object.object_id().map(|object_id| DecisionKey {
            action,
            type_name: type_name.to_string(),
            object_id,
        });

        if let (Some(cache), Some(key)) = (&cache, &key)
            && let Some(allowed) = cache.get(key)
        {
            return allowed;
        }

        let consumer = match self.get_consumer(type_name).await {
            Ok(consumer) => consumer,
            Err(e) => {
                debug!(type_name, %action, error = %e, "no consumer; permission denied");
                return false;
            }
        };

        let allowed = match consumer.authorize(action, object).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(type_name, %action, error = %e, "authorization failed; permission denied");
                return false;
            }
        };

        if let (Some(cache), Some(key)) = (cache, key) {
            cache.put(key, allowed);
        }
        allowed
    }

    pub async fn can_read(&self, object: &dyn Persistable) -> bool {
        self.authorize(Action::Read, object).await
    }

    pub async fn can_update(&self, object: &dyn Persistable) -> bool {
        self.authorize(Action::Update, object).await
    }

    pub async fn can_delete(&self, object: &dyn Persistable) -> bool {
        self.authorize(Action::Delete, object).await
    }

    pub async fn can_create(&self, object: &dyn Persistable) -> bool {
        self.authorize(Action::Create, object).await
    }
}

#[cfg(test)]
mod tests {
    use tessera_registry::{PluginHost, PluginListener};
    use tessera_test_utils::{MemoryManager, Record, ScriptedConsumer, ToggleFactory};

    use super::*;

    fn service() -> ConsumerService {
        ConsumerService::new(
            ServiceConfig::default(),
            Arc::new(ToggleFactory::unavailable(Arc::new(MemoryManager::new()))),
            Arc::new(PluginHost::new()),
        )
    }

    #[derive(Debug)]
    struct Invoice {
        id: Uuid,
    }

    impl Persistable for Invoice {
        fn type_name(&self) -> &str {
            Self::TYPE_NAME
        }

        fn object_id(&self) -> Option<Uuid> {
            Some(self.id)
        }
    }

    impl PersistableType for Invoice {
        const TYPE_NAME: &'static str = "billing.Invoice";
    }

    #[tokio::test]
    async fn blank_type_name_is_a_lookup_error() {
        let service = service();
        for name in ["", "   "] {
            assert!(matches!(
                service.get_consumer(name).await,
                Err(TesseraError::Lookup { .. })
            ));
        }
    }

    #[tokio::test]
    async fn register_then_remove_round_trip() {
        let service = service();
        let consumer: Arc<dyn Consumer> = Arc::new(ScriptedConsumer::new("t.A"));

        service.attach(consumer.clone()).await.unwrap();
        assert!(Arc::ptr_eq(&service.get_consumer("t.A").await.unwrap(), &consumer));

        service.detach(consumer).await.unwrap();
        assert!(matches!(
            service.get_consumer("t.A").await,
            Err(TesseraError::Lookup { .. })
        ));
    }

    #[tokio::test]
    async fn unregistered_type_denies_everything() {
        let service = service();
        let object = Record::new("t.Unknown", "x");
        assert!(!service.can_read(&object).await);
        assert!(!service.can_update(&object).await);
        assert!(!service.can_delete(&object).await);
        assert!(!service.can_create(&object).await);
    }

    #[tokio::test]
    async fn verdicts_come_from_the_owning_consumer() {
        let service = service();
        service
            .attach(Arc::new(
                ScriptedConsumer::new("t.Doc")
                    .allowing(Action::Read)
                    .allowing(Action::Create),
            ))
            .await
            .unwrap();
        service
            .attach(Arc::new(ScriptedConsumer::new("t.Broken").failing_authorize()))
            .await
            .unwrap();

        let doc = Record::new("t.Doc", "d");
        assert!(service.can_read(&doc).await);
        assert!(service.can_create(&doc).await);
        assert!(!service.can_update(&doc).await);
        assert!(!service.can_delete(&doc).await);

        let broken = Record::new("t.Broken", "b");
        assert!(!service.can_read(&broken).await);
    }

    #[tokio::test]
    async fn lookups_delegate_and_fail_for_unknown_types() {
        let service = service();
        let stored = Record::shared("t.Doc", "d");
        service
            .attach(Arc::new(
                ScriptedConsumer::new("t.Doc").with_object("alpha", stored.clone()),
            ))
            .await
            .unwrap();

        let found = service.get_object("t.Doc", "alpha").await.unwrap().unwrap();
        assert_eq!(found.object_id(), stored.object_id());
        assert!(service.get_object("t.Doc", "beta").await.unwrap().is_none());
        assert!(matches!(
            service.get_object("t.Other", "alpha").await,
            Err(TesseraError::Lookup { .. })
        ));
    }

    #[tokio::test]
    async fn typed_lookup_downcasts() {
        let service = service();
        let id = Uuid::new_v4();
        service
            .attach(Arc::new(
                ScriptedConsumer::new(Invoice::TYPE_NAME)
                    .with_object(id, Arc::new(Invoice { id }))
                    .with_object("wrong", Record::shared(Invoice::TYPE_NAME, "w")),
            ))
            .await
            .unwrap();

        let invoice = service.get_typed::<Invoice>(id).await.unwrap().unwrap();
        assert_eq!(invoice.id, id);
        assert!(matches!(
            service.get_typed::<Invoice>("wrong").await,
            Err(TesseraError::Internal(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_cache_expires_and_invalidates() {
        let cache = TtlDecisionCache::new(Duration::from_secs(300));
        let key = DecisionKey {
            action: Action::Read,
            type_name: "t.Doc".into(),
            object_id: Uuid::new_v4(),
        };

        cache.put(key.clone(), true);
        assert_eq!(cache.get(&key), Some(true));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());

        cache.put(key.clone(), false);
        cache.invalidate_type("t.Doc");
        assert_eq!(cache.get(&key), None);
    }

    #[tokio::test]
    async fn cached_verdict_survives_until_consumer_changes() {
        let cache = Arc::new(TtlDecisionCache::new(Duration::from_secs(300)));
        let service = service().with_decision_cache(cache.clone());
        let first: Arc<dyn Consumer> =
            Arc::new(ScriptedConsumer::new("t.Doc").allowing(Action::Read));
        service.attach(first.clone()).await.unwrap();

        let doc = Record::new("t.Doc", "d");
        let anonymous = Record::anonymous("t.Doc", "a");
        assert!(service.can_read(&doc).await);
        assert!(service.can_read(&anonymous).await);
        assert_eq!(cache.len(), 1);

        // A replacement consumer drops the cached verdicts for its type.
        service
            .attach(Arc::new(ScriptedConsumer::new("t.Doc")))
            .await
            .unwrap();
        assert!(cache.is_empty());
        assert!(!service.can_read(&doc).await);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_verdicts_are_swept_on_insert() {
        let cache = TtlDecisionCache::with_sweep_threshold(Duration::from_secs(60), 4);
        let key = |action| DecisionKey {
            action,
            type_name: "t.Doc".into(),
            object_id: Uuid::new_v4(),
        };

        for action in [Action::Read, Action::Update, Action::Delete, Action::Create] {
            cache.put(key(action), true);
        }
        assert_eq!(cache.len(), 4);

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.put(key(Action::Read), false);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_cache_is_off_unless_configured() {
        assert!(TtlDecisionCache::from_config(&ServiceConfig::default()).is_none());
        let on = ServiceConfig {
            decision_cache_ttl_secs: 300,
            ..ServiceConfig::default()
        };
        assert!(TtlDecisionCache::from_config(&on).is_some());
    }
}
