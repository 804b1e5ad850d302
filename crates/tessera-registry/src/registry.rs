// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer registry keyed by persistable type name.
//!
//! The `ConsumerRegistry` owns the only copy of the type → consumer map.
//! All access goes through its methods, which take a single async mutex;
//! every mutation invokes a [`RegistryHook`] before the lock is released, so
//! the hook always sees the map exactly as the mutation left it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tessera_core::{Consumer, Schema};
use tokio::sync::Mutex;

/// Identifies one registration of a consumer within a registry.
///
/// A consumer that is detached and attached again gets a new id.
pub type RegistrationId = u64;

/// A consumer together with the id of its registration.
#[derive(Clone)]
pub struct RegisteredConsumer {
    pub id: RegistrationId,
    pub consumer: Arc<dyn Consumer>,
}

impl RegisteredConsumer {
    pub fn type_name(&self) -> &str {
        self.consumer.type_name()
    }

    /// True if this entry holds exactly `consumer` (same instance).
    pub fn holds(&self, consumer: &Arc<dyn Consumer>) -> bool {
        Arc::ptr_eq(&self.consumer, consumer)
    }
}

impl std::fmt::Debug for RegisteredConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredConsumer")
            .field("id", &self.id)
            .field("type_name", &self.consumer.type_name())
            .field("version", &self.consumer.version().to_string())
            .finish()
    }
}

/// Point-in-time copy of the registry, in type-name order.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: Vec<RegisteredConsumer>,
}

impl RegistrySnapshot {
    /// Schema handed to the persistence manager on reconnect.
    pub fn schema(&self) -> Schema {
        Schema::new(self.type_names())
    }

    pub fn type_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.type_name().to_string())
            .collect()
    }

    /// Every registered consumer once, even if an instance is registered
    /// under several names.
    pub fn distinct_consumers(&self) -> Vec<Arc<dyn Consumer>> {
        let mut distinct: Vec<Arc<dyn Consumer>> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !distinct.iter().any(|c| Arc::ptr_eq(c, &entry.consumer)) {
                distinct.push(entry.consumer.clone());
            }
        }
        distinct
    }

    pub fn entries(&self) -> &[RegisteredConsumer] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Side effect run after every registry mutation, with the lock still held.
#[async_trait]
pub trait RegistryHook: Send + Sync {
    async fn registry_changed(&self, snapshot: &RegistrySnapshot);
}

/// Hook that does nothing. Useful before a manager exists and in tests.
pub struct NoopHook;

#[async_trait]
impl RegistryHook for NoopHook {
    async fn registry_changed(&self, _snapshot: &RegistrySnapshot) {}
}

/// What to do when the type name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnConflict {
    /// Replace the registered consumer.
    Replace,
    /// Leave the registered consumer in place.
    Keep,
}

/// Outcome of [`ConsumerRegistry::insert`].
#[derive(Debug)]
pub enum Insertion {
    /// The type name was free.
    Inserted(RegisteredConsumer),
    /// The type name was taken; `previous` has been displaced.
    Replaced {
        entry: RegisteredConsumer,
        previous: RegisteredConsumer,
    },
    /// The type name was taken and the existing entry was kept.
    Rejected { existing: RegisteredConsumer },
}

/// Concurrency-safe mapping from type name to consumer.
pub struct ConsumerRegistry {
    entries: Mutex<BTreeMap<String, RegisteredConsumer>>,
    next_id: AtomicU64,
}

impl ConsumerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `consumer` under its type name, then run `hook`.
    ///
    /// The hook is not run when the insertion is rejected.
    pub async fn insert(
        &self,
        consumer: Arc<dyn Consumer>,
        on_conflict: OnConflict,
        hook: &dyn RegistryHook,
    ) -> Insertion {
        let mut entries = self.entries.lock().await;
        let type_name = consumer.type_name().to_string();

        if on_conflict == OnConflict::Keep
            && let Some(existing) = entries.get(&type_name)
        {
            return Insertion::Rejected {
                existing: existing.clone(),
            };
        }

        let entry = RegisteredConsumer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            consumer,
        };
        let previous = entries.insert(type_name, entry.clone());
        hook.registry_changed(&snapshot_of(&entries)).await;

        match previous {
            Some(previous) => Insertion::Replaced { entry, previous },
            None => Insertion::Inserted(entry),
        }
    }

    /// Remove `consumer` if it is the instance registered for its type, then run `hook`.
    ///
    /// Returns `None` (and skips the hook) when another instance, or nothing,
    /// is registered under that name.
    pub async fn remove(
        &self,
        consumer: &Arc<dyn Consumer>,
        hook: &dyn RegistryHook,
    ) -> Option<RegisteredConsumer> {
        let mut entries = self.entries.lock().await;
        let type_name = consumer.type_name();

        if !entries.get(type_name).is_some_and(|e| e.holds(consumer)) {
            return None;
        }
        let removed = entries.remove(type_name);
        hook.registry_changed(&snapshot_of(&entries)).await;
        removed
    }

    /// Run `hook` against the current content without changing it.
    pub async fn touch(&self, hook: &dyn RegistryHook) {
        let entries = self.entries.lock().await;
        hook.registry_changed(&snapshot_of(&entries)).await;
    }

    /// Remove every entry. The hook is not run.
    pub async fn clear(&self) -> Vec<RegisteredConsumer> {
        let mut entries = self.entries.lock().await;
        std::mem::take(&mut *entries).into_values().collect()
    }

    /// Get the entry registered for `type_name`.
    pub async fn get(&self, type_name: &str) -> Option<RegisteredConsumer> {
        self.entries.lock().await.get(type_name).cloned()
    }

    /// True while the registration `id` is still current.
    pub async fn is_registered(&self, id: RegistrationId) -> bool {
        self.entries.lock().await.values().any(|e| e.id == id)
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        snapshot_of(&*self.entries.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot_of(entries: &BTreeMap<String, RegisteredConsumer>) -> RegistrySnapshot {
    RegistrySnapshot {
        entries: entries.values().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_test_utils::ScriptedConsumer;

    /// Records the type names seen by every hook invocation.
    #[derive(Default)]
    struct RecordingHook {
        seen: std::sync::Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl RegistryHook for RecordingHook {
        async fn registry_changed(&self, snapshot: &RegistrySnapshot) {
            self.seen.lock().unwrap().push(snapshot.type_names());
        }
    }

    fn consumer(type_name: &str) -> Arc<dyn Consumer> {
        Arc::new(ScriptedConsumer::new(type_name))
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let registry = ConsumerRegistry::new();
        let c = consumer("shop.Order");
        let outcome = registry.insert(c.clone(), OnConflict::Replace, &NoopHook).await;

        assert!(matches!(outcome, Insertion::Inserted(_)));
        let entry = registry.get("shop.Order").await.unwrap();
        assert!(entry.holds(&c));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn hook_sees_state_after_each_mutation() {
        let registry = ConsumerRegistry::new();
        let hook = RecordingHook::default();
        let order = consumer("shop.Order");

        registry.insert(order.clone(), OnConflict::Replace, &hook).await;
        registry.insert(consumer("shop.Cart"), OnConflict::Replace, &hook).await;
        registry.touch(&hook).await;
        registry.remove(&order, &hook).await;

        let seen = hook.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                vec!["shop.Order".to_string()],
                vec!["shop.Cart".to_string(), "shop.Order".to_string()],
                vec!["shop.Cart".to_string(), "shop.Order".to_string()],
                vec!["shop.Cart".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn replace_returns_previous_entry() {
        let registry = ConsumerRegistry::new();
        let first = consumer("shop.Order");
        let second = consumer("shop.Order");

        registry.insert(first.clone(), OnConflict::Replace, &NoopHook).await;
        match registry.insert(second.clone(), OnConflict::Replace, &NoopHook).await {
            Insertion::Replaced { entry, previous } => {
                assert!(entry.holds(&second));
                assert!(previous.holds(&first));
                assert_ne!(entry.id, previous.id);
            }
            other => panic!("expected replacement, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn keep_rejects_without_running_hook() {
        let registry = ConsumerRegistry::new();
        let hook = RecordingHook::default();
        let first = consumer("shop.Order");

        registry.insert(first.clone(), OnConflict::Keep, &hook).await;
        let outcome = registry.insert(consumer("shop.Order"), OnConflict::Keep, &hook).await;

        match outcome {
            Insertion::Rejected { existing } => assert!(existing.holds(&first)),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(hook.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_ignores_stale_instance() {
        let registry = ConsumerRegistry::new();
        let current = consumer("shop.Order");
        let stale = consumer("shop.Order");
        registry.insert(current.clone(), OnConflict::Replace, &NoopHook).await;

        assert!(registry.remove(&stale, &NoopHook).await.is_none());
        assert!(registry.get("shop.Order").await.is_some());
        assert!(registry.remove(&current, &NoopHook).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn registration_ids_track_current_entries() {
        let registry = ConsumerRegistry::new();
        let c = consumer("shop.Order");
        let id = match registry.insert(c.clone(), OnConflict::Replace, &NoopHook).await {
            Insertion::Inserted(entry) => entry.id,
            other => panic!("unexpected {other:?}"),
        };

        assert!(registry.is_registered(id).await);
        registry.remove(&c, &NoopHook).await;
        assert!(!registry.is_registered(id).await);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_and_distinct() {
        let registry = ConsumerRegistry::new();
        registry.insert(consumer("b.Two"), OnConflict::Replace, &NoopHook).await;
        registry.insert(consumer("a.One"), OnConflict::Replace, &NoopHook).await;

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.type_names(), vec!["a.One", "b.Two"]);
        assert_eq!(snapshot.distinct_consumers().len(), 2);
        assert!(snapshot.schema().contains("b.Two"));
    }

    #[tokio::test]
    async fn clear_empties_the_registry() {
        let registry = ConsumerRegistry::new();
        registry.insert(consumer("a.One"), OnConflict::Replace, &NoopHook).await;
        registry.insert(consumer("b.Two"), OnConflict::Replace, &NoopHook).await;

        let cleared = registry.clear().await;
        assert_eq!(cleared.len(), 2);
        assert!(registry.is_empty().await);
    }
}
