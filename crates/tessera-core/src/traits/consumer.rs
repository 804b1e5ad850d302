// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer plugin trait and reference collection.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TesseraError;
use crate::traits::manager::PersistenceManager;
use crate::traits::object::Persistable;
use crate::types::{Action, LookupKey, RelationKind};

/// A directed edge from an object to a related object.
#[derive(Debug, Clone)]
pub struct Reference {
    /// The related object.
    pub target: Arc<dyn Persistable>,
    /// What the relation means. Only [`RelationKind::Child`] is followed by
    /// cascading deletes.
    pub kind: RelationKind,
}

impl Reference {
    pub fn new(target: Arc<dyn Persistable>, kind: RelationKind) -> Self {
        Self { target, kind }
    }

    pub fn child(target: Arc<dyn Persistable>) -> Self {
        Self::new(target, RelationKind::Child)
    }

    pub fn is_child(&self) -> bool {
        self.kind == RelationKind::Child
    }
}

/// Accumulator filled by consumers with the references they know about.
pub trait ReferenceCollector: Send {
    fn found_reference(&mut self, reference: Reference);
}

/// The simplest collector: keeps every reference in arrival order.
impl ReferenceCollector for Vec<Reference> {
    fn found_reference(&mut self, reference: Reference) {
        self.push(reference);
    }
}

/// A pluggable extension owning access policy and lookup for one persistable type.
///
/// The service calls `initialize` when the plugin is attached,
/// `post_initialize` once the manager's connection pool is ready and
/// `destroy` when the plugin is detached.
#[async_trait]
pub trait Consumer: Send + Sync + 'static {
    /// Canonical type name of the persistable type this consumer owns.
    fn type_name(&self) -> &str;

    /// Semantic version of the consumer implementation.
    fn version(&self) -> semver::Version;

    /// First initialization phase.
    ///
    /// `manager` is `None` while the datasource has not been bound yet.
    async fn initialize(
        &self,
        manager: Option<Arc<dyn PersistenceManager>>,
    ) -> Result<(), TesseraError>;

    /// Second initialization phase, run once the connection pool is ready.
    async fn post_initialize(
        &self,
        manager: Arc<dyn PersistenceManager>,
    ) -> Result<(), TesseraError>;

    /// Releases whatever the consumer holds. Called on detach.
    async fn destroy(&self);

    /// Decides whether `action` is allowed on `object`.
    async fn authorize(
        &self,
        action: Action,
        object: &dyn Persistable,
    ) -> Result<bool, TesseraError>;

    /// Looks up an object of `type_name` by key.
    async fn lookup(
        &self,
        type_name: &str,
        key: &LookupKey,
    ) -> Result<Option<Arc<dyn Persistable>>, TesseraError>;

    /// Reports the references this consumer knows for `object`.
    ///
    /// Consumers are asked about every object, including types they do not
    /// own; report nothing for objects you know nothing about.
    async fn collect_references(
        &self,
        object: &dyn Persistable,
        collector: &mut dyn ReferenceCollector,
    ) -> Result<(), TesseraError>;
}
