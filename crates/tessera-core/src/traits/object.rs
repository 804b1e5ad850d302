// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistable object traits.

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use uuid::Uuid;

/// Upcast helper so trait objects can be downcast to their concrete type.
///
/// Blanket-implemented for every `Any + Send + Sync` type; implementors of
/// [`Persistable`] never write it by hand.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// An object the persistence manager can store and delete.
pub trait Persistable: AsAny + Debug {
    /// Canonical name of the object's runtime type.
    ///
    /// Consumers are registered under this name.
    fn type_name(&self) -> &str;

    /// Stable identifier, if the object has one.
    ///
    /// Objects without an identifier cannot take part in cycle detection
    /// during cascading deletes.
    fn object_id(&self) -> Option<Uuid>;
}

/// A persistable type with a compile-time type name, used for typed lookups.
pub trait PersistableType: Persistable + Sized {
    const TYPE_NAME: &'static str;
}
