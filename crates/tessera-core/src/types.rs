// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the registry, the service and the storage backends.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Lifecycle state of a consumer service instance.
///
/// Variants are declared in transition order, so `Ord` doubles as the
/// "forward only" check.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, not yet activated.
    None,
    /// Activation received; waiting for the persistence manager.
    Activated,
    /// Manager constructed and plugin discovery opened.
    Started,
    /// Deactivated. Terminal for this instance.
    Closed,
}

/// An authorization action delegated to a consumer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Update,
    Delete,
    Create,
}

/// Kind of a reference edge between two persistable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// The target is owned by the source and dies with it.
    Child,
    /// The target owns the source.
    Parent,
    /// Any other association.
    Link,
}

/// Identifier used to look an object up through its consumer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Uuid(Uuid),
    Name(String),
}

impl From<Uuid> for LookupKey {
    fn from(id: Uuid) -> Self {
        LookupKey::Uuid(id)
    }
}

impl From<&str> for LookupKey {
    fn from(name: &str) -> Self {
        LookupKey::Name(name.to_string())
    }
}

impl From<String> for LookupKey {
    fn from(name: String) -> Self {
        LookupKey::Name(name)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Uuid(id) => write!(f, "{id}"),
            LookupKey::Name(name) => write!(f, "{name}"),
        }
    }
}

/// How the persistence manager hands out connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum PoolKind {
    /// One shared connection for every operation.
    Shared,
    /// A fresh connection per operation.
    Pseudo,
}

/// Opaque handle describing a ready connection pool.
///
/// A manager returns `Some(PoolHandle)` from `connection_pool()` once it can
/// serve requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHandle {
    /// Name of the datasource the pool is bound to.
    pub data_source: String,
    /// Pooling mode.
    pub kind: PoolKind,
}

/// The set of persistable types the manager should know about.
///
/// Built from a registry snapshot each time the registry changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Registered type names, in registry order.
    pub types: Vec<String>,
}

impl Schema {
    pub fn new(types: Vec<String>) -> Self {
        Self { types }
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }
}
