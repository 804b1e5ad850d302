// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tessera consumer service.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Tessera workspace. Consumer plugins and
//! persistence backends implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TesseraError;
pub use types::{Action, LifecycleState, LookupKey, PoolHandle, PoolKind, RelationKind, Schema};

pub use traits::{
    AsAny, Consumer, ManagerFactory, Persistable, PersistableType, PersistenceManager, Reference,
    ReferenceCollector,
};
