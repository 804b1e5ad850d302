// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for the Tessera consumer architecture.
//!
//! Consumers, the persistence manager and the manager factory are all used
//! as trait objects; async methods go through `#[async_trait]`.

pub mod consumer;
pub mod manager;
pub mod object;

pub use consumer::{Consumer, Reference, ReferenceCollector};
pub use manager::{ManagerFactory, PersistenceManager};
pub use object::{AsAny, Persistable, PersistableType};
