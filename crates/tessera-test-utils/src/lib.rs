// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tessera integration tests.
//!
//! Provides in-memory collaborators for fast, deterministic tests without a
//! real datasource.
//!
//! # Components
//!
//! - [`MemoryManager`] - persistence manager that records reconnects and deletes
//! - [`ToggleFactory`] - manager factory whose datasource can be switched on later
//! - [`ScriptedConsumer`] - consumer plugin with a fixed reference graph and policy
//! - [`Record`] - a minimal persistable object

pub mod mock_consumer;
pub mod mock_manager;
pub mod record;

pub use mock_consumer::ScriptedConsumer;
pub use mock_manager::{MemoryManager, ToggleFactory};
pub use record::Record;
