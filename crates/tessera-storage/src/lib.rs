// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence manager for the Tessera consumer service.
//!
//! Each registered persistable type maps to one table of JSON documents
//! keyed by object id. Statements run through `tokio-rusqlite`, which
//! serializes every call on a connection's background thread.

pub mod database;
pub mod datasources;
pub mod factory;
pub mod manager;

pub use database::Database;
pub use datasources::DataSources;
pub use factory::SqliteManagerFactory;
pub use manager::SqliteManager;
