// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tessera consumer service.

use thiserror::Error;

use crate::types::LifecycleState;

/// The primary error type used across all Tessera traits and core operations.
///
/// Permission checks never produce an error: a denied check is a plain `false`.
#[derive(Debug, Error)]
pub enum TesseraError {
    /// Configuration errors (invalid TOML, unknown keys, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// No consumer is registered for the type, or the type name is empty.
    #[error("consumer lookup failed for `{type_name}`: {reason}")]
    Lookup { type_name: String, reason: String },

    /// Another consumer already owns the type and the registry rejects duplicates.
    #[error("a consumer for `{type_name}` is already registered")]
    DuplicateConsumer { type_name: String },

    /// A consumer plugin reported a failure.
    #[error("consumer `{type_name}` failed: {message}")]
    Consumer { type_name: String, message: String },

    /// The persistence manager could not re-bind its schema.
    #[error("reconnect failed: {source}")]
    Reconnect {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Storage backend errors (connection failure, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The named datasource is not (yet) available.
    #[error("datasource `{name}` is not available")]
    DataSourceUnavailable { name: String },

    /// The persistence manager has not been constructed yet.
    #[error("persistence manager is not available")]
    ManagerUnavailable,

    /// A lifecycle operation was requested from the wrong state.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TesseraError {
    /// Shorthand for a lookup failure.
    pub fn lookup(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        TesseraError::Lookup {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a consumer failure.
    pub fn consumer(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        TesseraError::Consumer {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}
