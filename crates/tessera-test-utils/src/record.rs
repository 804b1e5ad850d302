// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal persistable object for tests.

use std::sync::Arc;

use tessera_core::Persistable;
use uuid::Uuid;

/// A persistable object whose type name is chosen at runtime.
#[derive(Debug, Clone)]
pub struct Record {
    type_name: String,
    id: Option<Uuid>,
    pub label: String,
}

impl Record {
    /// A record with a fresh random id.
    pub fn new(type_name: &str, label: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            id: Some(Uuid::new_v4()),
            label: label.to_string(),
        }
    }

    /// A record without a stable identifier.
    pub fn anonymous(type_name: &str, label: &str) -> Self {
        Self {
            id: None,
            ..Self::new(type_name, label)
        }
    }

    /// Shorthand for `Arc::new(Record::new(..))` as a trait object.
    pub fn shared(type_name: &str, label: &str) -> Arc<dyn Persistable> {
        Arc::new(Self::new(type_name, label))
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }
}

impl Persistable for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn object_id(&self) -> Option<Uuid> {
        self.id
    }
}
