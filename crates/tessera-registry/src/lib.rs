// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Consumer registry and plugin discovery.
//!
//! The registry maps persistable type names to the consumer that owns them
//! and runs a hook (the manager reconnect) after every change. Discovery
//! turns platform attach/update/detach events into calls on a listener.

pub mod discovery;
pub mod registry;

pub use discovery::{DiscoveryEvent, DiscoveryTracker, PluginHost, PluginListener, PluginSource};
pub use registry::{
    ConsumerRegistry, Insertion, NoopHook, OnConflict, RegisteredConsumer, RegistrationId,
    RegistryHook, RegistrySnapshot,
};
