// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tessera serve` command implementation.
//!
//! Wires the configured datasources into a SQLite manager factory, opens an
//! in-process plugin host and runs the consumer service until shutdown.

use std::sync::Arc;

use tessera_config::TesseraConfig;
use tessera_core::TesseraError;
use tessera_registry::PluginHost;
use tessera_service::{ConsumerService, TtlDecisionCache};
use tessera_storage::{DataSources, SqliteManagerFactory};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Build a service for `config` that discovers consumers on `host`.
pub fn build_service(
    config: &TesseraConfig,
    sources: DataSources,
    host: Arc<PluginHost>,
) -> ConsumerService {
    let factory = Arc::new(SqliteManagerFactory::from_config(&config.service, sources));
    let service = ConsumerService::new(config.service.clone(), factory, host);
    match TtlDecisionCache::from_config(&config.service) {
        Some(cache) => service.with_decision_cache(Arc::new(cache)),
        None => service,
    }
}

/// Runs the `tessera serve` command until `shutdown` is cancelled.
pub async fn run_serve(
    config: TesseraConfig,
    shutdown: CancellationToken,
) -> Result<(), TesseraError> {
    init_tracing(&config.log.level);

    let sources = DataSources::from_config(&config);
    if sources.resolve(&config.service.data_source_name).is_none() {
        info!(
            data_source = %config.service.data_source_name,
            "datasource not configured yet; the service will wait for it"
        );
    }

    let host = Arc::new(PluginHost::new());
    let service = build_service(&config, sources, host);
    service.activate()?;
    info!(
        service = %config.service.service_name,
        enabled = config.service.enabled,
        "tessera serve running"
    );

    shutdown.cancelled().await;
    service.deactivate().await;
    Ok(())
}

/// Initialize the tracing subscriber with an env-filter.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tessera={log_level},warn")));

    // A second call (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
