// SPDX-FileCopyrightText: 2026 Tessera Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the consumer service: discovery, concurrency,
//! cascade termination and logging.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tessera_config::ServiceConfig;
use tessera_core::{Consumer, LifecycleState, Persistable};
use tessera_registry::{PluginHost, PluginListener};
use tessera_service::ConsumerService;
use tessera_test_utils::{MemoryManager, Record, ScriptedConsumer, ToggleFactory};
use tracing_test::traced_test;

fn service_on(host: Arc<PluginHost>, manager: Arc<MemoryManager>) -> ConsumerService {
    ConsumerService::new(
        ServiceConfig::default(),
        Arc::new(ToggleFactory::available(manager)),
        host,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_attach_detach_leaves_expected_membership() {
    const N: usize = 32;
    let manager = Arc::new(MemoryManager::ready());
    let service = service_on(Arc::new(PluginHost::new()), manager.clone());
    service.activate().unwrap();
    service.wait_for_state(LifecycleState::Started).await;

    // Even-numbered types are attached and then detached again; odd ones stay.
    let tasks = (0..N).map(|i| {
        let service = service.clone();
        tokio::spawn(async move {
            let consumer: Arc<dyn Consumer> = Arc::new(ScriptedConsumer::new(&format!("t.T{i:02}")));
            service.attach(consumer.clone()).await.unwrap();
            if i % 2 == 0 {
                service.detach(consumer).await.unwrap();
            }
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let expected: Vec<String> = (0..N)
        .filter(|i| i % 2 == 1)
        .map(|i| format!("t.T{i:02}"))
        .collect();
    assert_eq!(service.consumers().await.type_names(), expected);
    // The last reconnect saw the final membership.
    assert_eq!(manager.last_schema().await.unwrap().types, expected);

    service.deactivate().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_keep_exactly_one() {
    let service = service_on(
        Arc::new(PluginHost::new()),
        Arc::new(MemoryManager::ready()),
    );
    let consumers: Vec<Arc<ScriptedConsumer>> = (0..16)
        .map(|_| {
            Arc::new(ScriptedConsumer::new("t.Same").with_initialize_delay(Duration::from_millis(1)))
        })
        .collect();

    let tasks = consumers.iter().cloned().map(|consumer| {
        let service = service.clone();
        tokio::spawn(async move { service.attach(consumer).await })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let snapshot = service.consumers().await;
    assert_eq!(snapshot.len(), 1);
    // Every displaced consumer was destroyed, the survivor was not.
    let destroyed: usize = consumers.iter().map(|c| c.destroy_calls()).sum();
    assert_eq!(destroyed, consumers.len() - 1);
}

#[tokio::test]
async fn host_lifecycle_end_to_end() {
    let host = Arc::new(PluginHost::new());
    let manager = Arc::new(MemoryManager::ready());
    let service = service_on(host.clone(), manager.clone());

    let orders = Arc::new(ScriptedConsumer::new("shop.Order"));
    host.publish(orders.clone());
    service.activate().unwrap();
    service.wait_for_state(LifecycleState::Started).await;
    assert!(orders.wait_post_initialized(Duration::from_secs(5)).await);

    let lines: Arc<dyn Consumer> = Arc::new(ScriptedConsumer::new("shop.Line"));
    host.publish(lines.clone());
    host.modify(&lines);
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.get_consumer("shop.Line").await.is_err() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    host.withdraw(&lines);
    tokio::time::timeout(Duration::from_secs(5), async {
        while service.get_consumer("shop.Line").await.is_ok() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    service.deactivate().await;
    assert_eq!(orders.destroy_calls(), 1);
    assert!(manager.last_schema().await.is_some());
}

#[tokio::test]
#[traced_test]
async fn failures_are_logged_not_raised() {
    let manager = Arc::new(MemoryManager::ready());
    let service = service_on(Arc::new(PluginHost::new()), manager.clone());
    service.activate().unwrap();
    service.wait_for_state(LifecycleState::Started).await;

    service
        .attach(Arc::new(ScriptedConsumer::new("t.Broken").failing_references()))
        .await
        .unwrap();
    manager.set_fail_reconnect(true);
    service
        .attach(Arc::new(ScriptedConsumer::new("t.Other")))
        .await
        .unwrap();

    let root = Record::new("t.Other", "root");
    let report = service.cascade_delete(&root).await.unwrap();
    assert_eq!(report.deleted, 0);

    assert!(logs_contain("reference collection failed"));
    assert!(logs_contain("persistence manager reconnect failed"));
    service.deactivate().await;
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn waiting_for_datasource_is_logged() {
    let factory = Arc::new(ToggleFactory::unavailable(Arc::new(MemoryManager::ready())));
    let service = ConsumerService::new(
        ServiceConfig::default(),
        factory,
        Arc::new(PluginHost::new()),
    );
    service.activate().unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(logs_contain("waiting for datasource"));
    service.deactivate().await;
}

/// A random CHILD graph over `n` identifiable nodes, as an edge list.
fn graph() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n), 0..40)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn cascade_terminates_and_deletes_each_reachable_node_once((n, edges) in graph()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async move {
            let nodes: Vec<Record> = (0..n).map(|i| Record::new("t.Node", &format!("n{i}"))).collect();
            let mut consumer = ScriptedConsumer::new("t.Node");
            for &(from, to) in &edges {
                let target: Arc<dyn Persistable> = Arc::new(nodes[to].clone());
                consumer = consumer.with_child(&nodes[from], target);
            }

            let manager = Arc::new(MemoryManager::ready());
            let service = service_on(Arc::new(PluginHost::new()), manager.clone());
            service.activate().unwrap();
            service.wait_for_state(LifecycleState::Started).await;
            service.attach(Arc::new(consumer)).await.unwrap();

            let report = service.cascade_delete(&nodes[0]).await.unwrap();

            // Nodes reachable from the root, excluding the root itself.
            let mut reachable = HashSet::new();
            let mut frontier = vec![0usize];
            while let Some(node) = frontier.pop() {
                for &(from, to) in &edges {
                    if from == node && to != 0 && reachable.insert(to) {
                        frontier.push(to);
                    }
                }
            }

            let deleted = manager.deleted_ids().await;
            let unique: HashSet<_> = deleted.iter().copied().collect();
            assert_eq!(unique.len(), deleted.len(), "a node was deleted twice");
            assert_eq!(report.deleted, reachable.len());
            assert!(!unique.contains(&nodes[0].id().unwrap()), "root was deleted");
            for index in &reachable {
                assert!(unique.contains(&nodes[*index].id().unwrap()));
            }

            service.deactivate().await;
        });
    }
}
