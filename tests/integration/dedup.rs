//! Monitor deduplication: overlapping node key sets share one probe loop

use std::time::Duration;

use argus::monitor::{MonitorService, MonitoringRuntime};

use crate::{node_keys, test_node, FakeConnector};

#[tokio::test]
async fn test_aliased_sessions_share_one_probe_loop() {
    let connector = FakeConnector::new(true);
    let runtime = MonitoringRuntime::new(connector.clone(), Duration::from_millis(60_000));
    let service = MonitorService::new(runtime.clone());
    let node = test_node("db-1", 3306);

    // Two callers reach the same node under different alias sets that share
    // "db-1:3306"
    let a = service
        .start_monitoring(
            node_keys(&["db-1:3306", "primary.cluster:3306"]),
            &node,
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();
    let b = service
        .start_monitoring(
            node_keys(&["db-1:3306", "10.0.0.5:3306"]),
            &node,
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();

    assert_eq!(runtime.monitor_count(), 1);

    // One loop means one probe connection even with two sessions
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(connector.connect_count(), 1);

    // The merged alias set routes either alias to the shared monitor
    let c = service
        .start_monitoring(
            node_keys(&["10.0.0.5:3306"]),
            &node,
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();
    assert_eq!(runtime.monitor_count(), 1);

    for ctx in [&a, &b, &c] {
        service.stop_monitoring(ctx);
    }
}

#[tokio::test]
async fn test_disjoint_nodes_probe_independently() {
    let connector = FakeConnector::new(true);
    let runtime = MonitoringRuntime::new(connector.clone(), Duration::from_millis(60_000));
    let service = MonitorService::new(runtime.clone());

    let a = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &test_node("db-1", 3306),
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();
    let b = service
        .start_monitoring(
            node_keys(&["db-2:3306"]),
            &test_node("db-2", 3306),
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();

    assert_eq!(runtime.monitor_count(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(connector.connect_count(), 2);

    service.stop_monitoring(&a);
    service.stop_monitoring(&b);
}

#[tokio::test]
async fn test_unhealthy_verdict_reaches_every_shared_session() {
    let connector = FakeConnector::new(false);
    let runtime = MonitoringRuntime::new(connector.clone(), Duration::from_millis(60_000));
    let service = MonitorService::new(runtime);
    let node = test_node("db-1", 3306);

    let a = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &node,
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();
    let b = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &node,
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(a.is_unhealthy());
    assert!(b.is_unhealthy());

    service.stop_monitoring(&a);
    service.stop_monitoring(&b);
}

#[tokio::test]
async fn test_last_service_release_tears_down_monitors() {
    let connector = FakeConnector::new(true);
    let runtime = MonitoringRuntime::new(connector, Duration::from_millis(60_000));
    let s1 = MonitorService::new(runtime.clone());
    let s2 = MonitorService::new(runtime.clone());

    let _ctx = s1
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &test_node("db-1", 3306),
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();
    assert_eq!(runtime.monitor_count(), 1);

    drop(s1);
    assert_eq!(runtime.monitor_count(), 1); // s2 still holds the runtime

    drop(s2);
    assert_eq!(runtime.monitor_count(), 0);
}
