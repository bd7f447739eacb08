//! Monitoring session behavior end to end: failure thresholds, recovery,
//! and session cleanup through the public service API

use std::sync::Arc;
use std::time::Duration;

use argus::monitor::{MonitorService, MonitoringRuntime};

use crate::{node_keys, test_node, FakeConnector};

fn service_over(connector: Arc<FakeConnector>) -> MonitorService {
    crate::init_tracing();
    MonitorService::new(MonitoringRuntime::new(
        connector,
        Duration::from_millis(60_000),
    ))
}

#[tokio::test]
async fn test_node_judged_unhealthy_after_consecutive_failures() {
    let connector = FakeConnector::new(false);
    let service = service_over(connector.clone());

    let ctx = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &test_node("db-1", 3306),
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(ctx.is_unhealthy());
    assert!(ctx.failure_count() >= 3);

    service.stop_monitoring(&ctx);
    assert!(!ctx.is_active());
}

#[tokio::test]
async fn test_node_recovers_after_valid_probe() {
    let connector = FakeConnector::new(false);
    let service = service_over(connector.clone());

    let ctx = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &test_node("db-1", 3306),
            Duration::from_millis(1),
            Duration::from_millis(20),
            3,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(ctx.is_unhealthy());

    connector.set_alive(true);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!ctx.is_unhealthy());
    assert_eq!(ctx.failure_count(), 0);

    service.stop_monitoring(&ctx);
}

#[tokio::test]
async fn test_grace_period_suppresses_early_failures() {
    let connector = FakeConnector::new(false);
    let service = service_over(connector.clone());

    // Detection time far longer than the test; the dead node must never be
    // flagged
    let ctx = service
        .start_monitoring(
            node_keys(&["db-1:3306"]),
            &test_node("db-1", 3306),
            Duration::from_secs(3600),
            Duration::from_millis(20),
            1,
        )
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!ctx.is_unhealthy());
    assert_eq!(ctx.failure_count(), 0);

    service.stop_monitoring(&ctx);
}

#[tokio::test]
async fn test_empty_key_set_is_rejected() {
    let service = service_over(FakeConnector::new(true));
    let result = service.start_monitoring(
        node_keys(&[]),
        &test_node("db-1", 3306),
        Duration::from_millis(1),
        Duration::from_millis(20),
        3,
    );
    assert!(result.is_err());
}
