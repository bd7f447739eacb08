//! Watchdog abort behavior through the full plugin chain

use std::time::Duration;
use std::time::Instant;

use argus::plugin::{
    ExecuteError, NodeMonitoringPluginFactory, PluginFactory, PluginManager,
};

use crate::{fake_services, fake_services_with_disposal, fast_watchdog, FakeConnector};

fn watchdog_factories() -> Vec<Box<dyn PluginFactory>> {
    vec![Box::new(NodeMonitoringPluginFactory)]
}

fn watchdog_ids() -> Vec<String> {
    vec!["node_monitoring".to_string()]
}

#[tokio::test]
async fn test_hung_operation_fails_fast_when_node_dies() {
    let connector = FakeConnector::new(true);
    let (services, _runtime) = fake_services(fast_watchdog(20, 3), connector.clone());
    let manager = PluginManager::init(&services, &watchdog_ids(), &watchdog_factories()).unwrap();

    connector.set_alive(false);

    // Simulates a statement stuck on a dead TCP peer for a minute
    let started = Instant::now();
    let result: Result<(), _> = manager
        .execute("conn", "executeQuery", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

    match result {
        Err(ExecuteError::NodeUnresponsive { addr }) => assert_eq!(addr, "localhost:3306"),
        Err(other) => panic!("expected NodeUnresponsive, got {other:?}"),
        Ok(()) => panic!("hung operation should have been aborted"),
    }
    // Thresholds trip within ~60ms; the 1s verdict poll dominates
    assert!(started.elapsed() < Duration::from_secs(3));

    manager.release_resources().await;
}

#[tokio::test]
async fn test_operation_on_healthy_node_is_untouched() {
    let connector = FakeConnector::new(true);
    let (services, _runtime) = fake_services(fast_watchdog(20, 3), connector);
    let manager = PluginManager::init(&services, &watchdog_ids(), &watchdog_factories()).unwrap();

    let value: String = manager
        .execute("conn", "executeQuery", || async { Ok("row".to_string()) })
        .await
        .unwrap();
    assert_eq!(value, "row");

    manager.release_resources().await;
}

#[tokio::test]
async fn test_cancelled_caller_does_not_pin_the_monitor() {
    let connector = FakeConnector::new(true);
    let (services, runtime) = fake_services_with_disposal(
        fast_watchdog(20, 3),
        connector,
        Duration::from_millis(100),
    );
    let manager = PluginManager::init(&services, &watchdog_ids(), &watchdog_factories()).unwrap();

    // Control: a completed call leaves an idle monitor that disposes itself
    let _: u32 = manager
        .execute("conn", "executeQuery", || async { Ok(1u32) })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(runtime.monitor_count(), 0);

    // The caller wraps the guarded call in its own timeout and drops it
    let timed_out = tokio::time::timeout(
        Duration::from_millis(50),
        manager.execute("conn", "executeQuery", || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(0u32)
        }),
    )
    .await;
    assert!(timed_out.is_err());

    // The dropped call released its session and worker, so this monitor
    // disposes on schedule too
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(runtime.monitor_count(), 0);

    manager.release_resources().await;
}

#[tokio::test]
async fn test_disabled_monitoring_never_probes() {
    let connector = FakeConnector::new(true);
    let mut config = fast_watchdog(20, 3);
    config.enabled = false;
    let (services, runtime) = fake_services(config, connector.clone());
    let manager = PluginManager::init(&services, &watchdog_ids(), &watchdog_factories()).unwrap();

    for _ in 0..5 {
        let _: u32 = manager
            .execute("conn", "executeQuery", || async { Ok(1u32) })
            .await
            .unwrap();
    }

    assert_eq!(connector.connect_count(), 0);
    assert_eq!(runtime.monitor_count(), 0);

    manager.release_resources().await;
}

#[tokio::test]
async fn test_disabling_applies_to_subsequent_calls() {
    let connector = FakeConnector::new(true);
    let (services, runtime) = fake_services(fast_watchdog(20, 3), connector.clone());
    let watchdog_config = services.watchdog_config.clone();
    let manager = PluginManager::init(&services, &watchdog_ids(), &watchdog_factories()).unwrap();

    let _: u32 = manager
        .execute("conn", "executeQuery", || async { Ok(1u32) })
        .await
        .unwrap();
    assert_eq!(runtime.monitor_count(), 1);

    // Let any in-flight probe settle before snapshotting the count
    tokio::time::sleep(Duration::from_millis(100)).await;
    let probes_before = connector.connect_count();

    // Flip the shared config off; no restart needed
    watchdog_config.write().enabled = false;
    let _: u32 = manager
        .execute("conn", "executeQuery", || async { Ok(2u32) })
        .await
        .unwrap();
    assert_eq!(connector.connect_count(), probes_before);

    manager.release_resources().await;
}
