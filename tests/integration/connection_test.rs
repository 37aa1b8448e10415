//! Connection sharing between systems.

use std::sync::Arc;

use crate::common::{Harness, TIMEOUT};

use simfleet::config::SimfleetConfig;
use simfleet::system::discover_system;
use simfleet::{Connection, ConnectionFactory, ParticipantState, System, SystemError};
use tokio_test::assert_err;

#[tokio::test]
async fn test_systems_with_same_key_share_connection() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1"]);

    let first = harness.system("sys", &["p1"]).await;
    let second = harness.system("sys", &["p1"]).await;
    assert!(Connection::ptr_eq(first.connection(), second.connection()));
    assert_eq!(harness.plugin.buses_created(), 1);

    drop(first);
    drop(second);
    assert_eq!(harness.factory.live_connections(), 0);

    let third = harness.system("sys", &["p1"]).await;
    assert_eq!(harness.plugin.buses_created(), 2);
    assert_eq!(
        third.participant_state("p1", TIMEOUT).await.unwrap(),
        ParticipantState::Unloaded
    );
}

#[tokio::test]
async fn test_discovered_system_shares_connection_with_constructed_one() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1", "p2"]);

    let constructed = harness.system("sys", &[]).await;
    let discovered = discover_system(&harness.factory, "sys", TIMEOUT)
        .await
        .unwrap();

    assert!(Connection::ptr_eq(
        constructed.connection(),
        discovered.connection()
    ));
    assert_eq!(discovered.participant_names(), vec!["p1", "p2"]);
}

#[tokio::test]
async fn test_unreachable_discovery_url_fails_construction() {
    let harness = Harness::new();
    harness.network.reject_url("mock://lab");

    let err = assert_err!(System::with_url(Arc::clone(&harness.factory), "sys", "mock://lab").await);
    assert!(matches!(err, SystemError::Connection(_)));
    assert!(err
        .to_string()
        .contains("can not create system access in service bus connection"));
}

#[tokio::test]
async fn test_missing_plugin_manifest_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = SimfleetConfig::for_test();
    config.plugins.manifest = Some(dir.path().join("missing.yaml"));
    let factory = Arc::new(ConnectionFactory::from_config(&config));

    let err = assert_err!(System::with_config(factory, "sys", "", &config).await);
    assert!(matches!(err, SystemError::Connection(_)));
}
