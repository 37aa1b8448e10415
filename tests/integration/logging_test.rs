//! Participant log forwarding to the system monitor.

use std::time::Duration;

use crate::common::{Harness, TIMEOUT};

use simfleet::system::discover_system;
use simfleet::Severity;

#[tokio::test]
async fn test_participant_logs_reach_registered_monitor() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1", "p2"]);
    let system = harness.system("sys", &["p1", "p2"]).await;

    for participant in ["p1", "p2"] {
        let delivered = harness
            .network
            .emit_log("sys", participant, Severity::Error, "io", "sensor timeout")
            .await;
        assert_eq!(delivered, 1);
    }

    let forwarded: Vec<_> = harness
        .monitor
        .events()
        .into_iter()
        .filter(|event| event.message == "sensor timeout")
        .map(|event| (event.participant_name, event.severity))
        .collect();
    assert_eq!(
        forwarded,
        vec![
            ("p1".to_string(), Severity::Error),
            ("p2".to_string(), Severity::Error),
        ]
    );
    drop(system);
}

#[tokio::test]
async fn test_forwarded_logs_respect_severity_level() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1"]);
    let system = harness.system("sys", &["p1"]).await;
    system.set_severity_level(Severity::Warning);

    harness
        .network
        .emit_log("sys", "p1", Severity::Debug, "core", "chatty")
        .await;
    harness
        .network
        .emit_log("sys", "p1", Severity::Warning, "core", "low disk")
        .await;

    let messages: Vec<_> = harness
        .monitor
        .events()
        .into_iter()
        .map(|event| event.message)
        .collect();
    assert_eq!(messages, vec!["low disk"]);
}

#[tokio::test]
async fn test_dropping_system_releases_sink_registrations() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1"]);
    let participant = harness.network.participant("sys", "p1").unwrap();

    let system = discover_system(&harness.factory, "sys", TIMEOUT)
        .await
        .unwrap();
    assert_eq!(participant.sink_clients().len(), 1);

    drop(system);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(participant.sink_clients().is_empty());
    assert_eq!(
        harness
            .network
            .emit_log("sys", "p1", Severity::Info, "core", "nobody listens")
            .await,
        0
    );
}
