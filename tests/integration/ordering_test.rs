//! Call order of fleet-wide transitions and failure aggregation.

use crate::common::{Harness, TIMEOUT};

use simfleet::{ParticipantState, Severity, SystemError};

#[tokio::test]
async fn test_load_visits_highest_init_priority_first() {
    let harness = Harness::new();
    harness.spawn("sys", &["A", "B", "C"]);
    let system = harness.system("sys", &["A", "B", "C"]).await;
    system.participant("A").unwrap().set_init_priority(1);
    system.participant("B").unwrap().set_init_priority(2);
    system.participant("C").unwrap().set_init_priority(2);

    system.load(TIMEOUT).await.unwrap();
    system.initialize(TIMEOUT).await.unwrap();
    assert_eq!(harness.network.calls_to("load"), vec!["C", "B", "A"]);
    assert_eq!(harness.network.calls_to("initialize"), vec!["C", "B", "A"]);

    system.deinitialize(TIMEOUT).await.unwrap();
    system.unload(TIMEOUT).await.unwrap();
    assert_eq!(harness.network.calls_to("deinitialize"), vec!["A", "B", "C"]);
    assert_eq!(harness.network.calls_to("unload"), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_pause_follows_start_priority() {
    let harness = Harness::new();
    harness.spawn("sys", &["x", "y", "z"]);
    let system = harness.system("sys", &["x", "y", "z"]).await;
    system.participant("x").unwrap().set_start_priority(3);
    system.participant("z").unwrap().set_start_priority(3);
    system.participant("y").unwrap().set_init_priority(10);

    system
        .set_system_state(ParticipantState::Paused, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(harness.network.calls_to("pause"), vec!["z", "x", "y"]);

    system.stop(TIMEOUT).await.unwrap();
    assert_eq!(harness.network.calls_to("stop"), vec!["y", "x", "z"]);
}

#[tokio::test]
async fn test_failure_of_one_participant_does_not_stop_the_walk() {
    let harness = Harness::new();
    harness.spawn("sys", &["first", "second", "third"]);
    harness
        .network
        .participant("sys", "second")
        .unwrap()
        .fail_method("load", "license server unavailable");
    let system = harness.system("sys", &["first", "second", "third"]).await;
    system.participant("first").unwrap().set_init_priority(3);
    system.participant("second").unwrap().set_init_priority(2);
    system.participant("third").unwrap().set_init_priority(1);

    let err = system.load(TIMEOUT).await.unwrap_err();

    assert_eq!(
        harness.network.calls_to("load"),
        vec!["first", "second", "third"]
    );
    assert!(matches!(err, SystemError::TransitionFailed { .. }));
    assert!(err.to_string().contains("license server unavailable"));
    assert!(!err.to_string().contains("first"));

    let errors = harness.monitor.messages(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("second"));
    assert!(harness.monitor.messages(Severity::Info).is_empty());
}
