//! Driving whole systems through their lifecycle.

use crate::common::{Harness, TIMEOUT};

use simfleet::{ParticipantState, Severity, SystemError, SystemState};

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(method, participant)| (method.to_string(), participant.to_string()))
        .collect()
}

/// Unloaded to running loads, initializes and starts the higher init
/// priority first; equal start priorities reverse insertion order.
#[tokio::test]
async fn test_unloaded_to_running_end_to_end() {
    let harness = Harness::new();
    harness.spawn("sys", &["part1", "part2"]);
    let system = harness.system("sys", &["part1", "part2"]).await;
    system.participant("part1").unwrap().set_init_priority(1);
    system.participant("part2").unwrap().set_init_priority(2);

    system
        .set_system_state(ParticipantState::Running, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(
        harness.transitions(),
        pairs(&[
            ("load", "part2"),
            ("load", "part1"),
            ("initialize", "part2"),
            ("initialize", "part1"),
            ("start", "part2"),
            ("start", "part1"),
        ])
    );
    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(true, ParticipantState::Running)
    );

    let info = harness.monitor.messages(Severity::Info);
    assert!(info.contains(&"system sys loaded successfully".to_string()));
    assert!(info.contains(&"system sys started successfully".to_string()));
}

#[tokio::test]
async fn test_running_back_to_unloaded_and_shutdown() {
    let harness = Harness::new();
    harness.spawn("sys", &["part1", "part2"]);
    let system = harness.system("sys", &["part1", "part2"]).await;
    system.participant("part1").unwrap().set_init_priority(1);
    system.participant("part2").unwrap().set_init_priority(2);

    system
        .set_system_state(ParticipantState::Running, TIMEOUT)
        .await
        .unwrap();
    harness.network.clear_calls();

    system
        .set_system_state(ParticipantState::Unloaded, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(
        harness.transitions(),
        pairs(&[
            ("stop", "part1"),
            ("stop", "part2"),
            ("deinitialize", "part1"),
            ("deinitialize", "part2"),
            ("unload", "part1"),
            ("unload", "part2"),
        ])
    );

    system.shutdown(TIMEOUT).await.unwrap();
    assert_eq!(
        harness.network.calls_to("exit"),
        vec!["part1", "part2"]
    );
    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(true, ParticipantState::Unreachable)
    );
}

#[tokio::test]
async fn test_second_set_system_state_only_reads_state() {
    let harness = Harness::new();
    harness.spawn("sys", &["a", "b", "c"]);
    let system = harness.system("sys", &["a", "b", "c"]).await;

    system
        .set_system_state(ParticipantState::Paused, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(harness.network.calls_to("pause").len(), 3);
    harness.network.clear_calls();

    system
        .set_system_state(ParticipantState::Paused, TIMEOUT)
        .await
        .unwrap();
    assert!(harness.transitions().is_empty());
    assert_eq!(harness.network.calls_to("getCurrentStateName").len(), 3);
}

#[tokio::test]
async fn test_mixed_states_block_set_system_state() {
    let harness = Harness::new();
    harness.spawn("sys", &["a", "b"]);
    harness
        .network
        .participant("sys", "a")
        .unwrap()
        .set_state(ParticipantState::Loaded);
    harness
        .network
        .participant("sys", "b")
        .unwrap()
        .set_state(ParticipantState::Initialized);
    let system = harness.system("sys", &["a", "b"]).await;

    for target in [
        ParticipantState::Unloaded,
        ParticipantState::Initialized,
        ParticipantState::Running,
    ] {
        let err = system.set_system_state(target, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SystemError::NotHomogeneous { .. }));
    }
    assert!(harness.transitions().is_empty());
    assert_eq!(harness.monitor.messages(Severity::Fatal).len(), 3);
}

#[tokio::test]
async fn test_cloned_system_drives_same_participants() {
    let harness = Harness::new();
    harness.spawn("sys", &["a", "b"]);
    let system = harness.system("sys", &["a", "b"]).await;
    system.participant("a").unwrap().set_init_priority(5);

    let copy = system.try_clone().await.unwrap();
    copy.load(TIMEOUT).await.unwrap();

    assert_eq!(harness.network.calls_to("load"), vec!["a", "b"]);
    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(true, ParticipantState::Loaded)
    );
}
