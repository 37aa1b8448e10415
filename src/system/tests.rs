use super::*;

use crate::plugin::ComponentFactory;
use crate::rpc::{property_type, PropertyValue};
use crate::test_utils::RecordingMonitor;
use crate::transport::mock::{MockComponentFactory, MockNetwork, MockParticipant};

const TIMEOUT: Duration = Duration::from_millis(200);

struct Fixture {
    network: Arc<MockNetwork>,
    factory: Arc<ConnectionFactory>,
    monitor: Arc<RecordingMonitor>,
}

impl Fixture {
    fn new() -> Self {
        let network = MockNetwork::new();
        let plugin: Arc<dyn ComponentFactory> =
            Arc::new(MockComponentFactory::new(network.clone()));
        Self {
            network,
            factory: Arc::new(ConnectionFactory::with_factories(vec![plugin])),
            monitor: Arc::new(RecordingMonitor::new()),
        }
    }

    fn participant(&self, name: &str) -> Arc<MockParticipant> {
        self.network.add_participant(MockParticipant::new(name, "sys"))
    }

    fn participant_in(&self, name: &str, state: ParticipantState) -> Arc<MockParticipant> {
        self.network
            .add_participant(MockParticipant::new(name, "sys").with_state(state))
    }

    async fn system(&self, names: &[&str]) -> System {
        let mut system = System::new(Arc::clone(&self.factory), "sys").await.unwrap();
        system.register_monitoring(self.monitor.clone());
        system.add_many(names).await.unwrap();
        self.network.clear_calls();
        system
    }

    fn methods_called(&self) -> Vec<String> {
        self.network
            .calls()
            .into_iter()
            .map(|call| call.method)
            .collect()
    }
}

fn value(participant: &MockParticipant, path: &str) -> Option<String> {
    participant.property(path).map(|p| p.value)
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_duplicate_participant_rejected() {
    let fx = Fixture::new();
    fx.participant("p1");
    let mut system = fx.system(&["p1"]).await;

    let err = system.add("p1").await.unwrap_err();
    assert!(matches!(err, SystemError::DuplicateParticipant { .. }));
    assert_eq!(
        fx.monitor.messages(Severity::Fatal),
        vec!["Try to add a participant with name p1 which already exists."]
    );
    assert_eq!(system.participant_names(), vec!["p1"]);
}

#[tokio::test]
async fn test_unknown_participant_is_fatal() {
    let fx = Fixture::new();
    let system = fx.system(&[]).await;

    let err = system.participant("ghost").unwrap_err();
    assert!(matches!(err, SystemError::UnknownParticipant { ref participant, .. } if participant == "ghost"));
    assert_eq!(fx.monitor.messages(Severity::Fatal).len(), 1);
}

#[tokio::test]
async fn test_participant_handle_shares_state() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    system.participant("p1").unwrap().set_init_priority(7);
    assert_eq!(system.participants()[0].init_priority(), 7);
}

#[tokio::test]
async fn test_membership_keeps_insertion_order() {
    let fx = Fixture::new();
    let mut system = fx.system(&["c", "a", "b"]).await;
    system
        .add_map(vec![("d", "mock://sys/d"), ("e", "")])
        .await
        .unwrap();
    assert_eq!(system.participant_names(), vec!["c", "a", "b", "d", "e"]);
    assert_eq!(system.participant("d").unwrap().url(), "mock://sys/d");

    assert!(system.remove("a"));
    assert!(!system.remove("a"));
    system.remove_many(["d", "e"]);
    assert_eq!(system.participant_names(), vec!["c", "b"]);

    system.clear();
    assert!(system.participants().is_empty());
}

#[tokio::test]
async fn test_try_clone_copies_metadata_not_monitor() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;
    let original = system.participant("p1").unwrap();
    original.set_start_priority(4);
    original.set_additional_info("rig", "hil-2");

    let copy = system.try_clone().await.unwrap();
    let copied = copy.participant("p1").unwrap();
    assert_eq!(copied.start_priority(), 4);
    assert_eq!(copied.additional_info("rig").as_deref(), Some("hil-2"));
    assert!(!ParticipantProxy::ptr_eq(&original, &copied));
    assert!(Connection::ptr_eq(system.connection(), copy.connection()));
    assert!(!copy.logger.has_monitor());
}

// ============================================================================
// State
// ============================================================================

#[tokio::test]
async fn test_empty_system_state() {
    let fx = Fixture::new();
    let system = fx.system(&[]).await;
    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(true, ParticipantState::Undefined)
    );
}

#[tokio::test]
async fn test_system_state_is_lowest_participant_state() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Initialized);
    fx.participant_in("p2", ParticipantState::Loaded);
    fx.participant_in("p3", ParticipantState::Undefined);
    let system = fx.system(&["p1", "p2", "p3"]).await;

    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(false, ParticipantState::Loaded)
    );
    let states = system.participant_states(TIMEOUT).await;
    assert_eq!(states["p1"], ParticipantState::Initialized);
    assert_eq!(states["p3"], ParticipantState::Undefined);
    assert_eq!(
        system.participant_state("p2", TIMEOUT).await.unwrap(),
        ParticipantState::Loaded
    );
}

#[tokio::test]
async fn test_participant_without_route_reads_unreachable() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Loaded);
    let system = fx.system(&["p1", "ghost"]).await;

    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(false, ParticipantState::Unreachable)
    );
}

#[tokio::test]
async fn test_set_system_state_rejects_unsettable_target() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    for target in [ParticipantState::Undefined, ParticipantState::Unreachable] {
        let err = system.set_system_state(target, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SystemError::InvalidTargetState { .. }));
    }
    assert!(fx.network.calls().is_empty());
    assert_eq!(fx.monitor.messages(Severity::Fatal).len(), 2);
}

#[tokio::test]
async fn test_set_system_state_walks_up() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2");
    let system = fx.system(&["p1", "p2"]).await;

    system
        .set_system_state(ParticipantState::Running, TIMEOUT)
        .await
        .unwrap();

    let transitions: Vec<_> = fx
        .methods_called()
        .into_iter()
        .filter(|m| m != "getCurrentStateName")
        .collect();
    assert_eq!(
        transitions,
        vec!["load", "load", "initialize", "initialize", "start", "start"]
    );
    assert_eq!(
        system.system_state(TIMEOUT).await,
        SystemState::new(true, ParticipantState::Running)
    );
}

#[tokio::test]
async fn test_set_system_state_walks_down() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Running);
    fx.participant_in("p2", ParticipantState::Running);
    let system = fx.system(&["p1", "p2"]).await;
    system.participant("p1").unwrap().set_start_priority(1);
    system.participant("p1").unwrap().set_init_priority(1);

    system
        .set_system_state(ParticipantState::Unloaded, TIMEOUT)
        .await
        .unwrap();

    assert_eq!(fx.network.calls_to("stop"), vec!["p2", "p1"]);
    assert_eq!(fx.network.calls_to("deinitialize"), vec!["p2", "p1"]);
    assert_eq!(fx.network.calls_to("unload"), vec!["p2", "p1"]);
    assert!(fx.network.calls_to("pause").is_empty());
}

#[tokio::test]
async fn test_set_system_state_to_paused() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Running);
    let system = fx.system(&["p1"]).await;

    system
        .set_system_state(ParticipantState::Paused, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(fx.network.calls_to("pause"), vec!["p1"]);
    assert!(fx.network.calls_to("stop").is_empty());

    system
        .set_system_state(ParticipantState::Initialized, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(fx.network.calls_to("stop"), vec!["p1"]);
}

#[tokio::test]
async fn test_set_system_state_is_idempotent() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2");
    let system = fx.system(&["p1", "p2"]).await;

    system
        .set_system_state(ParticipantState::Initialized, TIMEOUT)
        .await
        .unwrap();
    fx.network.clear_calls();

    system
        .set_system_state(ParticipantState::Initialized, TIMEOUT)
        .await
        .unwrap();
    assert!(fx
        .methods_called()
        .iter()
        .all(|m| m == "getCurrentStateName"));
}

#[tokio::test]
async fn test_set_system_state_fails_on_mixed_states() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Loaded);
    fx.participant_in("p2", ParticipantState::Initialized);
    let system = fx.system(&["p1", "p2"]).await;

    for target in [ParticipantState::Running, ParticipantState::Loaded] {
        let err = system.set_system_state(target, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SystemError::NotHomogeneous { .. }));
    }
    assert!(fx
        .methods_called()
        .iter()
        .all(|m| m == "getCurrentStateName"));
    assert!(fx.monitor.messages(Severity::Fatal)[0]
        .starts_with("No homogenous state of the participants"));
}

#[tokio::test]
async fn test_set_system_state_fails_on_unreachable_participant() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2").set_reachable(false);
    let system = fx.system(&["p1", "p2"]).await;

    let err = system
        .set_system_state(ParticipantState::Loaded, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::Unreachable { .. }));
    assert!(fx.network.calls_to("load").is_empty());
}

#[tokio::test]
async fn test_set_system_state_fails_without_state_machines() {
    let fx = Fixture::new();
    fx.participant_in("p1", ParticipantState::Undefined);
    let system = fx.system(&["p1"]).await;

    let err = system
        .set_system_state(ParticipantState::Loaded, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::NoStateMachine { .. }));
}

#[tokio::test]
async fn test_set_system_state_stops_at_failed_transition() {
    let fx = Fixture::new();
    fx.participant("p1").deny_method("initialize");
    let system = fx.system(&["p1"]).await;

    let err = system
        .set_system_state(ParticipantState::Running, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SystemError::TransitionFailed {
            transition: Transition::Initialize,
            ..
        }
    ));
    assert!(fx.network.calls_to("start").is_empty());
}

#[tokio::test]
async fn test_default_entry_points_use_configured_timeouts() {
    let fx = Fixture::new();
    let slow = fx.participant("p1");
    let mut config = SimfleetConfig::for_test();
    config.timeouts.default_ms = 20;
    config.timeouts.transition_ms = 1_000;
    let mut system = System::with_config(Arc::clone(&fx.factory), "sys", "", &config)
        .await
        .unwrap();
    system.add("p1").await.unwrap();
    slow.set_response_delay(Duration::from_millis(100));

    assert_eq!(
        system.system_state_default().await,
        SystemState::new(true, ParticipantState::Unreachable)
    );

    system
        .set_system_state_default(ParticipantState::Loaded)
        .await
        .unwrap();
    assert_eq!(slow.state(), ParticipantState::Loaded);
}

#[tokio::test]
async fn test_short_transition_timeout_from_config() {
    let fx = Fixture::new();
    let slow = fx.participant("p1");
    let mut config = SimfleetConfig::for_test();
    config.timeouts.transition_ms = 20;
    let mut system = System::with_config(Arc::clone(&fx.factory), "sys", "", &config)
        .await
        .unwrap();
    system.add("p1").await.unwrap();
    slow.set_response_delay(Duration::from_millis(100));

    let err = system
        .set_system_state_default(ParticipantState::Loaded)
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::Unreachable { .. }));
    assert_eq!(slow.state(), ParticipantState::Unloaded);
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn test_transition_on_empty_system_warns() {
    let fx = Fixture::new();
    let system = fx.system(&[]).await;

    system.load(TIMEOUT).await.unwrap();
    assert_eq!(
        fx.monitor.messages(Severity::Warning),
        vec!["No participants within the current system"]
    );
}

#[tokio::test]
async fn test_transition_reports_success() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    system.load(TIMEOUT).await.unwrap();
    assert_eq!(
        fx.monitor.messages(Severity::Info),
        vec!["system sys loaded successfully"]
    );
}

#[tokio::test]
async fn test_load_order_by_init_priority() {
    let fx = Fixture::new();
    for name in ["A", "B", "C"] {
        fx.participant(name);
    }
    let system = fx.system(&["A", "B", "C"]).await;
    system.participant("A").unwrap().set_init_priority(1);
    system.participant("B").unwrap().set_init_priority(2);
    system.participant("C").unwrap().set_init_priority(2);

    system.load(TIMEOUT).await.unwrap();
    assert_eq!(fx.network.calls_to("load"), vec!["C", "B", "A"]);

    system.unload(TIMEOUT).await.unwrap();
    assert_eq!(fx.network.calls_to("unload"), vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_start_and_stop_order_by_start_priority() {
    let fx = Fixture::new();
    for name in ["p1", "p2", "p3"] {
        fx.participant_in(name, ParticipantState::Initialized);
    }
    let system = fx.system(&["p1", "p2", "p3"]).await;
    system.participant("p1").unwrap().set_start_priority(10);
    system.participant("p3").unwrap().set_start_priority(-1);
    system.participant("p2").unwrap().set_init_priority(99);

    system.start(TIMEOUT).await.unwrap();
    assert_eq!(fx.network.calls_to("start"), vec!["p1", "p2", "p3"]);

    system.stop(TIMEOUT).await.unwrap();
    assert_eq!(fx.network.calls_to("stop"), vec!["p3", "p2", "p1"]);
}

#[tokio::test]
async fn test_shutdown_in_insertion_order() {
    let fx = Fixture::new();
    for name in ["p1", "p2", "p3"] {
        fx.participant(name);
    }
    let system = fx.system(&["p1", "p2", "p3"]).await;
    system.participant("p3").unwrap().set_init_priority(5);
    system.participant("p3").unwrap().set_start_priority(5);

    system.shutdown(TIMEOUT).await.unwrap();
    assert_eq!(fx.network.calls_to("exit"), vec!["p1", "p2", "p3"]);
    assert_eq!(
        fx.monitor.messages(Severity::Info),
        vec!["system sys shut down successfully"]
    );
}

#[tokio::test]
async fn test_transition_failures_do_not_stop_the_walk() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2").fail_method("load", "kaputt");
    fx.participant("p3").deny_method("load");
    let system = fx.system(&["p1", "p2", "p3", "ghost"]).await;

    let err = system.load(TIMEOUT).await.unwrap_err();
    assert_eq!(fx.network.calls_to("load"), vec!["p3", "p2", "p1"]);

    let message = err.to_string();
    assert!(message.contains("kaputt"));
    assert!(message.contains("p3: state machine load denied"));
    assert!(message.contains("participant ghost is unreachable"));
    assert_eq!(fx.monitor.messages(Severity::Error), vec![message]);
}

#[tokio::test]
async fn test_transition_timeout_is_reported() {
    let fx = Fixture::new();
    fx.participant("p1")
        .set_response_delay(Duration::from_millis(300));
    let system = fx.system(&["p1"]).await;

    let err = system.load(Duration::from_millis(20)).await.unwrap_err();
    assert!(err.to_string().contains("timeout while loading"));
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_set_property_value() {
    let fx = Fixture::new();
    let p1 = fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    system
        .set_property_value("p1", "clock.step_size", property_type::INT32, "25")
        .await
        .unwrap();
    assert_eq!(
        p1.property("clock/step_size"),
        Some(PropertyValue::new("int32", "25"))
    );
    assert_eq!(
        system
            .property_value("p1", "clock/step_size")
            .await
            .unwrap(),
        Some(PropertyValue::new("int32", "25"))
    );
    assert_eq!(
        system.property_value("p1", "nowhere/nothing").await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_set_property_value_failures() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    let missing = system
        .set_property_value("p1", "clock/unknown", property_type::INT32, "1")
        .await
        .unwrap_err();
    assert_eq!(
        missing.to_string(),
        "property /clock/unknown could not be set for the following participants: p1"
    );

    let no_node = system
        .set_property_value("p1", "nowhere/x", property_type::INT32, "1")
        .await
        .unwrap_err();
    assert!(matches!(no_node, SystemError::PropertyNode { .. }));

    assert!(system
        .set_property_value("ghost", "clock/step_size", property_type::INT32, "1")
        .await
        .is_err());
    assert_eq!(fx.monitor.messages(Severity::Error).len(), 2);
}

#[tokio::test]
async fn test_set_system_property_is_best_effort() {
    let fx = Fixture::new();
    let p1 = fx.network.add_participant(
        MockParticipant::new("p1", "sys").with_property("system/gain", "double", "1.0"),
    );
    fx.participant("p2");
    fx.participant("p3").set_reachable(false);
    let system = fx.system(&["p1", "p2", "p3"]).await;

    system
        .set_system_property("gain", property_type::DOUBLE, "0.5")
        .await
        .unwrap();

    assert_eq!(
        p1.property("system/gain"),
        Some(PropertyValue::new("double", "0.5"))
    );
    let warnings = fx.monitor.messages(Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("p2, p3"));
    assert!(fx.monitor.messages(Severity::Error).is_empty());
}

#[tokio::test]
async fn test_set_property_value_to_all_strict() {
    let fx = Fixture::new();
    fx.network.add_participant(
        MockParticipant::new("p1", "sys").without_property("clock/time_factor"),
    );
    let p2 = fx.participant("p2");
    let p3 = fx.participant("p3");
    let system = fx.system(&["p1", "p2", "p3"]).await;

    let err = system
        .set_property_value_to_all(
            "clock/time_factor",
            property_type::DOUBLE,
            "2.0",
            Some("p3"),
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::PropertyNotSet { ref participants, .. } if participants == "p1"));
    assert_eq!(
        p2.property("clock/time_factor"),
        Some(PropertyValue::new("double", "2.0"))
    );
    assert_eq!(
        p3.property("clock/time_factor"),
        Some(PropertyValue::new("double", "1.0"))
    );
}

// ============================================================================
// Timing
// ============================================================================

#[tokio::test]
async fn test_configure_timing_discrete_steps() {
    let fx = Fixture::new();
    let master = fx.participant("master");
    let slave = fx.participant("slave");
    let system = fx.system(&["master", "slave"]).await;

    system
        .configure_timing_discrete_steps("master", "50", "2.0")
        .await
        .unwrap();

    assert_eq!(
        value(&master, PROPERTY_MAIN_CLOCK).as_deref(),
        Some(CLOCK_LOCAL_SYSTEM_SIMTIME)
    );
    assert_eq!(value(&master, PROPERTY_STEP_SIZE).as_deref(), Some("50"));
    assert_eq!(value(&master, PROPERTY_TIME_FACTOR).as_deref(), Some("2.0"));
    assert_eq!(
        value(&slave, PROPERTY_MAIN_CLOCK).as_deref(),
        Some(CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE)
    );
    assert_eq!(value(&slave, PROPERTY_TIMING_MASTER).as_deref(), Some("master"));
    assert_eq!(value(&slave, PROPERTY_STEP_SIZE).as_deref(), Some("100"));

    assert_eq!(system.current_timing_masters().await.unwrap(), vec!["master"]);
}

#[tokio::test]
async fn test_configure_timing_sync_cycle_skips_master() {
    let fx = Fixture::new();
    let master = fx.participant("master");
    let slave = fx.participant("slave");
    let system = fx.system(&["master", "slave"]).await;

    system
        .configure_timing_clock_sync_only_interpolation("master", "250")
        .await
        .unwrap();

    assert_eq!(
        value(&slave, PROPERTY_SYNC_CYCLE_TIME).as_deref(),
        Some("250")
    );
    assert_eq!(
        value(&master, PROPERTY_SYNC_CYCLE_TIME).as_deref(),
        Some("100")
    );
    assert_eq!(
        value(&master, PROPERTY_MAIN_CLOCK).as_deref(),
        Some(CLOCK_LOCAL_SYSTEM_REALTIME)
    );
    assert_eq!(
        value(&slave, PROPERTY_MAIN_CLOCK).as_deref(),
        Some(CLOCK_SLAVE_MASTER_ON_DEMAND)
    );
}

#[tokio::test]
async fn test_configure_timing_no_master() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2");
    let system = fx.system(&["p1", "p2"]).await;

    system.configure_timing_afap("p1", "10").await.unwrap();
    assert_eq!(system.current_timing_masters().await.unwrap(), vec!["p1"]);

    system.configure_timing_no_master().await.unwrap();
    assert!(system.current_timing_masters().await.unwrap().is_empty());

    let timing = system.timing_properties().await.unwrap();
    let p2 = &timing["p2"];
    assert_eq!(
        p2[PROPERTY_MAIN_CLOCK],
        PropertyValue::new("string", CLOCK_LOCAL_SYSTEM_REALTIME)
    );
    assert_eq!(
        p2[PROPERTY_SCHEDULER],
        PropertyValue::new("string", SCHEDULER_CLOCK_BASED)
    );
    assert!(!p2.contains_key(PROPERTY_STEP_SIZE));
}

#[tokio::test]
async fn test_timing_properties_with_master() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2");
    let system = fx.system(&["p1", "p2"]).await;

    system.configure_timing_afap("p1", "10").await.unwrap();
    let timing = system.timing_properties().await.unwrap();

    let p1 = &timing["p1"];
    assert_eq!(p1[PROPERTY_STEP_SIZE], PropertyValue::new("int32", "10"));
    assert_eq!(p1[PROPERTY_TIME_FACTOR], PropertyValue::new("double", "0.0"));
    assert_eq!(p1[PROPERTY_TIMING_MASTER].value, "p1");
    assert!(timing["p2"].contains_key(PROPERTY_SYNC_CYCLE_TIME));
}

#[tokio::test]
async fn test_configure_timing_unknown_master() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    let err = system
        .configure_timing_discrete_steps("ghost", "10", "1.0")
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::UnknownParticipant { .. }));
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discover_system() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.participant("p2");
    fx.network
        .add_participant(MockParticipant::new("x1", "other"));

    let system = discover_system(&fx.factory, "sys", TIMEOUT).await.unwrap();
    assert_eq!(system.name(), "sys");
    assert_eq!(system.participant_names(), vec!["p1", "p2"]);
    assert_eq!(system.participant("p1").unwrap().url(), "mock://sys/p1");
}

#[tokio::test]
async fn test_discover_system_failure() {
    let fx = Fixture::new();
    fx.network.set_discovery_failure(Some("network down"));

    let err = discover_system(&fx.factory, "sys", TIMEOUT).await.unwrap_err();
    assert!(matches!(err, SystemError::Discovery { .. }));
    assert!(err.to_string().contains("network down"));
}

#[tokio::test]
async fn test_discover_system_with_configured_timeout() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.network.set_discovery_delay(Duration::from_millis(100));
    let mut config = SimfleetConfig::for_test();

    config.timeouts.discover_ms = 20;
    let err = discover_system_with_config(&fx.factory, "sys", "", &config)
        .await
        .unwrap_err();
    assert!(matches!(err, SystemError::Discovery { .. }));
    assert!(err.to_string().contains("no answer within 20ms"));

    config.timeouts.discover_ms = 1_000;
    let system = discover_system_with_config(&fx.factory, "sys", "", &config)
        .await
        .unwrap();
    assert_eq!(system.participant_names(), vec!["p1"]);
    assert_eq!(system.timeouts().discover(), Duration::from_secs(1));
}

#[tokio::test]
async fn test_discover_all_systems() {
    let fx = Fixture::new();
    fx.participant("p1");
    fx.network
        .add_participant(MockParticipant::new("x1", "other"));
    fx.network
        .add_participant(MockParticipant::new("x2", "other"));

    let systems = discover_all_systems(&fx.factory, TIMEOUT).await.unwrap();
    let summary: Vec<_> = systems
        .iter()
        .map(|s| (s.name().to_string(), s.participant_names()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("other".to_string(), vec!["x1".to_string(), "x2".to_string()]),
            ("sys".to_string(), vec!["p1".to_string()]),
        ]
    );

    let other = &systems[0];
    assert_eq!(
        other.participant_state("x2", TIMEOUT).await.unwrap(),
        ParticipantState::Unloaded
    );
}

// ============================================================================
// Observability
// ============================================================================

#[tokio::test]
async fn test_participant_logs_reach_monitor() {
    let fx = Fixture::new();
    fx.participant("p1");
    let system = fx.system(&["p1"]).await;

    let delivered = fx
        .network
        .emit_log("sys", "p1", Severity::Warning, "p1.core", "low fuel")
        .await;
    assert_eq!(delivered, 1);

    let events = fx.monitor.events();
    let event = events.last().unwrap();
    assert_eq!(event.participant_name, "p1");
    assert_eq!(event.logger_name, "p1.core");
    assert_eq!(event.message, "low fuel");
    drop(system);
}

#[tokio::test]
async fn test_severity_filter_and_unregister() {
    let fx = Fixture::new();
    let system = fx.system(&[]).await;

    system.set_severity_level(Severity::Error);
    system.load(TIMEOUT).await.unwrap();
    assert_eq!(fx.monitor.count(), 0);

    system.set_severity_level(Severity::Debug);
    let other = Arc::new(RecordingMonitor::new());
    assert!(!system.unregister_monitoring(other.clone()));
    system.load(TIMEOUT).await.unwrap();
    assert_eq!(fx.monitor.count(), 1);
    assert_eq!(other.count(), 0);

    assert!(system.unregister_monitoring(fx.monitor.clone()));
    system.load(TIMEOUT).await.unwrap();
    assert_eq!(fx.monitor.count(), 1);
}

#[tokio::test]
async fn test_systems_share_connection() {
    let fx = Fixture::new();
    let first = System::new(Arc::clone(&fx.factory), "sys").await.unwrap();
    let second = System::new(Arc::clone(&fx.factory), "sys").await.unwrap();
    let other = System::new(Arc::clone(&fx.factory), "other").await.unwrap();

    assert!(Connection::ptr_eq(first.connection(), second.connection()));
    assert!(!Connection::ptr_eq(first.connection(), other.connection()));
}
