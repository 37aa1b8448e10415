//! Property and timing propagation.

use crate::common::{Harness, TIMEOUT};

use simfleet::rpc::{property_type, PropertyValue};
use simfleet::system::{
    CLOCK_LOCAL_SYSTEM_REALTIME, CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE, PROPERTY_MAIN_CLOCK,
    PROPERTY_TIMING_MASTER,
};
use simfleet::transport::mock::MockParticipant;
use simfleet::Severity;

#[tokio::test]
async fn test_system_property_skips_participants_without_it() {
    let harness = Harness::new();
    let p1 = harness.network.add_participant(
        MockParticipant::new("p1", "sys").with_property("system/log_level", "int32", "4"),
    );
    harness.network.add_participant(MockParticipant::new("p2", "sys"));
    harness
        .network
        .add_participant(MockParticipant::new("p3", "sys"))
        .set_reachable(false);
    let system = harness.system("sys", &["p1", "p2", "p3"]).await;

    system
        .set_system_property("log_level", property_type::INT32, "2")
        .await
        .unwrap();

    assert_eq!(
        p1.property("system/log_level"),
        Some(PropertyValue::new("int32", "2"))
    );
    let warnings = harness.monitor.messages(Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("p2, p3"));
    assert!(harness.monitor.messages(Severity::Error).is_empty());
}

#[tokio::test]
async fn test_dotted_property_path_is_accepted() {
    let harness = Harness::new();
    harness.spawn("sys", &["p1"]);
    let system = harness.system("sys", &["p1"]).await;

    system
        .set_property_value("p1", "scheduling.scheduler", property_type::STRING, "custom")
        .await
        .unwrap();
    assert_eq!(
        system
            .property_value("p1", "scheduling/scheduler")
            .await
            .unwrap(),
        Some(PropertyValue::new("string", "custom"))
    );
}

#[tokio::test]
async fn test_timing_roundtrip_through_queries() {
    let harness = Harness::new();
    harness.spawn("sys", &["master", "s1", "s2"]);
    let system = harness.system("sys", &["master", "s1", "s2"]).await;

    system
        .configure_timing_clock_sync_only_discrete("master", "500")
        .await
        .unwrap();
    assert_eq!(
        system.current_timing_masters().await.unwrap(),
        vec!["master"]
    );

    let timing = system.timing_properties().await.unwrap();
    assert_eq!(timing.len(), 3);
    assert_eq!(
        timing["master"][PROPERTY_MAIN_CLOCK].value,
        CLOCK_LOCAL_SYSTEM_REALTIME
    );
    for slave in ["s1", "s2"] {
        assert_eq!(
            timing[slave][PROPERTY_MAIN_CLOCK].value,
            CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE
        );
        assert_eq!(timing[slave][PROPERTY_TIMING_MASTER].value, "master");
    }

    system
        .set_system_state(simfleet::ParticipantState::Running, TIMEOUT)
        .await
        .unwrap();
}
