//! Shared utilities for integration tests.
//!
//! Builds a connection factory over an in-memory mock network.

use std::sync::Arc;
use std::time::Duration;

use simfleet::plugin::ComponentFactory;
use simfleet::test_utils::RecordingMonitor;
use simfleet::transport::mock::{MockComponentFactory, MockNetwork, MockParticipant};
use simfleet::{ConnectionFactory, System};

pub const TIMEOUT: Duration = Duration::from_millis(200);

pub struct Harness {
    pub network: Arc<MockNetwork>,
    pub plugin: Arc<MockComponentFactory>,
    pub factory: Arc<ConnectionFactory>,
    pub monitor: Arc<RecordingMonitor>,
}

impl Harness {
    pub fn new() -> Self {
        let network = MockNetwork::new();
        let plugin = Arc::new(MockComponentFactory::new(network.clone()));
        let factory = Arc::new(ConnectionFactory::with_factories(vec![
            plugin.clone() as Arc<dyn ComponentFactory>
        ]));
        Self {
            network,
            plugin,
            factory,
            monitor: Arc::new(RecordingMonitor::new()),
        }
    }

    /// Put participants of system `system_name` on the network.
    pub fn spawn(&self, system_name: &str, names: &[&str]) {
        for name in names {
            self.network
                .add_participant(MockParticipant::new(*name, system_name));
        }
    }

    /// System with `names` added in order and the harness monitor attached.
    pub async fn system(&self, system_name: &str, names: &[&str]) -> System {
        let mut system = System::new(Arc::clone(&self.factory), system_name)
            .await
            .unwrap();
        system.register_monitoring(self.monitor.clone());
        system.add_many(names).await.unwrap();
        self.network.clear_calls();
        system
    }

    /// `(method, participant)` of every remote call so far, state queries
    /// left out.
    pub fn transitions(&self) -> Vec<(String, String)> {
        self.network
            .calls()
            .into_iter()
            .filter(|call| call.method != "getCurrentStateName")
            .map(|call| (call.method, call.participant))
            .collect()
    }
}
