//! In-memory transport for testing.
//!
//! A [`MockNetwork`] holds fake participants ([`MockParticipant`]) and the
//! servers the control plane creates. [`MockComponentFactory`] plugs the
//! network into a `ConnectionFactory` like a real transport plugin would.

mod participant;

pub use participant::MockParticipant;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use super::jsonrpc::{self, JsonRpcRequest, JsonRpcResponse};
use super::{
    DiscoveredParticipant, ParticipantServer, Requester, Result, RpcService, ServiceBus,
    SystemAccess, TransportError, DISCOVER_ALL_SYSTEMS, PARTICIPANT_SYSTEM_SEPARATOR,
    SERVICE_BUS_IID,
};
use crate::logging::{Severity, LOG_SINK_CLIENT_SERVICE};
use crate::plugin::ComponentFactory;

/// URL a mock bus substitutes for the default discovery URL.
pub const MOCK_DEFAULT_URL: &str = "mock://default";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One request seen by the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub participant: String,
    pub service: String,
    pub method: String,
}

/// Shared state of the in-memory transport.
#[derive(Default)]
pub struct MockNetwork {
    participants: RwLock<Vec<Arc<MockParticipant>>>,
    servers: RwLock<HashMap<String, Arc<MockServer>>>,
    calls: Mutex<Vec<RecordedCall>>,
    rejected_urls: Mutex<HashSet<String>>,
    discovery_failure: Mutex<Option<String>>,
    discovery_delay: Mutex<Duration>,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_participant(&self, participant: MockParticipant) -> Arc<MockParticipant> {
        let participant = Arc::new(participant);
        self.participants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&participant));
        participant
    }

    pub fn participant(&self, system_name: &str, name: &str) -> Option<Arc<MockParticipant>> {
        self.participants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.system_name() == system_name && p.name() == name)
            .cloned()
    }

    pub fn remove_participant(&self, system_name: &str, name: &str) {
        self.participants
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| !(p.system_name() == system_name && p.name() == name));
    }

    fn participants(&self) -> Vec<Arc<MockParticipant>> {
        self.participants
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every request sent so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        locked(&self.calls).clone()
    }

    /// Participants that received `method`, in call order.
    pub fn calls_to(&self, method: &str) -> Vec<String> {
        locked(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .map(|call| call.participant.clone())
            .collect()
    }

    pub fn clear_calls(&self) {
        locked(&self.calls).clear();
    }

    fn record(&self, call: RecordedCall) {
        locked(&self.calls).push(call);
    }

    /// Make system access creation fail for `url`.
    pub fn reject_url(&self, url: &str) {
        locked(&self.rejected_urls).insert(url.to_string());
    }

    /// Make discovery fail with `reason`, or succeed again with `None`.
    pub fn set_discovery_failure(&self, reason: Option<&str>) {
        *locked(&self.discovery_failure) = reason.map(str::to_string);
    }

    /// Delay discovery answers by `delay`. Discovery fails when the
    /// caller's timeout runs out first.
    pub fn set_discovery_delay(&self, delay: Duration) {
        *locked(&self.discovery_delay) = delay;
    }

    pub fn server(&self, url: &str) -> Option<Arc<MockServer>> {
        self.servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Server URLs created so far.
    pub fn server_urls(&self) -> Vec<String> {
        let mut urls: Vec<_> = self
            .servers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        urls.sort();
        urls
    }

    /// Have a participant push a log message to every sink registered with
    /// it. Returns how many sinks accepted the message.
    pub async fn emit_log(
        &self,
        system_name: &str,
        participant_name: &str,
        severity: Severity,
        logger_name: &str,
        message: &str,
    ) -> usize {
        let Some(participant) = self.participant(system_name, participant_name) else {
            return 0;
        };
        let request = JsonRpcRequest::new(
            1,
            "onLog",
            json!({
                "description": message,
                "logger_name": logger_name,
                "participant": participant_name,
                "severity": severity.as_i32(),
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );
        let request = serde_json::to_string(&request).unwrap_or_default();

        let mut delivered = 0;
        for url in participant.sink_clients() {
            let Some(service) = self
                .server(&url)
                .and_then(|server| server.service(LOG_SINK_CLIENT_SERVICE))
            else {
                continue;
            };
            let response = service.handle_request(&request).await;
            if serde_json::from_str::<JsonRpcResponse>(&response)
                .is_ok_and(|response| response.error.is_none())
            {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Server hosted on the mock network.
pub struct MockServer {
    name: String,
    url: String,
    services: Mutex<HashMap<String, Arc<dyn RpcService>>>,
}

impl MockServer {
    pub fn service(&self, service_name: &str) -> Option<Arc<dyn RpcService>> {
        locked(&self.services).get(service_name).cloned()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = locked(&self.services).keys().cloned().collect();
        names.sort();
        names
    }
}

/// Handle registered with the network. The network keeps the server itself.
struct MockServerHandle(Arc<MockServer>);

impl ParticipantServer for MockServerHandle {
    fn name(&self) -> &str {
        &self.0.name
    }

    fn url(&self) -> &str {
        &self.0.url
    }

    fn register_service(&self, service_name: &str, service: Arc<dyn RpcService>) -> Result<()> {
        locked(&self.0.services).insert(service_name.to_string(), service);
        Ok(())
    }

    fn unregister_service(&self, service_name: &str) -> Result<()> {
        locked(&self.0.services)
            .remove(service_name)
            .map(|_| ())
            .ok_or_else(|| {
                TransportError::Server(format!(
                    "service {} is not registered at {}",
                    service_name, self.0.url
                ))
            })
    }
}

/// Requester addressing one mock participant.
pub struct MockRequester {
    network: Arc<MockNetwork>,
    system_name: String,
    participant_name: String,
}

#[async_trait]
impl Requester for MockRequester {
    async fn send_request(
        &self,
        service: &str,
        request: &str,
        _timeout: Duration,
    ) -> Result<String> {
        let request = match jsonrpc::parse_request(request) {
            Ok(request) => request,
            Err(response) => return Ok(response.to_wire()),
        };
        self.network.record(RecordedCall {
            participant: self.participant_name.clone(),
            service: service.to_string(),
            method: request.method.clone(),
        });

        let participant = self
            .network
            .participant(&self.system_name, &self.participant_name)
            .filter(|p| p.is_reachable())
            .ok_or_else(|| TransportError::Unreachable(self.participant_name.clone()))?;

        let delay = participant.response_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let response = match participant.handle(service, &request) {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        };
        Ok(response.to_wire())
    }
}

/// Access to one system on the mock network.
pub struct MockSystemAccess {
    network: Arc<MockNetwork>,
    name: String,
    url: String,
}

impl MockSystemAccess {
    /// `(system, participant)` a requester name resolves to. All-systems
    /// access addresses participants as `participant@system`.
    fn resolve(&self, participant_name: &str) -> (String, String) {
        if self.name == DISCOVER_ALL_SYSTEMS {
            if let Some((participant, system)) =
                participant_name.split_once(PARTICIPANT_SYSTEM_SEPARATOR)
            {
                return (system.to_string(), participant.to_string());
            }
        }
        (self.name.clone(), participant_name.to_string())
    }
}

#[async_trait]
impl SystemAccess for MockSystemAccess {
    fn name(&self) -> &str {
        &self.name
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredParticipant>> {
        if let Some(reason) = locked(&self.network.discovery_failure).clone() {
            return Err(TransportError::Discovery(reason));
        }
        let delay = *locked(&self.network.discovery_delay);
        if !delay.is_zero()
            && tokio::time::timeout(timeout, tokio::time::sleep(delay))
                .await
                .is_err()
        {
            return Err(TransportError::Discovery(format!(
                "no answer within {timeout:?}"
            )));
        }
        let all_systems = self.name == DISCOVER_ALL_SYSTEMS;
        Ok(self
            .network
            .participants()
            .iter()
            .filter(|p| p.is_reachable())
            .filter(|p| all_systems || p.system_name() == self.name)
            .map(|p| {
                let name = if all_systems {
                    format!(
                        "{}{}{}",
                        p.name(),
                        PARTICIPANT_SYSTEM_SEPARATOR,
                        p.system_name()
                    )
                } else {
                    p.name().to_string()
                };
                DiscoveredParticipant::new(name, p.url())
            })
            .collect())
    }

    fn requester(&self, participant_name: &str) -> Option<Arc<dyn Requester>> {
        let (system_name, participant_name) = self.resolve(participant_name);
        self.network.participant(&system_name, &participant_name)?;
        Some(Arc::new(MockRequester {
            network: Arc::clone(&self.network),
            system_name,
            participant_name,
        }))
    }

    async fn create_server(&self, server_name: &str) -> Result<Arc<dyn ParticipantServer>> {
        let url = format!("mock://{}/{}", self.name, server_name);
        let mut servers = self
            .network
            .servers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if servers.contains_key(&url) {
            return Err(TransportError::Server(format!(
                "server {} already exists",
                url
            )));
        }
        let server = Arc::new(MockServer {
            name: server_name.to_string(),
            url: url.clone(),
            services: Mutex::new(HashMap::new()),
        });
        servers.insert(url, Arc::clone(&server));
        Ok(Arc::new(MockServerHandle(server)))
    }
}

/// Service bus over the mock network.
pub struct MockServiceBus {
    network: Arc<MockNetwork>,
    accesses: Mutex<HashMap<String, Arc<MockSystemAccess>>>,
}

impl MockServiceBus {
    pub fn new(network: Arc<MockNetwork>) -> Self {
        Self {
            network,
            accesses: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ServiceBus for MockServiceBus {
    async fn create_system_access(
        &self,
        system_name: &str,
        url: &str,
        is_default: bool,
    ) -> Result<Arc<dyn SystemAccess>> {
        let url = if is_default { MOCK_DEFAULT_URL } else { url };
        if locked(&self.network.rejected_urls).contains(url) {
            return Err(TransportError::SystemAccess(format!(
                "can not reach discovery at {}",
                url
            )));
        }
        let access = Arc::new(MockSystemAccess {
            network: Arc::clone(&self.network),
            name: system_name.to_string(),
            url: url.to_string(),
        });
        locked(&self.accesses).insert(system_name.to_string(), Arc::clone(&access));
        Ok(access)
    }

    fn system_access(&self, system_name: &str) -> Option<Arc<dyn SystemAccess>> {
        locked(&self.accesses)
            .get(system_name)
            .map(|access| Arc::clone(access) as Arc<dyn SystemAccess>)
    }
}

/// Component factory standing in for a transport plugin.
pub struct MockComponentFactory {
    network: Arc<MockNetwork>,
    created: AtomicUsize,
}

impl MockComponentFactory {
    pub fn new(network: Arc<MockNetwork>) -> Self {
        Self {
            network,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of service buses handed out.
    pub fn buses_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ComponentFactory for MockComponentFactory {
    fn create_component(&self, iid: &str) -> Option<Arc<dyn ServiceBus>> {
        if iid != SERVICE_BUS_IID {
            return None;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Arc::new(MockServiceBus::new(Arc::clone(&self.network))))
    }
}
