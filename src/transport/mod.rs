//! Transport abstraction.
//!
//! The control plane never speaks a wire protocol itself. A transport plugin
//! provides a [`ServiceBus`]; from it the control plane obtains a
//! [`SystemAccess`] per system, and from that a [`Requester`] per participant
//! and [`ParticipantServer`]s for services the control plane hosts (the log
//! sink).
//!
//! Payloads are JSON-RPC 2.0 documents, see [`jsonrpc`].

pub mod jsonrpc;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Interface id every transport plugin must be able to create.
pub const SERVICE_BUS_IID: &str = "service_bus.simfleet.iid";

/// System name used to discover every system visible at a URL.
pub const DISCOVER_ALL_SYSTEMS: &str = "*";

/// URL value asking the transport to use its default discovery URL.
pub const USE_DEFAULT_URL: &str = "use_default_url";

/// Separator between participant and system name in all-systems discovery.
pub const PARTICIPANT_SYSTEM_SEPARATOR: char = '@';

/// Errors raised by a transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("participant {0} is unreachable")]
    Unreachable(String),

    #[error("request to {participant} timed out after {timeout:?}")]
    Timeout {
        participant: String,
        timeout: Duration,
    },

    #[error("system access error: {0}")]
    SystemAccess(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("discovery failed: {0}")]
    Discovery(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A participant found by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredParticipant {
    /// Participant name. For all-systems discovery this is
    /// `participant@system`.
    pub name: String,
    pub url: String,
}

impl DiscoveredParticipant {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Sends requests to one remote participant.
///
/// Implementations:
/// - Transport plugins
/// - `mock::MockRequester`: in-memory participants
#[async_trait]
pub trait Requester: Send + Sync {
    /// Send a JSON-RPC request to `service` and wait for its response.
    async fn send_request(
        &self,
        service: &str,
        request: &str,
        timeout: Duration,
    ) -> Result<String>;
}

/// A service hosted by the control plane and reachable by participants.
#[async_trait]
pub trait RpcService: Send + Sync {
    fn interface_id(&self) -> &str;

    /// Handle one JSON-RPC request document, returning the response document.
    async fn handle_request(&self, request: &str) -> String;
}

/// Server hosting control-plane services inside one system.
pub trait ParticipantServer: Send + Sync {
    fn name(&self) -> &str;

    /// Address participants use to reach this server.
    fn url(&self) -> &str;

    fn register_service(&self, service_name: &str, service: Arc<dyn RpcService>) -> Result<()>;

    fn unregister_service(&self, service_name: &str) -> Result<()>;
}

/// Access to one system over a transport.
#[async_trait]
pub trait SystemAccess: Send + Sync {
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    /// Enumerate the participants currently visible in this system.
    async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredParticipant>>;

    /// Requester for a participant, or `None` if the transport cannot
    /// address it.
    fn requester(&self, participant_name: &str) -> Option<Arc<dyn Requester>>;

    /// Create a server inside this system.
    async fn create_server(&self, server_name: &str) -> Result<Arc<dyn ParticipantServer>>;
}

/// Root transport component created by a plugin.
///
/// Implementations:
/// - Transport plugins loaded through `crate::plugin`
/// - `mock::MockServiceBus`: in-memory network
#[async_trait]
pub trait ServiceBus: Send + Sync {
    /// Create (or join) a system at `url`.
    async fn create_system_access(
        &self,
        system_name: &str,
        url: &str,
        is_default: bool,
    ) -> Result<Arc<dyn SystemAccess>>;

    /// Previously created system access.
    fn system_access(&self, system_name: &str) -> Option<Arc<dyn SystemAccess>>;
}

/// Whether a URL asks for the transport default.
pub fn is_default_url(url: &str) -> bool {
    url.is_empty() || url == USE_DEFAULT_URL
}
