//! Client-side handle to one remote participant.
//!
//! A [`ParticipantProxy`] carries the local metadata of a participant
//! (priorities, additional info) and hands out typed proxies to its RPC
//! components. Clones share all state.

mod cache;

pub use cache::{ComponentDiscoveryCache, RpcComponentCache};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tracing::debug;

use crate::connection::Connection;
use crate::logging::{Severity, SystemLogger};
use crate::rpc::{
    self, AnyProxy, ClockProxy, ConfigurationProxy, DataRegistryProxy, LoggingServiceProxy,
    LoggingSinkServiceProxy, ParticipantInfoProxy, RpcComponent, RpcInterface,
    StateMachineProxy,
};
use crate::state::ParticipantState;
use crate::transport::Requester;

/// Errors raised by a participant proxy.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParticipantError {
    #[error("Participant {participant} is unreachable: {reason}")]
    Unreachable { participant: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ParticipantError>;

/// Interfaces connected without asking the participant which components it
/// has. They are what reachability itself is tested with.
const DIRECT_IIDS: [&str; 3] = [
    ParticipantInfoProxy::IID,
    StateMachineProxy::IID,
    LoggingSinkServiceProxy::IID,
];

/// Interfaces kept in a single-slot cache, with their default component name.
const CACHED_INTERFACES: [(&str, &str); 4] = [
    (ParticipantInfoProxy::IID, ParticipantInfoProxy::DEFAULT_NAME),
    (StateMachineProxy::IID, StateMachineProxy::DEFAULT_NAME),
    (ConfigurationProxy::IID, ConfigurationProxy::DEFAULT_NAME),
    (LoggingSinkServiceProxy::IID, LoggingSinkServiceProxy::DEFAULT_NAME),
];

fn cached_default_name(iid: &str) -> Option<&'static str> {
    CACHED_INTERFACES
        .iter()
        .find(|(cached, _)| *cached == iid)
        .map(|(_, name)| *name)
}

struct SinkRegistration {
    proxy: Arc<LoggingSinkServiceProxy>,
    url: String,
}

struct ParticipantInner {
    name: String,
    url: String,
    init_priority: AtomicI32,
    start_priority: AtomicI32,
    additional_info: RwLock<HashMap<String, String>>,
    default_timeout: Duration,
    connection: Connection,
    requester: Option<Arc<dyn Requester>>,
    logger: Arc<SystemLogger>,
    components: RpcComponentCache,
    discovery: ComponentDiscoveryCache,
    log_sink: Mutex<Option<SinkRegistration>>,
}

impl Drop for ParticipantInner {
    fn drop(&mut self) {
        let registration = self
            .log_sink
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(registration) = registration else {
            return;
        };
        let participant = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = registration.proxy.unregister_client(&registration.url).await {
                        debug!(participant = %participant, error = %e, "Log sink unregistration failed");
                    }
                });
            }
            Err(_) => {
                debug!(participant = %participant, "No runtime to unregister log sink");
            }
        }
    }
}

/// Shared handle to one participant of a system.
#[derive(Clone)]
pub struct ParticipantProxy {
    inner: Arc<ParticipantInner>,
}

impl ParticipantProxy {
    /// Connect to `name` through `connection`.
    ///
    /// Never fails: a participant the transport cannot address is still
    /// represented, and reads as unreachable. When it is addressable and the
    /// system's log sink runs, the sink is registered with the participant.
    pub async fn connect(
        name: impl Into<String>,
        url: impl Into<String>,
        connection: Connection,
        logger: Arc<SystemLogger>,
        default_timeout: Duration,
    ) -> Self {
        let name = name.into();
        let requester = connection.system_access().requester(&name);
        if requester.is_none() {
            debug!(system = %connection.system_name(), participant = %name, "No route to participant");
        }

        let proxy = Self {
            inner: Arc::new(ParticipantInner {
                name,
                url: url.into(),
                init_priority: AtomicI32::new(0),
                start_priority: AtomicI32::new(0),
                additional_info: RwLock::new(HashMap::new()),
                default_timeout,
                connection,
                requester,
                logger,
                components: RpcComponentCache::default(),
                discovery: ComponentDiscoveryCache::default(),
                log_sink: Mutex::new(None),
            }),
        };
        proxy.register_log_sink().await;
        proxy
    }

    async fn register_log_sink(&self) {
        let Some(url) = self.inner.logger.sink_url().await else {
            return;
        };
        let Some(sink) = self.direct::<LoggingSinkServiceProxy>().into_inner() else {
            return;
        };
        let severity = self.inner.logger.severity_level();
        match sink.register_client(&url, "", severity).await {
            Ok(()) => {
                debug!(participant = %self.inner.name, url = %url, "Log sink registered");
                *self
                    .inner
                    .log_sink
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) =
                    Some(SinkRegistration { proxy: sink, url });
            }
            Err(e) => {
                debug!(participant = %self.inner.name, error = %e, "Log sink registration failed");
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn system_name(&self) -> &str {
        self.inner.connection.system_name()
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Whether the transport can address this participant at all.
    pub fn is_addressable(&self) -> bool {
        self.inner.requester.is_some()
    }

    pub fn init_priority(&self) -> i32 {
        self.inner.init_priority.load(Ordering::SeqCst)
    }

    pub fn set_init_priority(&self, priority: i32) {
        self.inner.init_priority.store(priority, Ordering::SeqCst);
    }

    pub fn start_priority(&self) -> i32 {
        self.inner.start_priority.load(Ordering::SeqCst)
    }

    pub fn set_start_priority(&self, priority: i32) {
        self.inner.start_priority.store(priority, Ordering::SeqCst);
    }

    pub fn set_additional_info(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner
            .additional_info
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    pub fn additional_info(&self, key: &str) -> Option<String> {
        self.inner
            .additional_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copy priorities and additional info onto `other`.
    pub fn copy_values_to(&self, other: &ParticipantProxy) {
        other.set_init_priority(self.init_priority());
        other.set_start_priority(self.start_priority());
        let info = self
            .inner
            .additional_info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        *other
            .inner
            .additional_info
            .write()
            .unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Whether both handles refer to the same participant.
    pub fn ptr_eq(a: &ParticipantProxy, b: &ParticipantProxy) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Cached proxy for an interface connected without discovery.
    fn direct<T: RpcInterface>(&self) -> RpcComponent<T> {
        if let Some(proxy) = self.inner.components.get(T::IID) {
            return RpcComponent::from_any(Some(proxy));
        }
        let Some(requester) = &self.inner.requester else {
            return RpcComponent::empty();
        };
        let proxy: AnyProxy = Arc::new(T::connect(
            T::DEFAULT_NAME,
            Arc::clone(requester),
            self.inner.default_timeout,
        ));
        self.inner.components.insert(T::IID, Arc::clone(&proxy));
        RpcComponent::from_any(Some(proxy))
    }

    /// State machine of the participant, empty if it cannot be addressed.
    pub fn state_machine(&self) -> RpcComponent<StateMachineProxy> {
        self.direct()
    }

    pub fn participant_info(&self) -> RpcComponent<ParticipantInfoProxy> {
        self.direct()
    }

    /// Current state, `Unreachable` without a state machine.
    pub async fn state(&self, timeout: Duration) -> ParticipantState {
        match self.state_machine().get() {
            Some(sm) => sm.state(timeout).await,
            None => ParticipantState::Unreachable,
        }
    }

    /// State the discovery cache is keyed on: `Undefined` without a state
    /// machine.
    async fn discovery_state(&self) -> ParticipantState {
        match self.state_machine().get() {
            Some(sm) => sm.state(self.inner.default_timeout).await,
            None => ParticipantState::Undefined,
        }
    }

    fn unreachable(&self, reason: impl Into<String>) -> ParticipantError {
        let err = ParticipantError::Unreachable {
            participant: self.inner.name.clone(),
            reason: reason.into(),
        };
        self.inner.logger.log(
            Severity::Fatal,
            &self.inner.name,
            self.system_name(),
            &err.to_string(),
        );
        err
    }

    /// Names of the components implementing `iid`.
    ///
    /// Fails when the participant cannot be asked, which is distinct from
    /// an empty answer.
    pub async fn components_supporting(&self, iid: &str) -> Result<Vec<String>> {
        let info = self.participant_info();
        let Some(info) = info.get() else {
            return Err(self.unreachable("no transport route"));
        };
        let state = self.discovery_state().await;
        self.inner
            .discovery
            .components_supporting(info, iid, state)
            .await
            .map_err(|e| self.unreachable(e.to_string()))
    }

    /// Proxy for component `component_name` implementing `iid`.
    ///
    /// `Ok(None)` when the component does not exist, does not implement the
    /// interface, or no proxy is registered for it.
    pub async fn rpc_component_proxy(
        &self,
        component_name: &str,
        iid: &str,
    ) -> Result<Option<AnyProxy>> {
        if !DIRECT_IIDS.iter().any(|direct| *direct == iid) {
            let names = self.components_supporting(iid).await?;
            if !names.iter().any(|name| name == component_name) {
                debug!(participant = %self.inner.name, component = %component_name, iid = %iid, "Component does not support interface");
                return Ok(None);
            }
        }
        Ok(self.inner.requester.as_ref().and_then(|requester| {
            rpc::create_proxy(
                iid,
                component_name,
                Arc::clone(requester),
                self.inner.default_timeout,
            )
        }))
    }

    /// Proxy for the first component implementing `iid`.
    pub async fn rpc_component_proxy_by_iid(&self, iid: &str) -> Result<Option<AnyProxy>> {
        if let Some(proxy) = self.inner.components.get(iid) {
            return Ok(Some(proxy));
        }
        if let Some(default_name) = cached_default_name(iid) {
            if let Some(proxy) = self.rpc_component_proxy(default_name, iid).await? {
                self.inner.components.insert(iid, Arc::clone(&proxy));
                return Ok(Some(proxy));
            }
        }
        let names = self.components_supporting(iid).await?;
        match names.first() {
            Some(name) => self.rpc_component_proxy(name, iid).await,
            None => Ok(None),
        }
    }

    /// Typed proxy for the first component implementing `T`.
    pub async fn component<T: RpcInterface>(&self) -> Result<RpcComponent<T>> {
        Ok(RpcComponent::from_any(
            self.rpc_component_proxy_by_iid(T::IID).await?,
        ))
    }

    pub async fn configuration(&self) -> Result<RpcComponent<ConfigurationProxy>> {
        self.component().await
    }

    pub async fn clock(&self) -> Result<RpcComponent<ClockProxy>> {
        self.component().await
    }

    pub async fn data_registry(&self) -> Result<RpcComponent<DataRegistryProxy>> {
        self.component().await
    }

    pub async fn logging_service(&self) -> Result<RpcComponent<LoggingServiceProxy>> {
        self.component().await
    }

    /// URL of the log sink registered with the participant, if any.
    pub fn log_sink_url(&self) -> Option<String> {
        self.inner
            .log_sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|registration| registration.url.clone())
    }
}

impl std::fmt::Debug for ParticipantProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticipantProxy")
            .field("name", &self.inner.name)
            .field("url", &self.inner.url)
            .field("init_priority", &self.init_priority())
            .field("start_priority", &self.start_priority())
            .finish()
    }
}
