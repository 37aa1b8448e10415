//! Proxies to the RPC components a participant exposes.
//!
//! Each proxy wraps an [`RpcClient`] addressing one named component and
//! implements [`RpcInterface`]. Proxies register themselves with
//! `inventory`, so the interface id to proxy mapping is assembled at startup
//! instead of being spelled out in one place.

pub mod clock;
pub mod configuration;
pub mod data_registry;
pub mod logging;
pub mod participant_info;
pub mod state_machine;

pub use clock::{ClockProxy, ClockType};
pub use configuration::{property_type, ConfigurationProxy, PropertyValue, RemoteProperties};
pub use data_registry::{DataRegistryProxy, StreamType, StreamTypeProperty};
pub use logging::{LoggerFilter, LoggingServiceProxy, LoggingSinkServiceProxy};
pub use participant_info::ParticipantInfoProxy;
pub use state_machine::{StateMachineProxy, TransitionError};

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::transport::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{Requester, TransportError};

/// Errors from calling a remote component.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{method} on {component} timed out after {timeout:?}")]
    Timeout {
        component: String,
        method: String,
        timeout: Duration,
    },

    #[error("remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("malformed response to {method}: {reason}")]
    Decode { method: String, reason: String },

    #[error("property node {0} does not exist")]
    NoSuchNode(String),
}

pub type Result<T> = std::result::Result<T, RpcError>;

/// A typed proxy to one kind of remote component.
pub trait RpcInterface: Send + Sync + Sized + 'static {
    /// Interface id the remote component reports.
    const IID: &'static str;
    /// Component name participants expose the interface under.
    const DEFAULT_NAME: &'static str;

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self;
}

/// Type-erased proxy, as produced by the interface registry.
pub type AnyProxy = Arc<dyn Any + Send + Sync>;

type ProxyConstructor = fn(&str, Arc<dyn Requester>, Duration) -> AnyProxy;

/// Registry entry for one interface.
pub struct InterfaceRegistration {
    pub iid: &'static str,
    pub default_name: &'static str,
    create: ProxyConstructor,
}

impl InterfaceRegistration {
    pub const fn of<T: RpcInterface>() -> Self {
        Self {
            iid: T::IID,
            default_name: T::DEFAULT_NAME,
            create: construct::<T>,
        }
    }
}

fn construct<T: RpcInterface>(
    component_name: &str,
    requester: Arc<dyn Requester>,
    timeout: Duration,
) -> AnyProxy {
    Arc::new(T::connect(component_name, requester, timeout))
}

inventory::collect!(InterfaceRegistration);

static REGISTRY: LazyLock<HashMap<&'static str, &'static InterfaceRegistration>> =
    LazyLock::new(|| {
        inventory::iter::<InterfaceRegistration>
            .into_iter()
            .map(|registration| (registration.iid, registration))
            .collect()
    });

pub fn registration(iid: &str) -> Option<&'static InterfaceRegistration> {
    REGISTRY.get(iid).copied()
}

/// Interface ids with a registered proxy.
pub fn registered_interfaces() -> Vec<&'static str> {
    let mut iids: Vec<_> = REGISTRY.keys().copied().collect();
    iids.sort_unstable();
    iids
}

/// Build the proxy registered for `iid`, or `None` if no proxy is known.
pub fn create_proxy(
    iid: &str,
    component_name: &str,
    requester: Arc<dyn Requester>,
    timeout: Duration,
) -> Option<AnyProxy> {
    let registration = registration(iid)?;
    debug!(iid = %iid, component = %component_name, "Creating RPC proxy");
    Some((registration.create)(component_name, requester, timeout))
}

/// Capability handle: a shared proxy, or nothing when the component is
/// unreachable or unsupported.
pub struct RpcComponent<T> {
    proxy: Option<Arc<T>>,
}

impl<T: Send + Sync + 'static> RpcComponent<T> {
    pub fn new(proxy: Arc<T>) -> Self {
        Self { proxy: Some(proxy) }
    }

    pub fn empty() -> Self {
        Self { proxy: None }
    }

    /// Downcast a registry proxy. A proxy of another type yields an empty handle.
    pub fn from_any(proxy: Option<AnyProxy>) -> Self {
        Self {
            proxy: proxy.and_then(|p| p.downcast::<T>().ok()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn get(&self) -> Option<&T> {
        self.proxy.as_deref()
    }

    pub fn into_inner(self) -> Option<Arc<T>> {
        self.proxy
    }
}

impl<T> std::fmt::Debug for RpcComponent<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcComponent")
            .field("connected", &self.proxy.is_some())
            .finish()
    }
}

impl<T> Clone for RpcComponent<T> {
    fn clone(&self) -> Self {
        Self {
            proxy: self.proxy.clone(),
        }
    }
}

impl<T> Default for RpcComponent<T> {
    fn default() -> Self {
        Self { proxy: None }
    }
}

/// JSON-RPC client bound to one remote component.
pub struct RpcClient {
    component_name: String,
    requester: Arc<dyn Requester>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(
        component_name: impl Into<String>,
        requester: Arc<dyn Requester>,
        timeout: Duration,
    ) -> Self {
        Self {
            component_name: component_name.into(),
            requester,
            timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// Default timeout for calls without an explicit one.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.call_with_timeout(method, params, self.timeout).await
    }

    /// Call `method`, bounding the round trip by `timeout`.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| self.decode_error(method, e))?;

        let response = tokio::time::timeout(
            timeout,
            self.requester
                .send_request(&self.component_name, &request, timeout),
        )
        .await
        .map_err(|_| RpcError::Timeout {
            component: self.component_name.clone(),
            method: method.to_string(),
            timeout,
        })??;

        let response: JsonRpcResponse =
            serde_json::from_str(&response).map_err(|e| self.decode_error(method, e))?;
        if let Some(error) = response.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| RpcError::Decode {
            method: method.to_string(),
            reason: "response carries neither result nor error".to_string(),
        })
    }

    pub async fn call_str(&self, method: &str, params: Value) -> Result<String> {
        let value = self.call(method, params).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.unexpected(method, "a string", &value))
    }

    pub async fn call_i64(&self, method: &str, params: Value) -> Result<i64> {
        let value = self.call(method, params).await?;
        value
            .as_i64()
            .ok_or_else(|| self.unexpected(method, "an integer", &value))
    }

    fn decode_error(&self, method: &str, err: serde_json::Error) -> RpcError {
        RpcError::Decode {
            method: method.to_string(),
            reason: err.to_string(),
        }
    }

    fn unexpected(&self, method: &str, expected: &str, got: &Value) -> RpcError {
        RpcError::Decode {
            method: method.to_string(),
            reason: format!("expected {}, got {}", expected, got),
        }
    }
}
