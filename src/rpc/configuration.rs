//! Configuration component: remote property trees.
//!
//! A participant's configuration is a tree of typed properties addressed by
//! `/`-separated paths (`clock/main_clock`). [`ConfigurationProxy::properties`]
//! opens one node; [`RemoteProperties`] reads and writes the properties
//! directly below it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{InterfaceRegistration, Result, RpcClient, RpcError, RpcInterface};
use crate::transport::jsonrpc::split_list;
use crate::transport::Requester;

/// Type names understood by participants.
pub mod property_type {
    pub const STRING: &str = "string";
    pub const BOOL: &str = "bool";
    pub const INT32: &str = "int32";
    pub const INT64: &str = "int64";
    pub const DOUBLE: &str = "double";
}

/// Value and type name of a property.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyValue {
    pub type_name: String,
    pub value: String,
}

impl PropertyValue {
    pub fn new(type_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: value.into(),
        }
    }
}

/// Whether `path` is made of `[A-Za-z0-9_]` segments separated by single `/`.
///
/// A leading and a trailing `/` are allowed. `.` is not a separator.
pub fn is_valid_property_path(path: &str) -> bool {
    path.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
        && !path.contains("//")
}

/// Node paths always start and end with `/`.
fn normalize_node_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

pub struct ConfigurationProxy {
    client: Arc<RpcClient>,
}

impl RpcInterface for ConfigurationProxy {
    const IID: &'static str = "configuration.v1";
    const DEFAULT_NAME: &'static str = "configuration_service";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: Arc::new(RpcClient::new(component_name, requester, timeout)),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<ConfigurationProxy>() }

impl ConfigurationProxy {
    /// Open the node at `path`.
    ///
    /// Fails with [`RpcError::NoSuchNode`] when the participant has no such
    /// node, and with the call's error when the participant cannot be asked.
    pub async fn properties(&self, path: &str) -> Result<RemoteProperties> {
        let node = normalize_node_path(path);
        let exists = self
            .client
            .call("exists", json!({ "property_path": node }))
            .await?;
        if exists != Value::Bool(true) {
            debug!(component = %self.client.component_name(), node = %node, "Property node missing");
            return Err(RpcError::NoSuchNode(node));
        }
        Ok(RemoteProperties {
            node,
            client: Arc::clone(&self.client),
        })
    }
}

/// Properties directly below one remote node.
///
/// Accessors return plain values; a failed or rejected call reads as
/// `false` or an empty string.
pub struct RemoteProperties {
    node: String,
    client: Arc<RpcClient>,
}

impl RemoteProperties {
    pub fn node(&self) -> &str {
        &self.node
    }

    fn full_path(&self, name: &str) -> String {
        format!("{}{}", self.node, name.trim_matches('/'))
    }

    /// Set a property. Invalid paths are rejected without a remote call.
    pub async fn set_property(&self, name: &str, value: &str, type_name: &str) -> bool {
        let path = self.full_path(name);
        if !is_valid_property_path(&path) {
            warn!(path = %path, "Invalid property path, use '/' as separator");
            return false;
        }
        match self
            .client
            .call_i64(
                "setProperty",
                json!({ "property_path": path, "type": type_name, "value": value }),
            )
            .await
        {
            Ok(code) => code == 0,
            Err(e) => {
                debug!(path = %path, error = %e, "setProperty failed");
                false
            }
        }
    }

    /// Value and type of a property, `None` if it does not exist or cannot
    /// be read.
    pub async fn property(&self, name: &str) -> Option<PropertyValue> {
        let path = self.full_path(name);
        if !is_valid_property_path(&path) {
            warn!(path = %path, "Invalid property path, use '/' as separator");
            return None;
        }
        let answer = match self
            .client
            .call("getProperty", json!({ "property_path": path }))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                debug!(path = %path, error = %e, "getProperty failed");
                return None;
            }
        };
        let field = |key: &str| answer.get(key).and_then(Value::as_str).unwrap_or("");
        let type_name = field("type");
        if type_name.is_empty() {
            return None;
        }
        Some(PropertyValue::new(type_name, field("value")))
    }

    /// Property value, empty if it does not exist.
    pub async fn get_property(&self, name: &str) -> String {
        self.property(name)
            .await
            .map(|p| p.value)
            .unwrap_or_default()
    }

    /// Property type name, empty if it does not exist.
    pub async fn get_property_type(&self, name: &str) -> String {
        self.property(name)
            .await
            .map(|p| p.type_name)
            .unwrap_or_default()
    }

    /// Names of the properties directly below the node.
    pub async fn property_names(&self) -> Vec<String> {
        match self
            .client
            .call_str("getProperties", json!({ "property_path": self.node }))
            .await
        {
            Ok(list) => split_list(&list, ','),
            Err(e) => {
                debug!(node = %self.node, error = %e, "getProperties failed");
                Vec::new()
            }
        }
    }
}
