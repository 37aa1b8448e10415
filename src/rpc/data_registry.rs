//! Data registry component: signals a participant reads and writes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{InterfaceRegistration, Result, RpcClient, RpcInterface};
use crate::transport::jsonrpc::split_list;
use crate::transport::Requester;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTypeProperty {
    pub name: String,
    pub value: String,
    pub type_name: String,
}

/// Stream type of a signal: a meta type name plus typed properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamType {
    pub meta_type: String,
    pub properties: Vec<StreamTypeProperty>,
}

pub struct DataRegistryProxy {
    client: RpcClient,
}

impl RpcInterface for DataRegistryProxy {
    const IID: &'static str = "data_registry.v1";
    const DEFAULT_NAME: &'static str = "data_registry";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<DataRegistryProxy>() }

impl DataRegistryProxy {
    pub async fn signal_in_names(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getSignalInNames", json!({})).await?;
        Ok(split_list(&list, ','))
    }

    pub async fn signal_out_names(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getSignalOutNames", json!({})).await?;
        Ok(split_list(&list, ','))
    }

    pub async fn stream_type(&self, signal_name: &str) -> Result<StreamType> {
        let answer = self
            .client
            .call("getStreamType", json!({ "signal_name": signal_name }))
            .await?;

        let list = |key: &str| {
            let raw = answer
                .get("properties")
                .and_then(|p| p.get(key))
                .and_then(Value::as_str)
                .unwrap_or("");
            split_list(raw, ',')
        };
        let properties = list("names")
            .into_iter()
            .zip(list("values"))
            .zip(list("types"))
            .map(|((name, value), type_name)| StreamTypeProperty {
                name,
                value,
                type_name,
            })
            .collect();

        Ok(StreamType {
            meta_type: answer
                .get("meta_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            properties,
        })
    }
}
