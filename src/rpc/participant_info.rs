//! Participant info component: identity and the component directory.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::{InterfaceRegistration, Result, RpcClient, RpcInterface};
use crate::transport::jsonrpc::split_list;
use crate::transport::Requester;

/// Separator of component and interface lists on the wire.
const LIST_SEPARATOR: char = ';';

pub struct ParticipantInfoProxy {
    client: RpcClient,
}

impl RpcInterface for ParticipantInfoProxy {
    const IID: &'static str = "participant_info.v1";
    const DEFAULT_NAME: &'static str = "participant_info";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<ParticipantInfoProxy>() }

impl ParticipantInfoProxy {
    pub async fn name(&self) -> Result<String> {
        self.client.call_str("getName", json!({})).await
    }

    pub async fn system_name(&self) -> Result<String> {
        self.client.call_str("getSystemName", json!({})).await
    }

    /// Names of every component the participant exposes.
    pub async fn rpc_components(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getRPCServices", json!({})).await?;
        Ok(split_list(&list, LIST_SEPARATOR))
    }

    /// Interface ids implemented by one component.
    pub async fn rpc_component_iids(&self, component_name: &str) -> Result<Vec<String>> {
        let list = self
            .client
            .call_str(
                "getRPCServiceIIDs",
                json!({ "service_name": component_name }),
            )
            .await?;
        Ok(split_list(&list, LIST_SEPARATOR))
    }

    pub async fn rpc_component_interface_definition(
        &self,
        component_name: &str,
        iid: &str,
    ) -> Result<String> {
        self.client
            .call_str(
                "getRPCServiceInterfaceDefinition",
                json!({ "service_name": component_name, "service_iid": iid }),
            )
            .await
    }
}
