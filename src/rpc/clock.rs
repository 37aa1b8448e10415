//! Clock service component.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::{InterfaceRegistration, Result, RpcClient, RpcError, RpcInterface};
use crate::transport::jsonrpc::split_list;
use crate::transport::Requester;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockType {
    Continuous,
    Discrete,
}

pub struct ClockProxy {
    client: RpcClient,
}

impl RpcInterface for ClockProxy {
    const IID: &'static str = "clock_service.v1";
    const DEFAULT_NAME: &'static str = "clock_service";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<ClockProxy>() }

impl ClockProxy {
    pub async fn clock_names(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getClockNames", json!({})).await?;
        Ok(split_list(&list, ','))
    }

    pub async fn main_clock_name(&self) -> Result<String> {
        self.client.call_str("getMainClockName", json!({})).await
    }

    /// Current time of `clock_name` in nanoseconds. An empty name asks for
    /// the main clock.
    pub async fn time(&self, clock_name: &str) -> Result<i64> {
        let raw = self
            .client
            .call_str("getTime", json!({ "clock_name": clock_name }))
            .await?;
        let time: i64 = raw.trim().parse().map_err(|_| RpcError::Decode {
            method: "getTime".to_string(),
            reason: format!("not a time value: {}", raw),
        })?;
        if time < 0 {
            return Err(RpcError::Remote {
                code: time as i32,
                message: format!("clock {} has no time", clock_name),
            });
        }
        Ok(time)
    }

    pub async fn clock_type(&self, clock_name: &str) -> Result<ClockType> {
        match self
            .client
            .call_i64("getType", json!({ "clock_name": clock_name }))
            .await?
        {
            0 => Ok(ClockType::Continuous),
            1 => Ok(ClockType::Discrete),
            other => Err(RpcError::Decode {
                method: "getType".to_string(),
                reason: format!("unknown clock type {}", other),
            }),
        }
    }
}
