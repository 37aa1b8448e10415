//! Logging service and logging sink service components.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::{InterfaceRegistration, PropertyValue, Result, RpcClient, RpcError, RpcInterface};
use crate::logging::Severity;
use crate::transport::jsonrpc::split_list;
use crate::transport::Requester;

/// Sinks a logger writes to and the minimum severity it emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerFilter {
    pub enabled_sinks: Vec<String>,
    pub severity: Severity,
}

/// Non-zero status codes are failures.
fn check_status(method: &str, code: i64) -> Result<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(RpcError::Remote {
            code: code as i32,
            message: format!("{} returned {}", method, code),
        })
    }
}

/// Participant-side logger configuration.
pub struct LoggingServiceProxy {
    client: RpcClient,
}

impl RpcInterface for LoggingServiceProxy {
    const IID: &'static str = "logging_service.v1";
    const DEFAULT_NAME: &'static str = "logging_service";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<LoggingServiceProxy>() }

impl LoggingServiceProxy {
    pub async fn set_logger_filter(&self, logger_name: &str, filter: &LoggerFilter) -> Result<()> {
        let code = self
            .client
            .call_i64(
                "setLoggerFilter",
                json!({
                    "enable_sinks": filter.enabled_sinks.join(","),
                    "logger_name": logger_name,
                    "severity": filter.severity.as_i32(),
                }),
            )
            .await?;
        check_status("setLoggerFilter", code)
    }

    pub async fn logger_filter(&self, logger_name: &str) -> Result<LoggerFilter> {
        let answer = self
            .client
            .call("getLoggerFilter", json!({ "logger_name": logger_name }))
            .await?;
        let sinks = answer
            .get("enable_sinks")
            .and_then(Value::as_str)
            .unwrap_or("");
        let severity = answer
            .get("severity")
            .and_then(Value::as_i64)
            .and_then(|s| Severity::from_i32(s as i32))
            .ok_or_else(|| RpcError::Decode {
                method: "getLoggerFilter".to_string(),
                reason: format!("invalid severity in {}", answer),
            })?;
        Ok(LoggerFilter {
            enabled_sinks: split_list(sinks, ','),
            severity,
        })
    }

    pub async fn loggers(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getLoggers", json!({})).await?;
        Ok(split_list(&list, ','))
    }

    pub async fn sinks(&self) -> Result<Vec<String>> {
        let list = self.client.call_str("getSinks", json!({})).await?;
        Ok(split_list(&list, ','))
    }

    pub async fn set_sink_property(
        &self,
        sink_name: &str,
        property_name: &str,
        type_name: &str,
        value: &str,
    ) -> Result<()> {
        let code = self
            .client
            .call_i64(
                "setSinkProperty",
                json!({
                    "property_name": property_name,
                    "sink_name": sink_name,
                    "type": type_name,
                    "value": value,
                }),
            )
            .await?;
        check_status("setSinkProperty", code)
    }

    /// A sink property, `None` if the sink does not have it.
    pub async fn sink_property(
        &self,
        sink_name: &str,
        property_name: &str,
    ) -> Result<Option<PropertyValue>> {
        let answer = self
            .client
            .call(
                "getSinkProperty",
                json!({ "property_name": property_name, "sink_name": sink_name }),
            )
            .await?;
        let field = |key: &str| answer.get(key).and_then(Value::as_str).unwrap_or("");
        if field("type").is_empty() {
            return Ok(None);
        }
        Ok(Some(PropertyValue::new(field("type"), field("value"))))
    }

    pub async fn sink_property_names(&self, sink_name: &str) -> Result<Vec<String>> {
        let list = self
            .client
            .call_str("getSinkProperties", json!({ "sink_name": sink_name }))
            .await?;
        Ok(split_list(&list, ','))
    }
}

/// Participant-side registry of remote log receivers.
pub struct LoggingSinkServiceProxy {
    client: RpcClient,
}

impl RpcInterface for LoggingSinkServiceProxy {
    const IID: &'static str = "logging_sink_service.v1";
    const DEFAULT_NAME: &'static str = "logging_sink_service";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<LoggingSinkServiceProxy>() }

impl LoggingSinkServiceProxy {
    /// Ask the participant to forward its logs to the server at `url`.
    pub async fn register_client(
        &self,
        url: &str,
        logger_filter: &str,
        severity: Severity,
    ) -> Result<()> {
        let code = self
            .client
            .call_i64(
                "registerRPCLoggingSinkClient",
                json!({
                    "address": url,
                    "logger_name_filter": logger_filter,
                    "severity": severity.as_i32(),
                }),
            )
            .await?;
        check_status("registerRPCLoggingSinkClient", code)
    }

    pub async fn unregister_client(&self, url: &str) -> Result<()> {
        let code = self
            .client
            .call_i64(
                "unregisterRPCLoggingSinkClient",
                json!({ "address": url }),
            )
            .await?;
        check_status("unregisterRPCLoggingSinkClient", code)
    }
}
