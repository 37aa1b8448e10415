//! Per-system logger and the log sink participants forward to.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{EventMonitor, LogEvent, Severity};
use crate::transport::jsonrpc::{self, JsonRpcError, JsonRpcResponse};
use crate::transport::{self, ParticipantServer, RpcService, SystemAccess};

/// Service name under which the log sink is hosted.
pub const LOG_SINK_CLIENT_SERVICE: &str = "logging_sink_client";

const LOG_SINK_CLIENT_IID: &str = "logging_sink_client.v1";

struct SinkRegistration {
    server: Arc<dyn ParticipantServer>,
}

/// Logger of one system.
///
/// Holds the system's monitor slot and severity filter. Every event is
/// mirrored to `tracing` regardless of the filter.
pub struct SystemLogger {
    system_name: String,
    monitor: RwLock<Option<Arc<dyn EventMonitor>>>,
    level: RwLock<Severity>,
    sink: Mutex<Option<SinkRegistration>>,
}

impl SystemLogger {
    pub fn new(system_name: impl Into<String>, level: Severity) -> Self {
        Self {
            system_name: system_name.into(),
            monitor: RwLock::new(None),
            level: RwLock::new(level),
            sink: Mutex::new(None),
        }
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    /// Register the monitor, replacing any previous one.
    pub fn register_monitor(&self, monitor: Arc<dyn EventMonitor>) {
        *self.monitor.write().unwrap_or_else(PoisonError::into_inner) = Some(monitor);
    }

    /// Remove `monitor` if it is the registered one. Another registered
    /// monitor stays in place.
    pub fn unregister_monitor(&self, monitor: Arc<dyn EventMonitor>) -> bool {
        let mut slot = self.monitor.write().unwrap_or_else(PoisonError::into_inner);
        let registered = slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &monitor));
        if registered {
            *slot = None;
        }
        registered
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set_severity_level(&self, level: Severity) {
        *self.level.write().unwrap_or_else(PoisonError::into_inner) = level;
    }

    pub fn severity_level(&self) -> Severity {
        *self.level.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log a message stamped with the current time.
    pub fn log(&self, severity: Severity, participant_name: &str, logger_name: &str, message: &str) {
        self.dispatch(LogEvent {
            timestamp: Utc::now(),
            severity,
            participant_name: participant_name.to_string(),
            logger_name: logger_name.to_string(),
            message: message.to_string(),
        });
    }

    /// Log a control-plane message under the system's own logger name.
    pub fn system_log(&self, severity: Severity, message: &str) {
        self.log(severity, "", &self.system_name, message);
    }

    /// Log `err` and hand it back so the caller can return it.
    pub fn raise<E: std::fmt::Display>(&self, severity: Severity, err: E) -> E {
        self.system_log(severity, &err.to_string());
        err
    }

    /// Mirror an event to tracing, then deliver it to the monitor.
    pub fn dispatch(&self, event: LogEvent) {
        trace_event(&self.system_name, &event);

        if !self.severity_level().allows(event.severity) {
            return;
        }
        // Cloned out of the lock so the monitor can log re-entrantly.
        let monitor = self
            .monitor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(monitor) = monitor {
            monitor.on_log(&event);
        }
    }

    /// Host the log sink inside the system and return its URL.
    ///
    /// Participants push their logs to this URL once registered with their
    /// logging sink service. Calling again returns the existing URL.
    pub async fn start_log_sink(
        self: &Arc<Self>,
        access: &dyn SystemAccess,
    ) -> transport::Result<String> {
        let mut sink = self.sink.lock().await;
        if let Some(registration) = sink.as_ref() {
            return Ok(registration.server.url().to_string());
        }

        let server_name = format!("system_{}_{}", self.system_name, Uuid::new_v4().simple());
        let server = access.create_server(&server_name).await?;
        server.register_service(
            LOG_SINK_CLIENT_SERVICE,
            Arc::new(LogSinkService::new(Arc::downgrade(self))),
        )?;

        let url = server.url().to_string();
        info!(system = %self.system_name, url = %url, "Log sink started");
        *sink = Some(SinkRegistration { server });
        Ok(url)
    }

    /// URL of the log sink, if started.
    pub async fn sink_url(&self) -> Option<String> {
        self.sink
            .lock()
            .await
            .as_ref()
            .map(|registration| registration.server.url().to_string())
    }
}

impl Drop for SystemLogger {
    fn drop(&mut self) {
        if let Some(registration) = self.sink.get_mut().take() {
            if let Err(e) = registration
                .server
                .unregister_service(LOG_SINK_CLIENT_SERVICE)
            {
                debug!(system = %self.system_name, error = %e, "Log sink already gone");
            }
        }
    }
}

fn trace_event(system: &str, event: &LogEvent) {
    let participant = event.participant_name.as_str();
    let logger = event.logger_name.as_str();
    let message = event.message.as_str();
    match event.severity {
        Severity::Fatal | Severity::Error => {
            error!(system = %system, participant = %participant, logger = %logger, "{}", message)
        }
        Severity::Warning => {
            warn!(system = %system, participant = %participant, logger = %logger, "{}", message)
        }
        Severity::Info => {
            info!(system = %system, participant = %participant, logger = %logger, "{}", message)
        }
        Severity::Debug => {
            debug!(system = %system, participant = %participant, logger = %logger, "{}", message)
        }
        Severity::Off => {}
    }
}

/// Remote timestamps arrive as nanoseconds since the epoch or RFC 3339.
fn parse_remote_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(nanos) = raw.trim().parse::<i64>() {
        return DateTime::from_timestamp_nanos(nanos);
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// RPC service receiving participant logs (`onLog`).
pub struct LogSinkService {
    logger: Weak<SystemLogger>,
}

impl LogSinkService {
    pub fn new(logger: Weak<SystemLogger>) -> Self {
        Self { logger }
    }

    fn on_log(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let field = |name: &str| {
            params
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let severity = params
            .get("severity")
            .and_then(Value::as_i64)
            .and_then(|s| Severity::from_i32(s as i32))
            .ok_or_else(|| JsonRpcError::invalid_params("severity must be 0..=5"))?;

        if let Some(logger) = self.logger.upgrade() {
            logger.dispatch(LogEvent {
                timestamp: parse_remote_timestamp(&field("timestamp")),
                severity,
                participant_name: field("participant"),
                logger_name: field("logger_name"),
                message: field("description"),
            });
        }
        Ok(json!(0))
    }
}

#[async_trait]
impl RpcService for LogSinkService {
    fn interface_id(&self) -> &str {
        LOG_SINK_CLIENT_IID
    }

    async fn handle_request(&self, request: &str) -> String {
        let request = match jsonrpc::parse_request(request) {
            Ok(request) => request,
            Err(response) => return response.to_wire(),
        };
        let outcome = match request.method.as_str() {
            "onLog" => self.on_log(&request.params),
            other => Err(JsonRpcError::method_not_found(other)),
        };
        match outcome {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(e) => JsonRpcResponse::error(request.id, e),
        }
        .to_wire()
    }
}
