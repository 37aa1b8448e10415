//! In-memory participant answering the standard component requests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

use crate::rpc::{
    ClockProxy, ConfigurationProxy, DataRegistryProxy, LoggingServiceProxy,
    LoggingSinkServiceProxy, ParticipantInfoProxy, PropertyValue, RpcInterface,
    StateMachineProxy,
};
use crate::state::ParticipantState;
use crate::transport::jsonrpc::{JsonRpcError, JsonRpcRequest};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn component<T: RpcInterface>() -> (String, String) {
    (T::DEFAULT_NAME.to_string(), T::IID.to_string())
}

/// Properties every fake participant starts with.
fn default_properties() -> BTreeMap<String, PropertyValue> {
    [
        ("clock/main_clock", "string", "local_system_realtime"),
        ("clock/time_factor", "double", "1.0"),
        ("clock/step_size", "int32", "100"),
        ("clock/time_update_timeout", "int32", "5000"),
        ("clock_synchronization/timing_master", "string", ""),
        ("clock_synchronization/sync_cycle_time", "int32", "100"),
        ("scheduling/scheduler", "string", "clock_based_scheduler"),
    ]
    .into_iter()
    .map(|(path, type_name, value)| (path.to_string(), PropertyValue::new(type_name, value)))
    .collect()
}

#[derive(Debug, Clone)]
struct StreamTypeEntry {
    meta_type: String,
    properties: Vec<(String, String, String)>,
}

#[derive(Debug, Clone)]
struct LoggerEntry {
    sinks: Vec<String>,
    severity: i64,
}

/// A fake participant.
///
/// Built with the `with_*` methods, then added to a
/// [`MockNetwork`](super::MockNetwork). It exposes a state machine, a
/// configuration tree seeded with the timing properties, two clocks, a data
/// registry and logging services.
pub struct MockParticipant {
    name: String,
    system_name: String,
    url: String,
    state: Mutex<ParticipantState>,
    reachable: AtomicBool,
    delay_ms: AtomicU64,
    components: Mutex<Vec<(String, String)>>,
    properties: Mutex<BTreeMap<String, PropertyValue>>,
    failures: Mutex<HashMap<String, String>>,
    denials: Mutex<HashSet<String>>,
    clocks: Mutex<Vec<(String, i64)>>,
    time: AtomicI64,
    signals_in: Mutex<Vec<String>>,
    signals_out: Mutex<Vec<String>>,
    stream_types: Mutex<HashMap<String, StreamTypeEntry>>,
    loggers: Mutex<BTreeMap<String, LoggerEntry>>,
    sinks: Mutex<BTreeMap<String, BTreeMap<String, PropertyValue>>>,
    sink_clients: Mutex<Vec<String>>,
}

impl MockParticipant {
    pub fn new(name: impl Into<String>, system_name: impl Into<String>) -> Self {
        let name = name.into();
        let system_name = system_name.into();
        let url = format!("mock://{}/{}", system_name, name);

        let components = vec![
            component::<ParticipantInfoProxy>(),
            component::<StateMachineProxy>(),
            component::<ConfigurationProxy>(),
            component::<ClockProxy>(),
            component::<DataRegistryProxy>(),
            component::<LoggingServiceProxy>(),
            component::<LoggingSinkServiceProxy>(),
        ];

        let mut sinks = BTreeMap::new();
        sinks.insert(
            "console".to_string(),
            BTreeMap::from([(
                "enable_colors".to_string(),
                PropertyValue::new("bool", "false"),
            )]),
        );
        sinks.insert(
            "file".to_string(),
            BTreeMap::from([("file_path".to_string(), PropertyValue::new("string", ""))]),
        );
        sinks.insert("rpc".to_string(), BTreeMap::new());

        Self {
            name,
            system_name,
            url,
            state: Mutex::new(ParticipantState::Unloaded),
            reachable: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
            components: Mutex::new(components),
            properties: Mutex::new(default_properties()),
            failures: Mutex::new(HashMap::new()),
            denials: Mutex::new(HashSet::new()),
            clocks: Mutex::new(vec![
                ("local_system_realtime".to_string(), 0),
                ("local_system_simtime".to_string(), 1),
            ]),
            time: AtomicI64::new(0),
            signals_in: Mutex::new(Vec::new()),
            signals_out: Mutex::new(Vec::new()),
            stream_types: Mutex::new(HashMap::new()),
            loggers: Mutex::new(BTreeMap::new()),
            sinks: Mutex::new(sinks),
            sink_clients: Mutex::new(Vec::new()),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_state(self, state: ParticipantState) -> Self {
        *locked(&self.state) = state;
        self
    }

    /// Remove the state machine component.
    pub fn without_state_machine(self) -> Self {
        self.without_component(StateMachineProxy::DEFAULT_NAME)
    }

    pub fn without_component(self, component_name: &str) -> Self {
        locked(&self.components).retain(|(name, _)| name != component_name);
        self
    }

    /// Expose an extra component.
    pub fn with_component(self, component_name: &str, iid: &str) -> Self {
        locked(&self.components).push((component_name.to_string(), iid.to_string()));
        self
    }

    pub fn with_property(self, path: &str, type_name: &str, value: &str) -> Self {
        locked(&self.properties).insert(
            path.trim_matches('/').to_string(),
            PropertyValue::new(type_name, value),
        );
        self
    }

    pub fn without_property(self, path: &str) -> Self {
        locked(&self.properties).remove(path.trim_matches('/'));
        self
    }

    pub fn with_time(self, nanos: i64) -> Self {
        self.time.store(nanos, Ordering::SeqCst);
        self
    }

    pub fn with_signal_in(self, signal: &str) -> Self {
        locked(&self.signals_in).push(signal.to_string());
        self
    }

    pub fn with_signal_out(self, signal: &str) -> Self {
        locked(&self.signals_out).push(signal.to_string());
        self
    }

    /// Stream type of a signal: meta type plus `(name, value, type)` properties.
    pub fn with_stream_type(
        self,
        signal: &str,
        meta_type: &str,
        properties: &[(&str, &str, &str)],
    ) -> Self {
        locked(&self.stream_types).insert(
            signal.to_string(),
            StreamTypeEntry {
                meta_type: meta_type.to_string(),
                properties: properties
                    .iter()
                    .map(|(n, v, t)| (n.to_string(), v.to_string(), t.to_string()))
                    .collect(),
            },
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_name(&self) -> &str {
        &self.system_name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ParticipantState {
        *locked(&self.state)
    }

    pub fn set_state(&self, state: ParticipantState) {
        *locked(&self.state) = state;
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// An unreachable participant fails every request and is not discovered.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delay every answer by `delay`.
    pub fn set_response_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::SeqCst))
    }

    /// Make `method` answer with a JSON-RPC error carrying `message`.
    pub fn fail_method(&self, method: &str, message: &str) {
        locked(&self.failures).insert(method.to_string(), message.to_string());
    }

    /// Make the state machine answer `false` to `method`.
    pub fn deny_method(&self, method: &str) {
        locked(&self.denials).insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        locked(&self.failures).clear();
        locked(&self.denials).clear();
    }

    pub fn property(&self, path: &str) -> Option<PropertyValue> {
        locked(&self.properties).get(path.trim_matches('/')).cloned()
    }

    /// Log sink URLs currently registered with this participant.
    pub fn sink_clients(&self) -> Vec<String> {
        locked(&self.sink_clients).clone()
    }

    fn component_iid(&self, component_name: &str) -> Option<String> {
        locked(&self.components)
            .iter()
            .find(|(name, _)| name == component_name)
            .map(|(_, iid)| iid.clone())
    }

    /// Answer one request addressed to `component_name`.
    pub(crate) fn handle(
        &self,
        component_name: &str,
        request: &JsonRpcRequest,
    ) -> Result<Value, JsonRpcError> {
        if let Some(message) = locked(&self.failures).get(&request.method) {
            return Err(JsonRpcError::internal_error(message.clone()));
        }
        let iid = self.component_iid(component_name).ok_or_else(|| {
            JsonRpcError::method_not_found(&format!("{}.{}", component_name, request.method))
        })?;

        match iid.as_str() {
            ParticipantInfoProxy::IID => self.handle_info(request),
            StateMachineProxy::IID => self.handle_state_machine(request),
            ConfigurationProxy::IID => self.handle_configuration(request),
            ClockProxy::IID => self.handle_clock(request),
            DataRegistryProxy::IID => self.handle_data_registry(request),
            LoggingServiceProxy::IID => self.handle_logging(request),
            LoggingSinkServiceProxy::IID => self.handle_logging_sink(request),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        }
    }

    fn handle_info(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let components = locked(&self.components).clone();
        match request.method.as_str() {
            "getName" => Ok(json!(self.name)),
            "getSystemName" => Ok(json!(self.system_name)),
            "getRPCServices" => {
                let names: Vec<_> = components.iter().map(|(name, _)| name.as_str()).collect();
                Ok(json!(names.join(";")))
            }
            "getRPCServiceIIDs" => {
                let wanted = request.str_param("service_name");
                let iids: Vec<_> = components
                    .iter()
                    .filter(|(name, _)| name == wanted)
                    .map(|(_, iid)| iid.as_str())
                    .collect();
                Ok(json!(iids.join(";")))
            }
            "getRPCServiceInterfaceDefinition" => Ok(json!(format!(
                "{{\"service\":\"{}\",\"iid\":\"{}\"}}",
                request.str_param("service_name"),
                request.str_param("service_iid")
            ))),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_state_machine(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        use ParticipantState as S;

        let method = request.method.as_str();
        let mut state = locked(&self.state);
        if method == "getCurrentStateName" {
            return Ok(json!(state.remote_name().unwrap_or("Error")));
        }
        if locked(&self.denials).contains(method) {
            return Ok(json!(false));
        }

        let next = match (method, *state) {
            ("load", S::Unloaded) => Some(S::Loaded),
            ("unload", S::Loaded) => Some(S::Unloaded),
            ("initialize", S::Loaded) => Some(S::Initialized),
            ("deinitialize", S::Initialized) => Some(S::Loaded),
            ("start", S::Initialized | S::Paused) => Some(S::Running),
            ("pause", S::Initialized | S::Running) => Some(S::Paused),
            ("stop", S::Running | S::Paused) => Some(S::Initialized),
            ("exit", S::Unloaded) => {
                self.set_reachable(false);
                Some(S::Unloaded)
            }
            ("load" | "unload" | "initialize" | "deinitialize" | "start" | "pause" | "stop"
            | "exit", _) => None,
            (other, _) => return Err(JsonRpcError::method_not_found(other)),
        };
        match next {
            Some(next) => {
                *state = next;
                Ok(json!(true))
            }
            None => Ok(json!(false)),
        }
    }

    fn handle_configuration(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let path = request.str_param("property_path").trim_matches('/').to_string();
        let mut properties = locked(&self.properties);
        match request.method.as_str() {
            "exists" => {
                let prefix = format!("{}/", path);
                let exists = path.is_empty()
                    || properties
                        .keys()
                        .any(|key| *key == path || key.starts_with(&prefix));
                Ok(json!(exists))
            }
            "getProperties" => {
                let prefix = if path.is_empty() {
                    String::new()
                } else {
                    format!("{}/", path)
                };
                let names: Vec<_> = properties
                    .keys()
                    .filter_map(|key| key.strip_prefix(&prefix))
                    .filter(|rest| !rest.contains('/'))
                    .collect();
                Ok(json!(names.join(",")))
            }
            "getProperty" => {
                let property = properties.get(&path).cloned().unwrap_or_default();
                Ok(json!({ "type": property.type_name, "value": property.value }))
            }
            "setProperty" => match properties.get_mut(&path) {
                Some(property) => {
                    property.type_name = request.str_param("type").to_string();
                    property.value = request.str_param("value").to_string();
                    Ok(json!(0))
                }
                None => Ok(json!(-1)),
            },
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_clock(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let clocks = locked(&self.clocks).clone();
        let clock_name = request.str_param("clock_name");
        let known = clocks.iter().find(|(name, _)| name == clock_name);
        match request.method.as_str() {
            "getClockNames" => {
                let names: Vec<_> = clocks.iter().map(|(name, _)| name.as_str()).collect();
                Ok(json!(names.join(",")))
            }
            "getMainClockName" => Ok(json!(self
                .property("clock/main_clock")
                .map(|p| p.value)
                .unwrap_or_default())),
            "getTime" => {
                let time = if clock_name.is_empty() || known.is_some() {
                    self.time.load(Ordering::SeqCst)
                } else {
                    -1
                };
                Ok(json!(time.to_string()))
            }
            "getType" => Ok(json!(known.map(|(_, t)| *t).unwrap_or(-1))),
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_data_registry(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "getSignalInNames" => Ok(json!(locked(&self.signals_in).join(","))),
            "getSignalOutNames" => Ok(json!(locked(&self.signals_out).join(","))),
            "getStreamType" => {
                let entry = locked(&self.stream_types)
                    .get(request.str_param("signal_name"))
                    .cloned();
                let Some(entry) = entry else {
                    return Err(JsonRpcError::invalid_params(format!(
                        "unknown signal {}",
                        request.str_param("signal_name")
                    )));
                };
                let column = |index: usize| {
                    entry
                        .properties
                        .iter()
                        .map(|(name, value, type_name)| match index {
                            0 => name.as_str(),
                            1 => value.as_str(),
                            _ => type_name.as_str(),
                        })
                        .collect::<Vec<_>>()
                        .join(",")
                };
                Ok(json!({
                    "meta_type": entry.meta_type,
                    "properties": {
                        "names": column(0),
                        "values": column(1),
                        "types": column(2),
                    }
                }))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_logging(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "setLoggerFilter" => {
                let severity = request.i64_param("severity").unwrap_or(-1);
                if !(0..=5).contains(&severity) {
                    return Ok(json!(-1));
                }
                let sinks = request
                    .str_param("enable_sinks")
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
                locked(&self.loggers).insert(
                    request.str_param("logger_name").to_string(),
                    LoggerEntry { sinks, severity },
                );
                Ok(json!(0))
            }
            "getLoggerFilter" => {
                let entry = locked(&self.loggers)
                    .get(request.str_param("logger_name"))
                    .cloned()
                    .unwrap_or(LoggerEntry {
                        sinks: vec!["console".to_string()],
                        severity: 4,
                    });
                Ok(json!({ "enable_sinks": entry.sinks.join(","), "severity": entry.severity }))
            }
            "getLoggers" => {
                let loggers = locked(&self.loggers);
                let names: Vec<_> = loggers.keys().map(String::as_str).collect();
                Ok(json!(names.join(",")))
            }
            "getSinks" => {
                let sinks = locked(&self.sinks);
                let names: Vec<_> = sinks.keys().map(String::as_str).collect();
                Ok(json!(names.join(",")))
            }
            "setSinkProperty" => {
                let mut sinks = locked(&self.sinks);
                match sinks.get_mut(request.str_param("sink_name")) {
                    Some(sink) => {
                        sink.insert(
                            request.str_param("property_name").to_string(),
                            PropertyValue::new(
                                request.str_param("type"),
                                request.str_param("value"),
                            ),
                        );
                        Ok(json!(0))
                    }
                    None => Ok(json!(-1)),
                }
            }
            "getSinkProperty" => {
                let property = locked(&self.sinks)
                    .get(request.str_param("sink_name"))
                    .and_then(|sink| sink.get(request.str_param("property_name")))
                    .cloned()
                    .unwrap_or_default();
                Ok(json!({ "type": property.type_name, "value": property.value }))
            }
            "getSinkProperties" => {
                let sinks = locked(&self.sinks);
                let names = sinks
                    .get(request.str_param("sink_name"))
                    .map(|sink| sink.keys().cloned().collect::<Vec<_>>().join(","))
                    .unwrap_or_default();
                Ok(json!(names))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn handle_logging_sink(&self, request: &JsonRpcRequest) -> Result<Value, JsonRpcError> {
        let address = request.str_param("address").to_string();
        let mut clients = locked(&self.sink_clients);
        match request.method.as_str() {
            "registerRPCLoggingSinkClient" => {
                if !clients.contains(&address) {
                    clients.push(address);
                }
                Ok(json!(0))
            }
            "unregisterRPCLoggingSinkClient" => {
                let before = clients.len();
                clients.retain(|url| *url != address);
                Ok(json!(if clients.len() < before { 0 } else { -1 }))
            }
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }
}
