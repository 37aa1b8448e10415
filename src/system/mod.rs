//! Fleet orchestration.
//!
//! A [`System`] is a named, ordered set of participants reached through one
//! shared connection. It aggregates their states, drives them through the
//! state machine in priority order, pushes configuration and forwards their
//! logs to a single monitor.
//!
//! Every error a `System` returns has already been logged to its monitor.

mod discovery;
mod ordering;
mod properties;
mod timing;
mod transitions;

pub use discovery::{
    discover_all_systems, discover_all_systems_by_url, discover_system, discover_system_by_url,
    discover_system_with_config,
};
pub use ordering::{order_by_priority, walk_order};
pub use timing::{
    TimingConfiguration, CLOCK_LOCAL_SYSTEM_REALTIME, CLOCK_LOCAL_SYSTEM_SIMTIME,
    CLOCK_SLAVE_MASTER_ON_DEMAND, CLOCK_SLAVE_MASTER_ON_DEMAND_DISCRETE, PROPERTY_MAIN_CLOCK,
    PROPERTY_SCHEDULER, PROPERTY_STEP_SIZE, PROPERTY_SYNC_CYCLE_TIME, PROPERTY_TIME_FACTOR,
    PROPERTY_TIME_UPDATE_TIMEOUT, PROPERTY_TIMING_MASTER, SCHEDULER_CLOCK_BASED,
};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{SimfleetConfig, TimeoutConfig};
use crate::connection::{Connection, ConnectionError, ConnectionFactory};
use crate::logging::{EventMonitor, Severity, SystemLogger};
use crate::participant::{ParticipantError, ParticipantProxy};
use crate::state::{aggregate, next_transition, ParticipantState, SystemState, Transition};
use crate::transport::{TransportError, USE_DEFAULT_URL};

/// Upper bound on state machine edges one `set_system_state` call walks.
/// Unloaded to running is the longest path.
pub const MAX_TRANSITION_STEPS: usize = 5;

/// Errors raised by a system.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Participant(#[from] ParticipantError),

    #[error("Try to add a participant with name {participant} which already exists.")]
    DuplicateParticipant { participant: String },

    #[error("No Participant with the name {participant} found in system {system}")]
    UnknownParticipant { system: String, participant: String },

    #[error("Invalid setSystemState call at system {system}: {target} can not be set")]
    InvalidTargetState {
        system: String,
        target: ParticipantState,
    },

    #[error("At least one participant is unreachable, can not set homogenous state of the system {system}")]
    Unreachable { system: String },

    #[error("No participant has a statemachine, can not set homogenous state of the system {system}")]
    NoStateMachine { system: String },

    #[error("No homogenous state of the participants, setSystemState is not possible at system {system} (current state {current})")]
    NotHomogeneous { system: String, current: SystemState },

    #[error("system {system} did not reach {target} within {MAX_TRANSITION_STEPS} transitions, current state {current}")]
    TargetNotReached {
        system: String,
        target: ParticipantState,
        current: SystemState,
    },

    #[error("{transition} failed at system {system}: {failures}")]
    TransitionFailed {
        system: String,
        transition: Transition,
        failures: String,
    },

    #[error("access to properties node {node} of participant {participant} not possible")]
    PropertyNode { participant: String, node: String },

    #[error("property {path} could not be set for the following participants: {participants}")]
    PropertyNotSet { path: String, participants: String },

    #[error("can not discover participants of system '{system}' at '{url}': {source}")]
    Discovery {
        system: String,
        url: String,
        #[source]
        source: TransportError,
    },
}

pub type Result<T> = std::result::Result<T, SystemError>;

/// A named fleet of participants.
///
/// Participants keep insertion order and unique names. Clones of the
/// participant handles returned by [`System::participant`] share state
/// with the ones stored here.
pub struct System {
    name: String,
    url: String,
    factory: Arc<ConnectionFactory>,
    connection: Connection,
    logger: Arc<SystemLogger>,
    participants: Vec<ParticipantProxy>,
    timeouts: TimeoutConfig,
}

impl System {
    /// System `name` at the transport's default discovery URL.
    pub async fn new(factory: Arc<ConnectionFactory>, name: &str) -> Result<Self> {
        Self::with_url(factory, name, USE_DEFAULT_URL).await
    }

    pub async fn with_url(factory: Arc<ConnectionFactory>, name: &str, url: &str) -> Result<Self> {
        Self::with_config(factory, name, url, &SimfleetConfig::default()).await
    }

    /// Connect to system `name` at `url`, sharing the connection with every
    /// other system built for the same name and URL.
    pub async fn with_config(
        factory: Arc<ConnectionFactory>,
        name: &str,
        url: &str,
        config: &SimfleetConfig,
    ) -> Result<Self> {
        let connection = factory.create_or_get(name, url).await?;
        let logger = Arc::new(SystemLogger::new(name, config.logging.severity));
        if let Err(e) = logger
            .start_log_sink(connection.system_access().as_ref())
            .await
        {
            warn!(system = %name, error = %e, "Log sink not available, participant logs will not be forwarded");
        }
        debug!(system = %name, url = %url, "System created");

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            factory,
            connection,
            logger,
            participants: Vec::new(),
            timeouts: config.timeouts.clone(),
        })
    }

    /// A second system over the same connection with fresh participant
    /// proxies carrying the same priorities and additional info.
    ///
    /// The monitor is not copied.
    pub async fn try_clone(&self) -> Result<Self> {
        let config = SimfleetConfig {
            timeouts: self.timeouts.clone(),
            ..SimfleetConfig::default()
        };
        let mut copy =
            Self::with_config(Arc::clone(&self.factory), &self.name, &self.url, &config).await?;
        copy.set_severity_level(self.logger.severity_level());
        for participant in &self.participants {
            let fresh = copy
                .add_with_url(participant.name(), participant.url())
                .await?;
            participant.copy_values_to(&fresh);
        }
        Ok(copy)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Log `err` to the monitor and hand it back.
    fn raise(&self, severity: Severity, err: SystemError) -> SystemError {
        self.logger.raise(severity, err)
    }

    // ========================================================================
    // Membership
    // ========================================================================

    pub async fn add(&mut self, participant_name: &str) -> Result<ParticipantProxy> {
        self.add_with_url(participant_name, "").await
    }

    /// Add a participant. Names are unique within a system.
    pub async fn add_with_url(
        &mut self,
        participant_name: &str,
        participant_url: &str,
    ) -> Result<ParticipantProxy> {
        if self.contains(participant_name) {
            return Err(self.raise(
                Severity::Fatal,
                SystemError::DuplicateParticipant {
                    participant: participant_name.to_string(),
                },
            ));
        }
        let proxy = ParticipantProxy::connect(
            participant_name,
            participant_url,
            self.connection.clone(),
            Arc::clone(&self.logger),
            self.timeouts.participant(),
        )
        .await;
        debug!(system = %self.name, participant = %participant_name, "Participant added");
        self.participants.push(proxy.clone());
        Ok(proxy)
    }

    /// Add several participants, stopping at the first duplicate.
    pub async fn add_many<I, S>(&mut self, participant_names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in participant_names {
            self.add(name.as_ref()).await?;
        }
        Ok(())
    }

    /// Add several participants with their URLs.
    pub async fn add_map<I, N, U>(&mut self, participants: I) -> Result<()>
    where
        I: IntoIterator<Item = (N, U)>,
        N: AsRef<str>,
        U: AsRef<str>,
    {
        for (name, url) in participants {
            self.add_with_url(name.as_ref(), url.as_ref()).await?;
        }
        Ok(())
    }

    /// Remove a participant. Returns false if there was none by that name.
    pub fn remove(&mut self, participant_name: &str) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p.name() != participant_name);
        before != self.participants.len()
    }

    pub fn remove_many<I, S>(&mut self, participant_names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in participant_names {
            self.remove(name.as_ref());
        }
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    fn contains(&self, participant_name: &str) -> bool {
        self.participants.iter().any(|p| p.name() == participant_name)
    }

    fn find(&self, participant_name: &str) -> Option<&ParticipantProxy> {
        self.participants.iter().find(|p| p.name() == participant_name)
    }

    /// Handle to a participant, sharing state with the one held here.
    pub fn participant(&self, participant_name: &str) -> Result<ParticipantProxy> {
        match self.find(participant_name) {
            Some(proxy) => Ok(proxy.clone()),
            None => Err(self.raise(
                Severity::Fatal,
                SystemError::UnknownParticipant {
                    system: self.name.clone(),
                    participant: participant_name.to_string(),
                },
            )),
        }
    }

    /// All participants in insertion order.
    pub fn participants(&self) -> &[ParticipantProxy] {
        &self.participants
    }

    pub fn participant_names(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.name().to_string()).collect()
    }

    // ========================================================================
    // State
    // ========================================================================

    pub async fn participant_state(
        &self,
        participant_name: &str,
        timeout: Duration,
    ) -> Result<ParticipantState> {
        let participant = self.participant(participant_name)?;
        Ok(participant.state(timeout).await)
    }

    /// Current state of every participant.
    pub async fn participant_states(&self, timeout: Duration) -> BTreeMap<String, ParticipantState> {
        let mut states = BTreeMap::new();
        for participant in &self.participants {
            states.insert(
                participant.name().to_string(),
                participant.state(timeout).await,
            );
        }
        states
    }

    /// Aggregated state of the fleet.
    pub async fn system_state(&self, timeout: Duration) -> SystemState {
        let states = self.participant_states(timeout).await;
        let state = aggregate(states.values().copied());
        debug!(system = %self.name, state = %state, "System state");
        state
    }

    /// [`System::system_state`] bounded by the configured default timeout.
    pub async fn system_state_default(&self) -> SystemState {
        self.system_state(self.timeouts.default_timeout()).await
    }

    /// [`System::set_system_state`] bounded by the configured transition timeout.
    pub async fn set_system_state_default(&self, target: ParticipantState) -> Result<()> {
        self.set_system_state(target, self.timeouts.transition()).await
    }

    /// Drive the whole fleet to `target`, one state machine edge at a time.
    ///
    /// The fleet must agree on its current state before every edge.
    pub async fn set_system_state(
        &self,
        target: ParticipantState,
        timeout: Duration,
    ) -> Result<()> {
        if !target.is_settable() {
            return Err(self.raise(
                Severity::Fatal,
                SystemError::InvalidTargetState {
                    system: self.name.clone(),
                    target,
                },
            ));
        }

        let mut steps = 0;
        loop {
            let current = self.system_state(timeout).await;
            match current.state {
                ParticipantState::Unreachable => {
                    return Err(self.raise(
                        Severity::Fatal,
                        SystemError::Unreachable {
                            system: self.name.clone(),
                        },
                    ));
                }
                ParticipantState::Undefined => {
                    return Err(self.raise(
                        Severity::Fatal,
                        SystemError::NoStateMachine {
                            system: self.name.clone(),
                        },
                    ));
                }
                _ => {}
            }
            if !current.homogeneous {
                return Err(self.raise(
                    Severity::Fatal,
                    SystemError::NotHomogeneous {
                        system: self.name.clone(),
                        current,
                    },
                ));
            }
            if current.state == target {
                return Ok(());
            }

            let transition = match next_transition(current.state, target) {
                Some(transition) if steps < MAX_TRANSITION_STEPS => transition,
                _ => {
                    return Err(self.raise(
                        Severity::Error,
                        SystemError::TargetNotReached {
                            system: self.name.clone(),
                            target,
                            current,
                        },
                    ));
                }
            };
            debug!(system = %self.name, from = %current.state, to = %target, transition = %transition, "Stepping system state");
            self.run_transition(transition, timeout).await?;
            steps += 1;
        }
    }

    // ========================================================================
    // Observability
    // ========================================================================

    /// Deliver this system's log events to `monitor`, replacing any previous one.
    pub fn register_monitoring(&self, monitor: Arc<dyn EventMonitor>) {
        self.logger.register_monitor(monitor);
    }

    /// Stop delivering to `monitor`. Returns `false` when a different
    /// monitor (or none) is registered.
    pub fn unregister_monitoring(&self, monitor: Arc<dyn EventMonitor>) -> bool {
        self.logger.unregister_monitor(monitor)
    }

    pub fn set_severity_level(&self, level: Severity) {
        self.logger.set_severity_level(level);
    }

    pub fn severity_level(&self) -> Severity {
        self.logger.severity_level()
    }
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("participants", &self.participant_names())
            .finish()
    }
}

#[cfg(test)]
mod tests;
