//! Participant state machine component.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use super::{InterfaceRegistration, RpcClient, RpcError, RpcInterface};
use crate::state::{ParticipantState, Transition};
use crate::transport::Requester;

/// Failure of one state machine transition.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    /// The call did not complete.
    #[error("timeout while {action}: {source}")]
    Failed {
        action: &'static str,
        #[source]
        source: RpcError,
    },

    /// The state machine refused the transition from its current state.
    #[error("state machine {0} denied")]
    Denied(Transition),
}

pub struct StateMachineProxy {
    client: RpcClient,
}

impl RpcInterface for StateMachineProxy {
    const IID: &'static str = "participant_statemachine.v1";
    const DEFAULT_NAME: &'static str = "participant_statemachine";

    fn connect(component_name: &str, requester: Arc<dyn Requester>, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new(component_name, requester, timeout),
        }
    }
}

inventory::submit! { InterfaceRegistration::of::<StateMachineProxy>() }

impl StateMachineProxy {
    /// Current state. A failed call reads as `Unreachable`, an unknown state
    /// name as `Undefined`.
    pub async fn state(&self, timeout: Duration) -> ParticipantState {
        match self
            .client
            .call_with_timeout("getCurrentStateName", json!({}), timeout)
            .await
        {
            Ok(Value::String(name)) => ParticipantState::from_remote_name(&name),
            Ok(other) => {
                debug!(component = %self.client.component_name(), answer = %other, "Unexpected state answer");
                ParticipantState::Undefined
            }
            Err(e) => {
                debug!(component = %self.client.component_name(), error = %e, "State query failed");
                ParticipantState::Unreachable
            }
        }
    }

    /// Issue one transition. Only an explicit `true` answer counts as success.
    pub async fn transition(
        &self,
        transition: Transition,
        timeout: Duration,
    ) -> Result<(), TransitionError> {
        let answer = self
            .client
            .call_with_timeout(transition.method(), json!({}), timeout)
            .await
            .map_err(|source| TransitionError::Failed {
                action: transition.progressive(),
                source,
            })?;
        match answer {
            Value::Bool(true) => Ok(()),
            _ => Err(TransitionError::Denied(transition)),
        }
    }

    pub async fn load(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Load, timeout).await
    }

    pub async fn unload(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Unload, timeout).await
    }

    pub async fn initialize(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Initialize, timeout).await
    }

    pub async fn deinitialize(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Deinitialize, timeout).await
    }

    pub async fn start(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Start, timeout).await
    }

    pub async fn pause(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Pause, timeout).await
    }

    pub async fn stop(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Stop, timeout).await
    }

    pub async fn shutdown(&self, timeout: Duration) -> Result<(), TransitionError> {
        self.transition(Transition::Shutdown, timeout).await
    }
}
