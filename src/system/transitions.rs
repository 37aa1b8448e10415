//! Fleet-wide state machine primitives.

use std::time::Duration;

use tracing::debug;

use super::ordering::walk_order;
use super::{Result, System, SystemError};
use crate::logging::Severity;
use crate::state::Transition;

impl System {
    pub async fn load(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Load, timeout).await
    }

    pub async fn unload(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Unload, timeout).await
    }

    pub async fn initialize(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Initialize, timeout).await
    }

    pub async fn deinitialize(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Deinitialize, timeout).await
    }

    pub async fn start(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Start, timeout).await
    }

    pub async fn pause(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Pause, timeout).await
    }

    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Stop, timeout).await
    }

    /// Ask every participant to exit, in insertion order.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.run_transition(Transition::Shutdown, timeout).await
    }

    /// Issue `transition` to every participant in walk order.
    ///
    /// A failing participant does not stop the walk. All failures are
    /// reported together once every participant has been asked.
    pub(super) async fn run_transition(
        &self,
        transition: Transition,
        timeout: Duration,
    ) -> Result<()> {
        if self.participants.is_empty() {
            self.logger
                .system_log(Severity::Warning, "No participants within the current system");
            return Ok(());
        }

        let mut failures = Vec::new();
        for participant in walk_order(&self.participants, transition) {
            let state_machine = participant.state_machine();
            let Some(sm) = state_machine.get() else {
                failures.push(format!("participant {} is unreachable", participant.name()));
                continue;
            };
            debug!(system = %self.name, participant = %participant.name(), transition = %transition, "Issuing transition");
            if let Err(e) = sm.transition(transition, timeout).await {
                failures.push(format!("{}: {}", participant.name(), e));
            }
        }

        if !failures.is_empty() {
            return Err(self.raise(
                Severity::Error,
                SystemError::TransitionFailed {
                    system: self.name.clone(),
                    transition,
                    failures: failures.join("; "),
                },
            ));
        }

        self.logger.system_log(
            Severity::Info,
            &format!("system {} {} successfully", self.name, transition.past_tense()),
        );
        Ok(())
    }
}
