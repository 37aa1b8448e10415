//! Property propagation to participants.

use tracing::debug;

use super::{Result, System, SystemError};
use crate::logging::Severity;
use crate::participant::ParticipantProxy;
use crate::rpc::{PropertyValue, RpcError};

/// Node under which system-wide properties live.
pub const SYSTEM_PROPERTY_NODE: &str = "system";

/// Split a property path into its node and property name.
///
/// `.` is accepted as a separator and converted to `/`.
fn split_property_path(path: &str) -> (String, String) {
    let normalized = path.replace('.', "/");
    let trimmed = normalized.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((node, name)) => (node.to_string(), name.to_string()),
        None => ("/".to_string(), trimmed.to_string()),
    }
}

impl System {
    /// Set one property on one participant. Any failure is an error.
    pub async fn set_property_value(
        &self,
        participant_name: &str,
        path: &str,
        type_name: &str,
        value: &str,
    ) -> Result<()> {
        let participant = self.participant(participant_name)?;
        let (node, name) = split_property_path(path);
        self.push_property(&participant, &node, &name, type_name, value)
            .await
            .map_err(|e| self.raise(Severity::Error, e))
    }

    /// Set one property on every participant except `except`.
    ///
    /// Participants that fail are collected. In strict mode their names are
    /// returned as one error; otherwise one warning naming them is logged.
    pub async fn set_property_value_to_all(
        &self,
        path: &str,
        type_name: &str,
        value: &str,
        except: Option<&str>,
        strict: bool,
    ) -> Result<()> {
        let (node, name) = split_property_path(path);
        let mut failing = Vec::new();
        for participant in &self.participants {
            if except == Some(participant.name()) {
                continue;
            }
            if let Err(e) = self
                .push_property(participant, &node, &name, type_name, value)
                .await
            {
                debug!(system = %self.name, participant = %participant.name(), error = %e, "Property not set");
                failing.push(participant.name().to_string());
            }
        }

        if failing.is_empty() {
            return Ok(());
        }
        let err = SystemError::PropertyNotSet {
            path: path.replace('.', "/"),
            participants: failing.join(", "),
        };
        if strict {
            return Err(self.raise(Severity::Error, err));
        }
        self.logger.system_log(Severity::Warning, &err.to_string());
        Ok(())
    }

    /// Set a property under `system/` on every participant that has it.
    ///
    /// Participants without the property are reported in a single warning.
    pub async fn set_system_property(
        &self,
        path: &str,
        type_name: &str,
        value: &str,
    ) -> Result<()> {
        let path = format!(
            "{}/{}",
            SYSTEM_PROPERTY_NODE,
            path.replace('.', "/").trim_matches('/')
        );
        self.set_property_value_to_all(&path, type_name, value, None, false)
            .await
    }

    /// Current value of a property, `None` if the participant does not have it.
    pub async fn property_value(
        &self,
        participant_name: &str,
        path: &str,
    ) -> Result<Option<PropertyValue>> {
        let participant = self.participant(participant_name)?;
        let configuration = participant.configuration().await?;
        let Some(configuration) = configuration.get() else {
            return Ok(None);
        };
        let (node, name) = split_property_path(path);
        match configuration.properties(&node).await {
            Ok(properties) => Ok(properties.property(&name).await),
            Err(RpcError::NoSuchNode(_)) => Ok(None),
            Err(e) => Err(SystemError::PropertyNode {
                participant: participant_name.to_string(),
                node: format!("{}: {}", node, e),
            }),
        }
    }

    async fn push_property(
        &self,
        participant: &ParticipantProxy,
        node: &str,
        name: &str,
        type_name: &str,
        value: &str,
    ) -> Result<()> {
        let configuration = participant.configuration().await?;
        let node_error = || SystemError::PropertyNode {
            participant: participant.name().to_string(),
            node: node.to_string(),
        };
        let Some(configuration) = configuration.get() else {
            return Err(node_error());
        };
        let properties = configuration.properties(node).await.map_err(|e| {
            debug!(participant = %participant.name(), node = %node, error = %e, "Property node not accessible");
            node_error()
        })?;
        if properties.set_property(name, value, type_name).await {
            Ok(())
        } else {
            Err(SystemError::PropertyNotSet {
                path: format!("{}{}", properties.node(), name),
                participants: participant.name().to_string(),
            })
        }
    }
}
