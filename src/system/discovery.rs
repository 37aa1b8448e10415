//! Building systems from what the transport can see.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{Result, System, SystemError};
use crate::config::SimfleetConfig;
use crate::connection::ConnectionFactory;
use crate::logging::Severity;
use crate::transport::{DISCOVER_ALL_SYSTEMS, PARTICIPANT_SYSTEM_SEPARATOR, USE_DEFAULT_URL};

/// System `name` with every participant discovered at the default URL.
pub async fn discover_system(
    factory: &Arc<ConnectionFactory>,
    name: &str,
    timeout: Duration,
) -> Result<System> {
    discover_system_by_url(factory, name, USE_DEFAULT_URL, timeout).await
}

/// System `name` with every participant discovered at `url`.
pub async fn discover_system_by_url(
    factory: &Arc<ConnectionFactory>,
    name: &str,
    url: &str,
    timeout: Duration,
) -> Result<System> {
    let system = System::with_url(Arc::clone(factory), name, url).await?;
    populate(system, timeout).await
}

/// System `name` at `url` built from `config`, discovered within the
/// configured discovery timeout.
pub async fn discover_system_with_config(
    factory: &Arc<ConnectionFactory>,
    name: &str,
    url: &str,
    config: &SimfleetConfig,
) -> Result<System> {
    let system = System::with_config(Arc::clone(factory), name, url, config).await?;
    populate(system, config.timeouts.discover()).await
}

/// Add every participant the system's connection can see.
async fn populate(mut system: System, timeout: Duration) -> Result<System> {
    let discovered = match system.connection.system_access().discover(timeout).await {
        Ok(discovered) => discovered,
        Err(source) => {
            let err = SystemError::Discovery {
                system: system.name.clone(),
                url: system.url.clone(),
                source,
            };
            return Err(system.raise(Severity::Fatal, err));
        }
    };
    for participant in discovered {
        system
            .add_with_url(&participant.name, &participant.url)
            .await?;
    }
    info!(system = %system.name, participants = system.participants.len(), "System discovered");
    Ok(system)
}

/// Every system visible at the default URL.
pub async fn discover_all_systems(
    factory: &Arc<ConnectionFactory>,
    timeout: Duration,
) -> Result<Vec<System>> {
    discover_all_systems_by_url(factory, USE_DEFAULT_URL, timeout).await
}

/// Every system visible at `url`, ordered by system name.
///
/// The transport reports participants as `participant@system`; entries
/// without a system part are skipped.
pub async fn discover_all_systems_by_url(
    factory: &Arc<ConnectionFactory>,
    url: &str,
    timeout: Duration,
) -> Result<Vec<System>> {
    let connection = factory.create_or_get(DISCOVER_ALL_SYSTEMS, url).await?;
    let discovered = connection
        .system_access()
        .discover(timeout)
        .await
        .map_err(|source| SystemError::Discovery {
            system: DISCOVER_ALL_SYSTEMS.to_string(),
            url: url.to_string(),
            source,
        })?;

    let mut by_system: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for participant in discovered {
        let Some((participant_name, system_name)) = participant
            .name
            .split_once(PARTICIPANT_SYSTEM_SEPARATOR)
        else {
            debug!(id = %participant.name, "Discovered participant without system, skipped");
            continue;
        };
        by_system
            .entry(system_name.to_string())
            .or_default()
            .push((participant_name.to_string(), participant.url));
    }

    let mut systems = Vec::with_capacity(by_system.len());
    for (system_name, members) in by_system {
        let mut system = System::with_url(Arc::clone(factory), &system_name, url).await?;
        system.add_map(members).await?;
        systems.push(system);
    }
    info!(url = %url, systems = systems.len(), "Systems discovered");
    Ok(systems)
}
