//! Per-participant caches.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::rpc::{self, AnyProxy, ParticipantInfoProxy};
use crate::state::ParticipantState;

/// Single-slot proxy cache, one slot per interface id.
#[derive(Default)]
pub struct RpcComponentCache {
    slots: Mutex<HashMap<String, AnyProxy>>,
}

impl RpcComponentCache {
    pub fn get(&self, iid: &str) -> Option<AnyProxy> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(iid)
            .cloned()
    }

    pub fn insert(&self, iid: &str, proxy: AnyProxy) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(iid.to_string(), proxy);
    }
}

#[derive(Default)]
struct DiscoveryState {
    /// Participant state the map was built in.
    state: ParticipantState,
    by_iid: HashMap<String, Vec<String>>,
}

/// Interface id to component names, as reported by the participant.
///
/// The map is only valid for the participant state it was built in. A
/// lookup in any other state rebuilds the whole map.
#[derive(Default)]
pub struct ComponentDiscoveryCache {
    inner: tokio::sync::Mutex<DiscoveryState>,
}

impl ComponentDiscoveryCache {
    /// Names of the components implementing `iid`, rebuilding the map when
    /// `current` differs from the state it was built in.
    pub async fn components_supporting(
        &self,
        info: &ParticipantInfoProxy,
        iid: &str,
        current: ParticipantState,
    ) -> rpc::Result<Vec<String>> {
        let mut cache = self.inner.lock().await;
        if cache.state == current {
            if let Some(names) = cache.by_iid.get(iid) {
                return Ok(names.clone());
            }
        }

        let mut by_iid: HashMap<String, Vec<String>> = HashMap::new();
        for component in info.rpc_components().await? {
            for component_iid in info.rpc_component_iids(&component).await? {
                by_iid
                    .entry(component_iid)
                    .or_default()
                    .push(component.clone());
            }
        }
        debug!(iid = %iid, state = %current, interfaces = by_iid.len(), "Component map rebuilt");

        let names = by_iid.entry(iid.to_string()).or_default().clone();
        cache.by_iid = by_iid;
        cache.state = current;
        Ok(names)
    }
}
