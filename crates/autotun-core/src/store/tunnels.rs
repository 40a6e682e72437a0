// ── In-memory tunnel store ──

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use super::collection::TunnelCollection;
use super::{TunnelConfigStore, TunnelList};
use crate::error::StoreError;
use crate::model::{NewTunnel, TunnelConfig, TunnelId};

/// Thread-safe tunnel store backed by a [`TunnelCollection`].
///
/// Reads are lock-free. Writes go through a single gate so the
/// name-uniqueness check and the insert are one atomic step.
pub struct MemoryTunnelStore {
    tunnels: TunnelCollection,
    write_gate: Mutex<()>,
}

impl MemoryTunnelStore {
    pub fn new() -> Self {
        Self {
            tunnels: TunnelCollection::new(),
            write_gate: Mutex::new(()),
        }
    }

    /// Rebuild a store from previously persisted records.
    ///
    /// Later duplicates of an already-seen name are dropped.
    pub fn from_tunnels(tunnels: impl IntoIterator<Item = TunnelConfig>) -> Self {
        let store = Self::new();
        for tunnel in tunnels {
            if store.tunnels.contains_name(&tunnel.name) {
                debug!(name = %tunnel.name, "skipping duplicate tunnel name on restore");
                continue;
            }
            store.tunnels.upsert(tunnel);
        }
        store
    }

    /// Owned copies of every record, for persistence.
    pub fn to_vec(&self) -> Vec<TunnelConfig> {
        self.tunnels.snapshot().iter().map(|t| (**t).clone()).collect()
    }
}

impl Default for MemoryTunnelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelConfigStore for MemoryTunnelStore {
    fn create(&self, tunnel: NewTunnel) -> Result<TunnelConfig, StoreError> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        if self.tunnels.contains_name(&tunnel.name) {
            return Err(StoreError::DuplicateName { name: tunnel.name });
        }

        let record = TunnelConfig {
            id: TunnelId::new(),
            name: tunnel.name,
            profile_text: tunnel.profile_text,
            order: self.tunnels.max_order().map_or(0, |o| o.saturating_add(1)),
        };
        self.tunnels.upsert(record.clone());
        debug!(name = %record.name, id = %record.id, "tunnel created");
        Ok(record)
    }

    fn list(&self) -> Arc<TunnelList> {
        self.tunnels.snapshot()
    }

    fn get(&self, id: TunnelId) -> Option<Arc<TunnelConfig>> {
        self.tunnels.get(id)
    }

    fn find_by_name(&self, name: &str) -> Option<Arc<TunnelConfig>> {
        self.tunnels.get_by_name(name)
    }

    fn delete(&self, id: TunnelId) -> Result<Arc<TunnelConfig>, StoreError> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = self.tunnels.remove(id).ok_or(StoreError::NotFound { id })?;
        debug!(name = %removed.name, %id, "tunnel deleted");
        Ok(removed)
    }

    fn count(&self) -> usize {
        self.tunnels.len()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<TunnelList>> {
        self.tunnels.subscribe()
    }
}
