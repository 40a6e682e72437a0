// ── Reactive tunnel collection ──
//
// Lock-free concurrent storage with O(1) lookups by id and by name, and
// push-based change notification via `watch` channels.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{TunnelConfig, TunnelId};

/// Concurrent map of tunnels plus an ordered snapshot for subscribers.
///
/// Uniqueness of names is NOT checked here; the owning store does that
/// under its write gate. Every mutation rebuilds the snapshot.
pub(crate) struct TunnelCollection {
    /// Primary storage: id -> tunnel.
    by_id: DashMap<TunnelId, Arc<TunnelConfig>>,

    /// Secondary index: name -> id.
    id_by_name: DashMap<String, TunnelId>,

    /// Snapshot sorted by `order`, rebuilt on mutation.
    snapshot: watch::Sender<Arc<Vec<Arc<TunnelConfig>>>>,
}

impl TunnelCollection {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_id: DashMap::new(),
            id_by_name: DashMap::new(),
            snapshot,
        }
    }

    /// Insert or replace a tunnel. Returns `true` if the id was new.
    pub(crate) fn upsert(&self, tunnel: TunnelConfig) -> bool {
        // A rename must not leave the old name pointing at this id.
        if let Some(old) = self.by_id.get(&tunnel.id) {
            if old.name != tunnel.name {
                self.id_by_name.remove(&old.name);
            }
        }

        let is_new = !self.by_id.contains_key(&tunnel.id);
        self.id_by_name.insert(tunnel.name.clone(), tunnel.id);
        self.by_id.insert(tunnel.id, Arc::new(tunnel));

        self.rebuild_snapshot();

        is_new
    }

    /// Remove a tunnel by id. Returns the removed tunnel if it existed.
    pub(crate) fn remove(&self, id: TunnelId) -> Option<Arc<TunnelConfig>> {
        let removed = self.by_id.remove(&id).map(|(_, v)| v);
        if let Some(ref tunnel) = removed {
            self.id_by_name.remove(&tunnel.name);
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, id: TunnelId) -> Option<Arc<TunnelConfig>> {
        self.by_id.get(&id).map(|r| Arc::clone(r.value()))
    }

    pub(crate) fn get_by_name(&self, name: &str) -> Option<Arc<TunnelConfig>> {
        let id = *self.id_by_name.get(name)?;
        self.get(id)
    }

    pub(crate) fn contains_name(&self, name: &str) -> bool {
        self.id_by_name.contains_key(name)
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<TunnelConfig>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<TunnelConfig>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Highest `order` currently stored.
    pub(crate) fn max_order(&self) -> Option<u32> {
        self.by_id.iter().map(|r| r.value().order).max()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<TunnelConfig>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
