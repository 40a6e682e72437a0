// ── Collaborator stores ──
//
// Contracts for the two persistent collaborators (tunnels, settings)
// plus the in-process implementations the core ships with. Durable
// storage belongs to whoever implements these traits; `snapshot` is
// only the JSON glue the CLI uses between invocations.

mod collection;
mod settings;
mod snapshot;
mod tunnels;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::StoreError;
use crate::model::{NewTunnel, Settings, TunnelConfig, TunnelId};
use crate::stream::SnapshotStream;

pub use settings::MemorySettingsStore;
pub use snapshot::{SnapshotError, StateSnapshot};
pub use tunnels::MemoryTunnelStore;

/// Ordered, shareable list of tunnels as published to subscribers.
pub type TunnelList = Vec<Arc<TunnelConfig>>;

/// Owner of all [`TunnelConfig`] records.
///
/// Implementations must serialize writes and guarantee name uniqueness:
/// `create` with a taken name fails with [`StoreError::DuplicateName`].
pub trait TunnelConfigStore: Send + Sync {
    fn create(&self, tunnel: NewTunnel) -> Result<TunnelConfig, StoreError>;

    /// All tunnels, sorted by `order`.
    fn list(&self) -> Arc<TunnelList>;

    fn get(&self, id: TunnelId) -> Option<Arc<TunnelConfig>>;

    fn find_by_name(&self, name: &str) -> Option<Arc<TunnelConfig>>;

    fn delete(&self, id: TunnelId) -> Result<Arc<TunnelConfig>, StoreError>;

    fn count(&self) -> usize;

    fn subscribe(&self) -> watch::Receiver<Arc<TunnelList>>;

    /// First tunnel in listing order.
    fn first(&self) -> Option<Arc<TunnelConfig>> {
        self.list().first().cloned()
    }

    fn watch(&self) -> SnapshotStream<TunnelList> {
        SnapshotStream::new(self.subscribe())
    }
}

/// Owner of the single [`Settings`] record.
///
/// Updates are whole-value replacements; there is no partial write.
pub trait SettingsStore: Send + Sync {
    fn current(&self) -> Arc<Settings>;

    fn replace(&self, settings: Settings);

    fn subscribe(&self) -> watch::Receiver<Arc<Settings>>;

    fn watch(&self) -> SnapshotStream<Settings> {
        SnapshotStream::new(self.subscribe())
    }
}
