// ── On-disk state snapshot ──
//
// JSON glue so a short-lived process can carry settings and tunnels
// across invocations. Writes go to a sibling temp file and are renamed
// into place, so readers never observe a half-written file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{MemorySettingsStore, MemoryTunnelStore, SettingsStore, TunnelConfigStore};
use crate::model::{Settings, TunnelConfig};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("State file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the collaborator stores hold, in one serializable value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub settings: Settings,
    pub tunnels: Vec<TunnelConfig>,
}

impl StateSnapshot {
    /// Read a snapshot; a missing file yields the empty default.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no state file, starting empty");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_slice(&raw).map_err(|source| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_err = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body = serde_json::to_vec_pretty(self).map_err(|source| SnapshotError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;
        debug!(path = %path.display(), tunnels = self.tunnels.len(), "state saved");
        Ok(())
    }

    /// Build live stores seeded from this snapshot.
    ///
    /// Settings are checked against the tunnels that survive the restore:
    /// with no tunnels automation is disarmed, and a default that is
    /// missing (or absent while automation is armed) moves to the first
    /// tunnel.
    pub fn into_stores(self) -> (MemorySettingsStore, MemoryTunnelStore) {
        let tunnels = MemoryTunnelStore::from_tunnels(self.tunnels);
        let mut settings = self.settings;

        if tunnels.count() == 0 {
            settings = settings.without_tunnels();
        } else {
            let dangling = settings.default_tunnel_id.is_some_and(|id| tunnels.get(id).is_none());
            let armed = settings.is_auto_tunnel_enabled || settings.is_always_on_enabled;
            if dangling || (armed && settings.default_tunnel_id.is_none()) {
                warn!(
                    default = ?settings.default_tunnel_id,
                    "restored default tunnel is missing, using the first tunnel"
                );
                settings.default_tunnel_id = tunnels.first().map(|t| t.id);
            }
        }

        (MemorySettingsStore::new(settings), tunnels)
    }

    /// Capture the current contents of live stores.
    pub fn capture(settings: &MemorySettingsStore, tunnels: &MemoryTunnelStore) -> Self {
        Self {
            settings: (*settings.current()).clone(),
            tunnels: tunnels.to_vec(),
        }
    }
}
