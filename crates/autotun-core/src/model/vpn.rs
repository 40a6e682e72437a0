// ── VPN runtime state ──

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::Display;

use super::tunnel::TunnelId;

/// Lifecycle of the single tunnel process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProcessState {
    #[default]
    Down,
    Up,
    Transitioning,
}

/// Raw per-peer counters as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStats {
    pub peer_key: String,
    /// Unix seconds of the latest completed handshake; `0` means never.
    pub latest_handshake_epoch_secs: i64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl PeerStats {
    /// A peer the backend has not reported on yet.
    pub fn never(peer_key: impl Into<String>) -> Self {
        Self {
            peer_key: peer_key.into(),
            latest_handshake_epoch_secs: 0,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }
}

/// Snapshot of the tunnel as observed by the reconciler.
///
/// Rebuilt wholesale on every backend notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpnState {
    pub process_state: ProcessState,
    /// The tunnel the process state refers to, if any.
    pub tunnel: Option<TunnelId>,
    pub peer_stats: BTreeMap<String, PeerStats>,
}

/// Liveness verdict for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HandshakeStatus {
    NotStarted,
    Healthy,
    Stale,
    Unknown,
}

impl HandshakeStatus {
    /// Ordering used to pick the worst verdict across peers.
    fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::NotStarted => 1,
            Self::Unknown => 2,
            Self::Stale => 3,
        }
    }

    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

/// Classified view of a single peer, for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHealth {
    pub peer_key: String,
    pub status: HandshakeStatus,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}
