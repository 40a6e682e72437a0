// ── Domain model ──
//
// Canonical types shared by the controller, the import pipeline, the
// reconciler and every caller. All of them are plain data: cloning is
// cheap and nothing here touches a backend or a store.

pub mod network;
pub mod settings;
pub mod tunnel;
pub mod vpn;

// ── Re-exports ──────────────────────────────────────────────────────

pub use network::{NetworkCategory, NetworkEvent};
pub use settings::Settings;
pub use tunnel::{NewTunnel, TunnelConfig, TunnelId};
pub use vpn::{HandshakeStatus, PeerHealth, PeerStats, ProcessState, VpnState};
