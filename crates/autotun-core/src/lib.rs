// autotun-core: auto-tunnel decision engine, handshake health and tunnel import.

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod health;
pub mod import;
pub mod model;
pub mod policy;
pub mod profile;
pub mod reconciler;
pub mod service;
pub mod store;
pub mod stream;
pub mod task;

// ── Primary re-exports ──────────────────────────────────────────────
pub use backend::{BackendCall, SimulatedBackend, VpnBackend, WgQuickBackend};
pub use config::ControllerConfig;
pub use controller::{AutoTunnelController, ControllerNotice, ControllerPhase, ShortcutAction};
pub use error::{BackendError, CoreError, ImportError, StoreError};
pub use import::{ImportReport, TunnelImporter};
pub use policy::Desired;
pub use reconciler::VpnStateReconciler;
pub use service::{SettingsService, TunnelService};
pub use store::{
    MemorySettingsStore, MemoryTunnelStore, SettingsStore, SnapshotError, StateSnapshot,
    TunnelConfigStore, TunnelList,
};
pub use stream::SnapshotStream;

// Re-export model types at the crate root for ergonomics.
pub use model::{
    HandshakeStatus, NetworkCategory, NetworkEvent, NewTunnel, PeerHealth, PeerStats,
    ProcessState, Settings, TunnelConfig, TunnelId, VpnState,
};
