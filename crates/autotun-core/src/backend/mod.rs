// ── VPN backend capability ──
//
// The controller never touches a network interface itself. Everything
// that brings a tunnel up or down goes through `VpnBackend`, which owns
// the interface lifecycle. Production uses `wg-quick`; tests and dry
// runs use the in-process simulation.

mod simulated;
mod wg_quick;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::model::{PeerStats, ProcessState, TunnelConfig, TunnelId};

pub use simulated::{BackendCall, SimulatedBackend};
pub use wg_quick::{WgQuickBackend, parse_dump};

/// Start/stop/statistics capability over the single physical tunnel.
///
/// At most one tunnel is up at a time; `start` while another tunnel is
/// up fails with [`BackendError::AlreadyRunning`]. `stop` on an idle
/// backend is a no-op.
#[async_trait]
pub trait VpnBackend: Send + Sync {
    async fn start(&self, tunnel: &TunnelConfig) -> Result<ProcessState, BackendError>;

    async fn stop(&self) -> Result<(), BackendError>;

    /// Per-peer counters for the running tunnel. Empty when down.
    async fn statistics(&self) -> Result<Vec<PeerStats>, BackendError>;

    /// Whether the host can run the tunnel in kernel mode.
    async fn check_kernel_support(&self) -> Result<(), BackendError>;

    fn process_state(&self) -> ProcessState;

    /// Tunnel currently owned by the backend, if any.
    fn active_tunnel(&self) -> Option<TunnelId>;
}
