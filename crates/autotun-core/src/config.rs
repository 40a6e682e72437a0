// ── Runtime controller configuration ──
//
// Timing and queue tuning for the controller and reconciler. Pure data:
// the CLI (through autotun-config) builds one and hands it in; core never
// reads config files.

use std::time::Duration;

/// Twice the WireGuard rekey-attempt window (90 s).
pub const DEFAULT_STALE_THRESHOLD_SECS: u64 = 180;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Quiet period before a changed desired state is applied.
    pub debounce: Duration,
    /// Seconds since the last handshake after which a peer is stale.
    pub stale_threshold_secs: u64,
    /// Statistics poll interval while a tunnel is up.
    pub stats_interval: Duration,
    /// Pause between stopping one tunnel and starting another on a
    /// manual switch.
    pub toggle_delay: Duration,
    /// Capacity of the controller's inbound event queue.
    pub event_queue_size: usize,
    /// Capacity of the notice broadcast channel.
    pub notice_queue_size: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(3),
            stale_threshold_secs: DEFAULT_STALE_THRESHOLD_SECS,
            stats_interval: Duration::from_secs(1),
            toggle_delay: Duration::from_secs(1),
            event_queue_size: 64,
            notice_queue_size: 256,
        }
    }
}
