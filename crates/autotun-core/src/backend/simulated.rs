// ── Simulated backend ──
//
// In-process stand-in for the real tunnel. Records every call, can be
// told to fail or to take time, and reports handshakes for the peers
// named in the running profile.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::VpnBackend;
use crate::error::BackendError;
use crate::health::now_epoch_secs;
use crate::model::{PeerStats, ProcessState, TunnelConfig, TunnelId};

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start(TunnelId),
    Stop,
}

#[derive(Debug, Default)]
struct SimState {
    state: ProcessState,
    tunnel: Option<TunnelId>,
    peers: Vec<String>,
    calls: Vec<BackendCall>,
    fail_next_start: Option<BackendError>,
    kernel_support: Option<BackendError>,
    handshake_age_secs: Option<u64>,
    transferred: u64,
}

/// Fake [`VpnBackend`] for tests and `--backend simulated`.
#[derive(Debug, Default)]
pub struct SimulatedBackend {
    inner: Mutex<SimState>,
    latency: Mutex<Duration>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every start/stop received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    pub fn start_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, BackendCall::Start(_)))
            .count()
    }

    /// Make the next `start` fail with `error`.
    pub fn fail_next_start(&self, error: BackendError) {
        self.lock().fail_next_start = Some(error);
    }

    /// Make `check_kernel_support` fail with `error`.
    pub fn deny_kernel_support(&self, error: BackendError) {
        self.lock().kernel_support = Some(error);
    }

    /// Age of the most recent handshake reported for every peer;
    /// `None` reports no handshake yet.
    pub fn set_handshake_age(&self, age_secs: Option<u64>) {
        self.lock().handshake_age_secs = age_secs;
    }

    /// Delay applied to every start and stop.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl VpnBackend for SimulatedBackend {
    async fn start(&self, tunnel: &TunnelConfig) -> Result<ProcessState, BackendError> {
        {
            let mut sim = self.lock();
            sim.calls.push(BackendCall::Start(tunnel.id));
            if sim.state != ProcessState::Down {
                return Err(BackendError::AlreadyRunning);
            }
            sim.state = ProcessState::Transitioning;
            sim.tunnel = Some(tunnel.id);
        }

        self.pause().await;

        let mut sim = self.lock();
        if let Some(err) = sim.fail_next_start.take() {
            sim.state = ProcessState::Down;
            sim.tunnel = None;
            return Err(err);
        }
        sim.state = ProcessState::Up;
        sim.peers = tunnel.peer_keys();
        sim.transferred = 0;
        debug!(tunnel = %tunnel.name, "simulated tunnel up");
        Ok(ProcessState::Up)
    }

    async fn stop(&self) -> Result<(), BackendError> {
        {
            let mut sim = self.lock();
            sim.calls.push(BackendCall::Stop);
            if sim.state == ProcessState::Down {
                return Ok(());
            }
            sim.state = ProcessState::Transitioning;
        }

        self.pause().await;

        let mut sim = self.lock();
        sim.state = ProcessState::Down;
        sim.tunnel = None;
        sim.peers.clear();
        debug!("simulated tunnel down");
        Ok(())
    }

    async fn statistics(&self) -> Result<Vec<PeerStats>, BackendError> {
        let mut sim = self.lock();
        if sim.state != ProcessState::Up {
            return Ok(Vec::new());
        }
        let Some(age) = sim.handshake_age_secs else {
            // No handshake yet: the backend has nothing to report.
            return Ok(Vec::new());
        };

        sim.transferred = sim.transferred.saturating_add(4096);
        let handshake = now_epoch_secs().saturating_sub(i64::try_from(age).unwrap_or(i64::MAX));
        let transferred = sim.transferred;
        Ok(sim
            .peers
            .iter()
            .map(|key| PeerStats {
                peer_key: key.clone(),
                latest_handshake_epoch_secs: handshake,
                rx_bytes: transferred,
                tx_bytes: transferred / 2,
            })
            .collect())
    }

    async fn check_kernel_support(&self) -> Result<(), BackendError> {
        self.lock().kernel_support.clone().map_or(Ok(()), Err)
    }

    fn process_state(&self) -> ProcessState {
        self.lock().state
    }

    fn active_tunnel(&self) -> Option<TunnelId> {
        self.lock().tunnel
    }
}
