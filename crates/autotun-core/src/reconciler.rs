// ── VPN state reconciler ──
//
// Owns the observable `VpnState`. The controller reports process state
// changes, the statistics poller reports peer counters; each report
// rebuilds the whole snapshot and publishes it. Rebuilds hold the peer
// lock from reading the previous snapshot until the new one is sent, so
// a late statistics report can never resurrect a tunnel that went down.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::VpnBackend;
use crate::health;
use crate::model::{HandshakeStatus, PeerHealth, PeerStats, ProcessState, TunnelConfig, VpnState};
use crate::stream::SnapshotStream;

pub struct VpnStateReconciler {
    state: watch::Sender<Arc<VpnState>>,
    /// Peer keys of the active tunnel's profile. Held for the whole of
    /// every snapshot rebuild.
    known_peers: Mutex<Vec<String>>,
    stale_threshold_secs: u64,
}

impl VpnStateReconciler {
    pub fn new(stale_threshold_secs: u64) -> Self {
        let (state, _) = watch::channel(Arc::new(VpnState::default()));
        Self {
            state,
            known_peers: Mutex::new(Vec::new()),
            stale_threshold_secs,
        }
    }

    pub fn current(&self) -> Arc<VpnState> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotStream<VpnState> {
        SnapshotStream::new(self.state.subscribe())
    }

    pub fn stale_threshold_secs(&self) -> u64 {
        self.stale_threshold_secs
    }

    /// Record a process transition for `tunnel`.
    ///
    /// Going down forgets the tunnel and its peers. Otherwise every peer
    /// of the profile is listed, carrying over counters already known
    /// for the same tunnel.
    pub fn apply_process_state(&self, process_state: ProcessState, tunnel: Option<&TunnelConfig>) {
        let mut known_peers = self.lock_peers();
        let previous = self.current();

        let next = match (process_state, tunnel) {
            (ProcessState::Down, _) | (_, None) => {
                known_peers.clear();
                VpnState {
                    process_state,
                    tunnel: None,
                    peer_stats: BTreeMap::new(),
                }
            }
            (_, Some(tunnel)) => {
                let peers = tunnel.peer_keys();
                known_peers.clone_from(&peers);
                let carried = if previous.tunnel == Some(tunnel.id) {
                    previous.peer_stats.values().cloned().collect()
                } else {
                    Vec::new()
                };
                VpnState {
                    process_state,
                    tunnel: Some(tunnel.id),
                    peer_stats: merge_peers(&peers, carried),
                }
            }
        };

        debug!(state = %next.process_state, tunnel = ?next.tunnel, "vpn state updated");
        self.state.send_replace(Arc::new(next));
    }

    /// Rebuild peer statistics from a backend report.
    ///
    /// The result is the union of the profile's peers and the reported
    /// peers; profile peers the backend did not mention get a
    /// never-handshaked record.
    pub fn apply_statistics(&self, reported: Vec<PeerStats>) {
        let known_peers = self.lock_peers();
        let previous = self.current();
        if previous.process_state == ProcessState::Down {
            return;
        }

        self.state.send_replace(Arc::new(VpnState {
            process_state: previous.process_state,
            tunnel: previous.tunnel,
            peer_stats: merge_peers(&known_peers, reported),
        }));
    }

    /// Classify every peer of the current snapshot.
    pub fn health(&self, now_epoch_secs: i64) -> Vec<PeerHealth> {
        health::classify_all(&self.current(), now_epoch_secs, self.stale_threshold_secs)
    }

    /// Worst peer verdict, `None` when there are no peers.
    pub fn overall_health(&self, now_epoch_secs: i64) -> Option<HandshakeStatus> {
        health::overall(&self.health(now_epoch_secs))
    }

    /// Poll `backend.statistics()` every `interval` while the tunnel is up.
    pub fn spawn_poller(
        self: &Arc<Self>,
        backend: Arc<dyn VpnBackend>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if backend.process_state() != ProcessState::Up {
                            continue;
                        }
                        match backend.statistics().await {
                            Ok(stats) => reconciler.apply_statistics(stats),
                            Err(e) => warn!(error = %e, "statistics poll failed"),
                        }
                    }
                }
            }
            debug!("statistics poller stopped");
        })
    }

    fn lock_peers(&self) -> MutexGuard<'_, Vec<String>> {
        self.known_peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn merge_peers(known: &[String], reported: Vec<PeerStats>) -> BTreeMap<String, PeerStats> {
    let mut merged: BTreeMap<String, PeerStats> = known
        .iter()
        .map(|key| (key.clone(), PeerStats::never(key.as_str())))
        .collect();
    for stats in reported {
        merged.insert(stats.peer_key.clone(), stats);
    }
    merged
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Barrier;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::model::TunnelId;

    fn tunnel_with_peers(keys: &[&str]) -> TunnelConfig {
        let mut text = String::from("[Interface]\nPrivateKey = k\n");
        for key in keys {
            text.push_str(&format!("[Peer]\nPublicKey = {key}\n"));
        }
        TunnelConfig {
            id: TunnelId::new(),
            name: "t".into(),
            profile_text: text,
            order: 0,
        }
    }

    fn stats(key: &str, handshake: i64) -> PeerStats {
        PeerStats {
            peer_key: key.into(),
            latest_handshake_epoch_secs: handshake,
            rx_bytes: 10,
            tx_bytes: 20,
        }
    }

    #[test]
    fn unreported_peers_are_not_started() {
        let rec = VpnStateReconciler::new(180);
        let tunnel = tunnel_with_peers(&["a", "b"]);
        rec.apply_process_state(ProcessState::Up, Some(&tunnel));
        rec.apply_statistics(vec![stats("a", 1_000)]);

        let state = rec.current();
        assert_eq!(state.peer_stats.len(), 2);
        assert_eq!(state.peer_stats["b"], PeerStats::never("b"));

        let health = rec.health(1_010);
        assert_eq!(health[0].status, HandshakeStatus::Healthy);
        assert_eq!(health[1].status, HandshakeStatus::NotStarted);
        assert_eq!(rec.overall_health(1_010), Some(HandshakeStatus::NotStarted));
    }

    #[test]
    fn reported_peers_outside_profile_are_kept() {
        let rec = VpnStateReconciler::new(180);
        rec.apply_process_state(ProcessState::Up, Some(&tunnel_with_peers(&["a"])));
        rec.apply_statistics(vec![stats("z", 5)]);
        let keys: Vec<_> = rec.current().peer_stats.keys().cloned().collect();
        assert_eq!(keys, ["a", "z"]);
    }

    #[test]
    fn going_down_clears_peers() {
        let rec = VpnStateReconciler::new(180);
        rec.apply_process_state(ProcessState::Up, Some(&tunnel_with_peers(&["a"])));
        rec.apply_process_state(ProcessState::Down, None);
        rec.apply_statistics(vec![stats("a", 5)]);

        let state = rec.current();
        assert_eq!(state.process_state, ProcessState::Down);
        assert!(state.peer_stats.is_empty());
        assert_eq!(rec.overall_health(10), None);
    }

    #[test]
    fn late_statistics_never_outlive_going_down() {
        let rec = VpnStateReconciler::new(180);
        let tunnel = tunnel_with_peers(&["a"]);

        for _ in 0..200 {
            rec.apply_process_state(ProcessState::Up, Some(&tunnel));
            let barrier = Barrier::new(2);
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    barrier.wait();
                    rec.apply_statistics(vec![stats("a", 5)]);
                });
                scope.spawn(|| {
                    barrier.wait();
                    rec.apply_process_state(ProcessState::Down, None);
                });
            });

            let state = rec.current();
            assert_eq!(state.process_state, ProcessState::Down);
            assert!(state.peer_stats.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn poller_feeds_statistics_while_up() {
        let backend = Arc::new(SimulatedBackend::new());
        let tunnel = tunnel_with_peers(&["a"]);
        backend.start(&tunnel).await.unwrap();
        backend.set_handshake_age(Some(1));

        let rec = Arc::new(VpnStateReconciler::new(180));
        rec.apply_process_state(ProcessState::Up, Some(&tunnel));
        let mut stream = rec.subscribe();

        let cancel = CancellationToken::new();
        let handle = rec.spawn_poller(backend, Duration::from_secs(1), cancel.clone());

        let state = stream.changed().await.unwrap();
        assert!(state.peer_stats["a"].latest_handshake_epoch_secs > 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
