// ── Handshake health classification ──
//
// Pure functions: peer counters + wall clock + threshold -> verdict.
// The threshold is always passed in; see `ControllerConfig`.

use chrono::Utc;

use crate::model::{HandshakeStatus, PeerHealth, PeerStats, VpnState};

/// Classify one peer's handshake recency.
///
/// - never handshaked (`0`) -> `NotStarted`
/// - handshake in the future (clock skew) -> `Unknown`
/// - `elapsed <= threshold` -> `Healthy`, otherwise `Stale`
pub fn classify(peer: &PeerStats, now_epoch_secs: i64, stale_threshold_secs: u64) -> HandshakeStatus {
    if peer.latest_handshake_epoch_secs == 0 {
        return HandshakeStatus::NotStarted;
    }

    let elapsed = now_epoch_secs.saturating_sub(peer.latest_handshake_epoch_secs);
    let Ok(elapsed) = u64::try_from(elapsed) else {
        return HandshakeStatus::Unknown;
    };

    if elapsed <= stale_threshold_secs {
        HandshakeStatus::Healthy
    } else {
        HandshakeStatus::Stale
    }
}

/// Classify every peer of a snapshot, in peer-key order.
pub fn classify_all(state: &VpnState, now_epoch_secs: i64, stale_threshold_secs: u64) -> Vec<PeerHealth> {
    state
        .peer_stats
        .values()
        .map(|peer| PeerHealth {
            peer_key: peer.peer_key.clone(),
            status: classify(peer, now_epoch_secs, stale_threshold_secs),
            rx_bytes: peer.rx_bytes,
            tx_bytes: peer.tx_bytes,
        })
        .collect()
}

/// Worst verdict across peers, or `None` when there are no peers.
pub fn overall(peers: &[PeerHealth]) -> Option<HandshakeStatus> {
    peers.iter().map(|p| p.status).reduce(HandshakeStatus::worst)
}

/// Current wall clock in Unix seconds.
pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u64 = 180;
    const NOW: i64 = 1_700_000_000;

    fn peer_at(epoch: i64) -> PeerStats {
        PeerStats {
            peer_key: "peer".into(),
            latest_handshake_epoch_secs: epoch,
            rx_bytes: 0,
            tx_bytes: 0,
        }
    }

    #[test]
    fn never_handshaked_is_not_started() {
        assert_eq!(classify(&peer_at(0), NOW, THRESHOLD), HandshakeStatus::NotStarted);
        // Regardless of the clock or threshold.
        assert_eq!(classify(&peer_at(0), 0, 0), HandshakeStatus::NotStarted);
    }

    #[test]
    fn within_threshold_is_healthy() {
        for elapsed in [0, 1, 90, 179, 180] {
            assert_eq!(
                classify(&peer_at(NOW - elapsed), NOW, THRESHOLD),
                HandshakeStatus::Healthy,
                "elapsed = {elapsed}"
            );
        }
    }

    #[test]
    fn beyond_threshold_is_stale() {
        for elapsed in [181, 600, 86_400] {
            assert_eq!(
                classify(&peer_at(NOW - elapsed), NOW, THRESHOLD),
                HandshakeStatus::Stale,
                "elapsed = {elapsed}"
            );
        }
    }

    #[test]
    fn future_handshake_is_unknown() {
        assert_eq!(classify(&peer_at(NOW + 5), NOW, THRESHOLD), HandshakeStatus::Unknown);
    }

    #[test]
    fn overall_picks_worst_peer() {
        let peers = vec![
            PeerHealth {
                peer_key: "a".into(),
                status: HandshakeStatus::Healthy,
                rx_bytes: 0,
                tx_bytes: 0,
            },
            PeerHealth {
                peer_key: "b".into(),
                status: HandshakeStatus::NotStarted,
                rx_bytes: 0,
                tx_bytes: 0,
            },
        ];
        assert_eq!(overall(&peers), Some(HandshakeStatus::NotStarted));
        assert_eq!(overall(&[]), None);
    }
}
