#![allow(clippy::unwrap_used)]

// Integration tests for the auto-tunnel controller.
//
// Time is paused, so debounce windows and backend latency advance only
// when every task is idle and the runtime skips ahead.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use autotun_core::{
    AutoTunnelController, BackendCall, BackendError, ControllerConfig, ControllerNotice,
    ControllerPhase, CoreError, MemorySettingsStore, MemoryTunnelStore, NetworkEvent,
    ProcessState, Settings, SettingsStore, ShortcutAction, SimulatedBackend, TunnelConfig,
    TunnelConfigStore, VpnBackend,
};

const DEBOUNCE: Duration = Duration::from_secs(3);

fn profile(peer: &str) -> String {
    format!(
        "[Interface]\nPrivateKey = cHJpdmF0ZQ==\nAddress = 10.8.0.2/32\n\n\
         [Peer]\nPublicKey = {peer}\nAllowedIPs = 0.0.0.0/0\nEndpoint = vpn.example.net:51820\n"
    )
}

struct Rig {
    ctrl: AutoTunnelController,
    backend: Arc<SimulatedBackend>,
    tunnels: Arc<MemoryTunnelStore>,
    settings: Arc<MemorySettingsStore>,
}

impl Rig {
    fn new() -> Self {
        let backend = Arc::new(SimulatedBackend::new());
        let tunnels = Arc::new(MemoryTunnelStore::new());
        let settings = Arc::new(MemorySettingsStore::default());
        let config = ControllerConfig {
            debounce: DEBOUNCE,
            toggle_delay: Duration::from_secs(1),
            ..ControllerConfig::default()
        };
        let ctrl = AutoTunnelController::new(
            config,
            backend.clone(),
            tunnels.clone(),
            settings.clone(),
        );
        Self {
            ctrl,
            backend,
            tunnels,
            settings,
        }
    }

    fn add_tunnel(&self, name: &str) -> TunnelConfig {
        self.ctrl
            .importer()
            .import_single(name, &profile(&format!("{name}-peer=")))
            .unwrap()
    }

    /// One tunnel, auto-tunnel armed, "Home" trusted.
    fn armed() -> (Self, TunnelConfig) {
        let rig = Self::new();
        let tunnel = rig.add_tunnel("office");
        let svc = rig.ctrl.settings_service();
        svc.add_trusted_ssid("Home").unwrap();
        svc.set_auto_tunnel(true).unwrap();
        (rig, tunnel)
    }
}

async fn next_notice(rx: &mut broadcast::Receiver<ControllerNotice>) -> ControllerNotice {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("no notice within a minute")
        .unwrap()
}

// ── Automatic path ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn flapping_within_debounce_window_starts_once() {
    let (rig, tunnel) = Rig::armed();
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    for ssid in ["Cafe", "Home", "Cafe"] {
        rig.ctrl.on_network_event(NetworkEvent::wifi(ssid)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel: Some(tunnel.id),
        }
    );
    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(rig.backend.calls(), vec![BackendCall::Start(tunnel.id)]);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn trusted_network_keeps_tunnel_down() {
    let (rig, tunnel) = Rig::armed();
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    rig.ctrl.on_network_event(NetworkEvent::wifi("Home")).await.unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(rig.backend.start_count(), 0);

    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel: Some(tunnel.id),
        }
    );

    // Back home: the tunnel comes down again.
    rig.ctrl.on_network_event(NetworkEvent::wifi("Home")).await.unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Down,
            tunnel: None,
        }
    );
    assert_eq!(rig.ctrl.reconciler().current().process_state, ProcessState::Down);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn debounce_is_observable_as_a_phase() {
    let (rig, _) = Rig::armed();
    rig.ctrl.start().await;
    let mut phase = rig.ctrl.phase();

    rig.ctrl.on_network_event(NetworkEvent::mobile()).await.unwrap();
    rig.ctrl.settings_service().set_tunnel_on_mobile(true).unwrap();

    phase
        .wait_for(|p| *p == ControllerPhase::PendingDebounce)
        .await
        .unwrap();
    phase.wait_for(|p| *p == ControllerPhase::Idle).await.unwrap();
    assert_eq!(rig.backend.start_count(), 1);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn change_during_transition_is_applied_afterwards() {
    let (rig, tunnel) = Rig::armed();
    rig.backend.set_latency(Duration::from_secs(5));
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    // Debounce elapses at 3 s, the start is in flight until 8 s.
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(rig.backend.process_state(), ProcessState::Transitioning);
    rig.ctrl.on_network_event(NetworkEvent::wifi("Home")).await.unwrap();

    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel: Some(tunnel.id),
        }
    );
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Down,
            tunnel: None,
        }
    );
    assert_eq!(
        rig.backend.calls(),
        vec![BackendCall::Start(tunnel.id), BackendCall::Stop]
    );

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_start_reports_and_reverts_to_down() {
    let (rig, _) = Rig::armed();
    rig.backend.fail_next_start(BackendError::PermissionDenied);
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::BackendFailed {
            error: BackendError::PermissionDenied,
        }
    );
    assert_eq!(rig.ctrl.reconciler().current().process_state, ProcessState::Down);

    // No automatic retry.
    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(rig.backend.start_count(), 1);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn always_on_without_tunnel_is_rejected_at_apply_time() {
    let rig = Rig::new();
    rig.settings.replace(Settings {
        is_always_on_enabled: true,
        ..Settings::default()
    });
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    rig.ctrl.on_network_event(NetworkEvent::ethernet()).await.unwrap();
    assert!(matches!(
        next_notice(&mut notices).await,
        ControllerNotice::PolicyRejected { .. }
    ));
    assert_eq!(rig.backend.start_count(), 0);

    rig.ctrl.shutdown().await;
}

// ── Manual path ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn manual_switch_stops_then_starts() {
    let rig = Rig::new();
    let a = rig.add_tunnel("alpha");
    let b = rig.add_tunnel("bravo");
    rig.ctrl.start().await;

    assert_eq!(rig.ctrl.on_user_start(a.id).await.unwrap(), ProcessState::Up);
    assert_eq!(rig.ctrl.on_user_start(b.id).await.unwrap(), ProcessState::Up);

    assert_eq!(
        rig.backend.calls(),
        vec![
            BackendCall::Start(a.id),
            BackendCall::Stop,
            BackendCall::Start(b.id),
        ]
    );
    let state = rig.ctrl.reconciler().current();
    assert_eq!(state.tunnel, Some(b.id));
    assert!(state.peer_stats.contains_key("bravo-peer="));

    rig.ctrl.on_user_stop().await.unwrap();
    assert_eq!(rig.backend.process_state(), ProcessState::Down);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_start_counts_as_applied_for_automation() {
    let (rig, tunnel) = Rig::armed();
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    rig.ctrl.on_user_start(tunnel.id).await.unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel: Some(tunnel.id),
        }
    );

    // Already up: an untrusted network changes nothing.
    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(rig.backend.start_count(), 1);

    rig.ctrl.on_network_event(NetworkEvent::wifi("Home")).await.unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Down,
            tunnel: None,
        }
    );
    tokio::time::sleep(DEBOUNCE * 2).await;
    assert_eq!(
        rig.backend.calls(),
        vec![BackendCall::Start(tunnel.id), BackendCall::Stop]
    );

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_stop_lets_automation_start_again() {
    let (rig, tunnel) = Rig::armed();
    rig.ctrl.start().await;

    rig.ctrl.on_user_start(tunnel.id).await.unwrap();
    rig.ctrl.on_user_stop().await.unwrap();
    assert_eq!(rig.backend.process_state(), ProcessState::Down);

    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    rig.ctrl.settled().await.unwrap();

    assert_eq!(
        rig.backend.calls(),
        vec![
            BackendCall::Start(tunnel.id),
            BackendCall::Stop,
            BackendCall::Start(tunnel.id),
        ]
    );
    assert_eq!(rig.backend.process_state(), ProcessState::Up);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_requests_wait_for_in_flight_transition() {
    let rig = Rig::new();
    let a = rig.add_tunnel("alpha");
    rig.backend.set_latency(Duration::from_secs(2));
    rig.ctrl.start().await;

    let starter = {
        let ctrl = rig.ctrl.clone();
        tokio::spawn(async move { ctrl.on_user_start(a.id).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    rig.ctrl.on_user_stop().await.unwrap();

    assert_eq!(starter.await.unwrap().unwrap(), ProcessState::Up);
    assert_eq!(
        rig.backend.calls(),
        vec![BackendCall::Start(a.id), BackendCall::Stop]
    );

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn manual_start_failure_surfaces_to_caller() {
    let rig = Rig::new();
    let a = rig.add_tunnel("alpha");
    rig.backend.fail_next_start(BackendError::StartFailed {
        reason: "no route".into(),
    });
    rig.ctrl.start().await;

    let err = rig.ctrl.on_user_start(a.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Backend(BackendError::StartFailed { .. })));
    assert_eq!(rig.ctrl.reconciler().current().process_state, ProcessState::Down);

    rig.ctrl.shutdown().await;
}

#[tokio::test]
async fn requests_before_start_are_refused() {
    let rig = Rig::new();
    assert!(matches!(
        rig.ctrl.on_network_event(NetworkEvent::mobile()).await,
        Err(CoreError::ControllerStopped)
    ));
    assert!(matches!(
        rig.ctrl.start_default().await,
        Err(CoreError::NoTunnelConfigured)
    ));
}

// ── Shortcuts and deletion ───────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shortcuts_run_detached_only_when_enabled() {
    let rig = Rig::new();
    let a = rig.add_tunnel("alpha");
    rig.ctrl.start().await;
    let mut notices = rig.ctrl.subscribe_notices();

    assert!(matches!(
        rig.ctrl.dispatch_shortcut(ShortcutAction::Start(None)),
        Err(CoreError::ShortcutsDisabled)
    ));

    rig.ctrl.settings_service().set_shortcuts(true).unwrap();
    rig.ctrl.dispatch_shortcut(ShortcutAction::Start(None)).unwrap();
    assert_eq!(
        next_notice(&mut notices).await,
        ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel: Some(a.id),
        }
    );

    for _ in 0..50 {
        if rig.ctrl.shortcuts_in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(rig.ctrl.shortcuts_in_flight(), 0);

    rig.ctrl.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deleting_running_sole_tunnel_stops_and_disarms() {
    let (rig, tunnel) = Rig::armed();
    rig.ctrl.start().await;
    rig.ctrl.on_user_start(tunnel.id).await.unwrap();

    rig.ctrl.tunnel_service().delete(tunnel.id).await.unwrap();

    assert_eq!(rig.backend.process_state(), ProcessState::Down);
    assert_eq!(rig.tunnels.count(), 0);
    let s = rig.settings.current();
    assert!(!s.is_auto_tunnel_enabled);
    assert!(!s.is_always_on_enabled);
    assert_eq!(s.default_tunnel_id, None);

    rig.ctrl.shutdown().await;
}

// ── Settling ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn settled_waits_for_debounce_and_transition() {
    let (rig, tunnel) = Rig::armed();
    rig.backend.set_latency(Duration::from_secs(2));
    rig.ctrl.start().await;

    rig.ctrl.on_network_event(NetworkEvent::wifi("Cafe")).await.unwrap();
    rig.ctrl.settled().await.unwrap();

    assert_eq!(rig.backend.process_state(), ProcessState::Up);
    assert_eq!(rig.backend.active_tunnel(), Some(tunnel.id));
    assert_eq!(*rig.ctrl.phase().borrow(), ControllerPhase::Idle);

    rig.ctrl.shutdown().await;
    assert!(matches!(rig.ctrl.settled().await, Err(CoreError::ControllerStopped)));
}
