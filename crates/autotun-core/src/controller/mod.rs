// ── Auto-tunnel controller ──
//
// The single control point for the tunnel. Network events, settings
// changes, manual requests and backend completions all arrive on one
// mpsc queue and are handled by one event-loop task, so decisions never
// race. Backend calls run on their own tasks and report back through
// the same queue.

mod event_loop;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::VpnBackend;
use crate::config::ControllerConfig;
use crate::error::{BackendError, CoreError};
use crate::import::TunnelImporter;
use crate::model::{NetworkEvent, ProcessState, Settings, TunnelConfig, TunnelId};
use crate::reconciler::VpnStateReconciler;
use crate::service::{SettingsService, TunnelService};
use crate::store::{SettingsStore, TunnelConfigStore};
use crate::stream::SnapshotStream;
use crate::task::{CompletionGuard, spawn_detached};

use self::event_loop::{ControlEvent, EventLoop, ManualKind, ManualRequest};

// ── Observable types ─────────────────────────────────────────────

/// Where the event loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ControllerPhase {
    Idle,
    Evaluating,
    PendingDebounce,
    Applying,
}

/// Outcomes published to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerNotice {
    /// A transition finished and the applied state changed.
    Applied {
        state: ProcessState,
        tunnel: Option<TunnelId>,
    },
    /// The backend refused a transition; the applied state reverted.
    BackendFailed { error: BackendError },
    /// The policy wanted a change that could not be carried out.
    PolicyRejected { reason: String },
}

/// Start/stop request arriving from outside the app (launcher shortcut,
/// automation tool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    /// Start the given tunnel, or the default one.
    Start(Option<TunnelId>),
    Stop,
}

// ── Controller ───────────────────────────────────────────────────

/// Handle to the auto-tunnel controller.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Nothing runs until
/// [`start()`](Self::start) spawns the event loop.
#[derive(Clone)]
pub struct AutoTunnelController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    config: ControllerConfig,
    backend: Arc<dyn VpnBackend>,
    tunnels: Arc<dyn TunnelConfigStore>,
    settings: Arc<dyn SettingsStore>,
    reconciler: Arc<VpnStateReconciler>,
    /// Serializes read-modify-write cycles on the settings record.
    settings_gate: std::sync::Mutex<()>,
    phase: watch::Sender<ControllerPhase>,
    notice_tx: broadcast::Sender<ControllerNotice>,
    event_tx: mpsc::Sender<ControlEvent>,
    event_rx: Mutex<Option<mpsc::Receiver<ControlEvent>>>,
    running: AtomicBool,
    shortcuts_in_flight: Arc<AtomicUsize>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AutoTunnelController {
    pub fn new(
        config: ControllerConfig,
        backend: Arc<dyn VpnBackend>,
        tunnels: Arc<dyn TunnelConfigStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let reconciler = Arc::new(VpnStateReconciler::new(config.stale_threshold_secs));
        let (phase, _) = watch::channel(ControllerPhase::Idle);
        let (notice_tx, _) = broadcast::channel(config.notice_queue_size.max(1));
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_size.max(1));

        Self {
            inner: Arc::new(ControllerInner {
                config,
                backend,
                tunnels,
                settings,
                reconciler,
                settings_gate: std::sync::Mutex::new(()),
                phase,
                notice_tx,
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                running: AtomicBool::new(false),
                shortcuts_in_flight: Arc::new(AtomicUsize::new(0)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn reconciler(&self) -> &Arc<VpnStateReconciler> {
        &self.inner.reconciler
    }

    pub fn tunnels(&self) -> &Arc<dyn TunnelConfigStore> {
        &self.inner.tunnels
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.inner.settings
    }

    pub fn backend(&self) -> &Arc<dyn VpnBackend> {
        &self.inner.backend
    }

    pub fn settings_service(&self) -> SettingsService {
        SettingsService::new(self.clone())
    }

    pub fn tunnel_service(&self) -> TunnelService {
        TunnelService::new(self.clone())
    }

    pub fn importer(&self) -> TunnelImporter {
        TunnelImporter::new(Arc::clone(&self.inner.tunnels))
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn the event loop, the settings watcher and the statistics
    /// poller. Calling it again is a no-op.
    pub async fn start(&self) {
        let Some(rx) = self.inner.event_rx.lock().await.take() else {
            return;
        };

        let backend_state = self.inner.backend.process_state();
        let active = self
            .inner
            .backend
            .active_tunnel()
            .and_then(|id| self.inner.tunnels.get(id));
        self.inner
            .reconciler
            .apply_process_state(backend_state, active.as_deref());

        let mut handles = self.inner.task_handles.lock().await;
        let event_loop = EventLoop::new(Arc::clone(&self.inner), backend_state, active.map(|t| t.id));
        handles.push(tokio::spawn(event_loop.run(rx)));
        handles.push(tokio::spawn(settings_watch_task(
            self.inner.event_tx.clone(),
            self.inner.settings.watch(),
            self.inner.cancel.clone(),
        )));
        handles.push(self.inner.reconciler.spawn_poller(
            Arc::clone(&self.inner.backend),
            self.inner.config.stats_interval,
            self.inner.cancel.clone(),
        ));

        self.inner.running.store(true, Ordering::SeqCst);
        info!(state = %backend_state, "auto-tunnel controller started");
    }

    /// Stop background tasks and wait for them. The tunnel itself is
    /// left as it is; a transition already handed to the backend runs
    /// to completion on its own.
    pub async fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("auto-tunnel controller stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // ── Inputs ───────────────────────────────────────────────────

    /// Report the currently active network. The latest event wins.
    pub async fn on_network_event(&self, event: NetworkEvent) -> Result<(), CoreError> {
        debug!(category = %event.category, ssid = ?event.ssid, "network event");
        self.send(ControlEvent::Network(event)).await
    }

    /// Push a settings snapshot directly. Changes written through the
    /// settings store are picked up without calling this.
    pub async fn on_settings_changed(&self, settings: Arc<Settings>) -> Result<(), CoreError> {
        self.send(ControlEvent::Settings(settings)).await
    }

    /// Bring up `tunnel`, switching away from any other running tunnel.
    /// Resolves once the backend has finished.
    pub async fn on_user_start(&self, tunnel: TunnelId) -> Result<ProcessState, CoreError> {
        self.manual(ManualKind::Start(tunnel)).await
    }

    /// Bring the tunnel down. Resolves once the backend has finished.
    pub async fn on_user_stop(&self) -> Result<(), CoreError> {
        self.manual(ManualKind::Stop).await.map(drop)
    }

    /// Start the default tunnel, or the first one if none is set.
    pub async fn start_default(&self) -> Result<ProcessState, CoreError> {
        let tunnel = self.default_or_first().ok_or(CoreError::NoTunnelConfigured)?;
        self.on_user_start(tunnel.id).await
    }

    /// Handle an external shortcut request in the background.
    ///
    /// Rejected with [`CoreError::ShortcutsDisabled`] unless shortcuts
    /// are enabled. The request runs as a detached task that cannot be
    /// cancelled; its completion guard fires on every exit path.
    pub fn dispatch_shortcut(&self, action: ShortcutAction) -> Result<(), CoreError> {
        if !self.inner.settings.current().shortcuts_enabled {
            return Err(CoreError::ShortcutsDisabled);
        }
        if !self.is_running() {
            return Err(CoreError::ControllerStopped);
        }

        let counter = Arc::clone(&self.inner.shortcuts_in_flight);
        counter.fetch_add(1, Ordering::SeqCst);
        let guard = CompletionGuard::new("shortcut", move || {
            counter.fetch_sub(1, Ordering::SeqCst);
        });

        let ctrl = self.clone();
        spawn_detached(guard, async move {
            let result = match action {
                ShortcutAction::Start(Some(id)) => ctrl.on_user_start(id).await.map(drop),
                ShortcutAction::Start(None) => ctrl.start_default().await.map(drop),
                ShortcutAction::Stop => ctrl.on_user_stop().await,
            };
            if let Err(e) = result {
                warn!(?action, error = %e, "shortcut request failed");
            }
        });
        Ok(())
    }

    /// Resolve once the controller has nothing pending: no debounce
    /// armed, no transition in flight and no queued manual request.
    pub async fn settled(&self) -> Result<(), CoreError> {
        let (tx, rx) = oneshot::channel();
        self.send(ControlEvent::Settle(tx)).await?;
        rx.await.map_err(|_| CoreError::ControllerStopped)
    }

    // ── Outputs ──────────────────────────────────────────────────

    pub fn phase(&self) -> watch::Receiver<ControllerPhase> {
        self.inner.phase.subscribe()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<ControllerNotice> {
        self.inner.notice_tx.subscribe()
    }

    /// Shortcut requests that have not finished yet.
    pub fn shortcuts_in_flight(&self) -> usize {
        self.inner.shortcuts_in_flight.load(Ordering::SeqCst)
    }

    // ── Internals shared with the services ───────────────────────

    /// The configured default tunnel, else the first stored one.
    pub(crate) fn default_or_first(&self) -> Option<Arc<TunnelConfig>> {
        let settings = self.inner.settings.current();
        settings
            .default_tunnel_id
            .and_then(|id| self.inner.tunnels.get(id))
            .or_else(|| self.inner.tunnels.first())
    }

    /// Run `f` against the current settings and store its result, under
    /// the settings gate. `f` returning an error leaves settings as they
    /// were.
    pub(crate) fn update_settings(
        &self,
        f: impl FnOnce(&Settings) -> Result<Settings, CoreError>,
    ) -> Result<Arc<Settings>, CoreError> {
        let _gate = self
            .inner
            .settings_gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let next = f(&self.inner.settings.current())?;
        self.inner.settings.replace(next);
        Ok(self.inner.settings.current())
    }

    async fn manual(&self, kind: ManualKind) -> Result<ProcessState, CoreError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControlEvent::Manual(ManualRequest { kind, reply })).await?;
        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }

    async fn send(&self, event: ControlEvent) -> Result<(), CoreError> {
        if !self.is_running() {
            return Err(CoreError::ControllerStopped);
        }
        self.inner
            .event_tx
            .send(event)
            .await
            .map_err(|_| CoreError::ControllerStopped)
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Forward every settings replacement into the event queue.
async fn settings_watch_task(
    tx: mpsc::Sender<ControlEvent>,
    mut settings: SnapshotStream<Settings>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = settings.changed() => {
                let Some(next) = next else { break };
                if tx.send(ControlEvent::Settings(next)).await.is_err() {
                    break;
                }
            }
        }
    }
}
