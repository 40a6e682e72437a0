// ── Controller event loop ──
//
// Sole consumer of the controller queue. All decision state lives here
// and is only touched by this task. At most one backend transition is
// in flight; anything that arrives meanwhile is remembered and acted on
// when the transition reports back.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ControllerInner, ControllerNotice, ControllerPhase};
use crate::backend::VpnBackend;
use crate::error::{BackendError, CoreError};
use crate::model::{NetworkEvent, ProcessState, Settings, TunnelConfig, TunnelId};
use crate::policy::{self, Desired};

pub(super) type Reply = oneshot::Sender<Result<ProcessState, CoreError>>;

pub(super) enum ControlEvent {
    Network(NetworkEvent),
    Settings(Arc<Settings>),
    Manual(ManualRequest),
    TransitionDone(Result<ProcessState, BackendError>),
    /// Answered once nothing is pending.
    Settle(oneshot::Sender<()>),
}

pub(super) struct ManualRequest {
    pub kind: ManualKind,
    pub reply: Reply,
}

#[derive(Debug, Clone, Copy)]
pub(super) enum ManualKind {
    Start(TunnelId),
    Stop,
}

#[derive(Debug, Clone)]
enum Action {
    Start(Arc<TunnelConfig>),
    Stop,
}

struct InFlight {
    action: Action,
    reply: Option<Reply>,
}

/// What the loop last successfully told the backend to do.
#[derive(Debug, Clone, Copy)]
struct Applied {
    state: ProcessState,
    tunnel: Option<TunnelId>,
}

impl Applied {
    fn satisfies(self, desired: Desired) -> bool {
        match desired {
            Desired::Up => self.state == ProcessState::Up,
            Desired::Down => self.state == ProcessState::Down,
        }
    }
}

pub(super) struct EventLoop {
    inner: Arc<ControllerInner>,
    network: Option<NetworkEvent>,
    settings: Arc<Settings>,
    applied: Applied,
    /// Desired state waiting for the quiet period to elapse.
    debounce: Option<(Desired, Instant)>,
    in_flight: Option<InFlight>,
    manual_queue: VecDeque<ManualRequest>,
    /// Inputs changed while a transition was in flight.
    dirty: bool,
    settle_waiters: Vec<oneshot::Sender<()>>,
}

impl EventLoop {
    pub(super) fn new(inner: Arc<ControllerInner>, state: ProcessState, tunnel: Option<TunnelId>) -> Self {
        let settings = inner.settings.current();
        Self {
            inner,
            network: None,
            settings,
            applied: Applied { state, tunnel },
            debounce: None,
            in_flight: None,
            manual_queue: VecDeque::new(),
            dirty: false,
            settle_waiters: Vec::new(),
        }
    }

    pub(super) async fn run(mut self, mut rx: mpsc::Receiver<ControlEvent>) {
        let cancel = self.inner.cancel.clone();

        loop {
            let deadline = self.debounce.map(|(_, at)| at);
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event);
                }
                () = timer => self.on_debounce_elapsed(),
            }
            self.release_settled();
        }

        for request in self.manual_queue.drain(..) {
            let _ = request.reply.send(Err(CoreError::ControllerStopped));
        }
        debug!("controller event loop stopped");
    }

    fn handle(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Network(network) => {
                self.network = Some(network);
                self.evaluate();
            }
            ControlEvent::Settings(settings) => {
                self.settings = settings;
                self.evaluate();
            }
            ControlEvent::Manual(request) => {
                if self.in_flight.is_some() {
                    debug!(kind = ?request.kind, "transition in flight, queueing manual request");
                    self.manual_queue.push_back(request);
                } else {
                    self.begin_manual(request);
                }
            }
            ControlEvent::TransitionDone(result) => self.finish(result),
            ControlEvent::Settle(waiter) => self.settle_waiters.push(waiter),
        }
    }

    fn release_settled(&mut self) {
        let settled = self.debounce.is_none()
            && self.in_flight.is_none()
            && self.manual_queue.is_empty()
            && !self.dirty;
        if settled {
            for waiter in self.settle_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    // ── Automatic path ───────────────────────────────────────────

    fn evaluate(&mut self) {
        if self.in_flight.is_some() {
            self.dirty = true;
            return;
        }
        self.set_phase(ControllerPhase::Evaluating);

        let desired = self
            .network
            .as_ref()
            .and_then(|network| policy::desired_state(network, &self.settings));

        match desired {
            Some(desired) if !self.applied.satisfies(desired) => {
                let at = Instant::now() + self.inner.config.debounce;
                let restarted = self.debounce.is_some();
                self.debounce = Some((desired, at));
                debug!(%desired, restarted, "debounce armed");
                self.set_phase(ControllerPhase::PendingDebounce);
            }
            _ => {
                if self.debounce.take().is_some() {
                    debug!("pending change cancelled");
                }
                self.set_phase(ControllerPhase::Idle);
            }
        }
    }

    fn on_debounce_elapsed(&mut self) {
        let Some((desired, _)) = self.debounce.take() else {
            return;
        };

        match desired {
            Desired::Up => match self.resolve_tunnel() {
                Some(tunnel) => self.begin(Action::Start(tunnel), None),
                None => {
                    warn!("auto-tunnel wants the tunnel up but none is configured");
                    self.notify(ControllerNotice::PolicyRejected {
                        reason: CoreError::NoTunnelConfigured.to_string(),
                    });
                    self.set_phase(ControllerPhase::Idle);
                }
            },
            Desired::Down => self.begin(Action::Stop, None),
        }
    }

    fn resolve_tunnel(&self) -> Option<Arc<TunnelConfig>> {
        self.settings
            .default_tunnel_id
            .and_then(|id| self.inner.tunnels.get(id))
            .or_else(|| self.inner.tunnels.first())
    }

    // ── Manual path ──────────────────────────────────────────────

    fn begin_manual(&mut self, request: ManualRequest) {
        // An explicit request supersedes whatever was waiting to fire.
        self.debounce = None;

        match request.kind {
            ManualKind::Start(id) => match self.inner.tunnels.get(id) {
                Some(tunnel) => self.begin(Action::Start(tunnel), Some(request.reply)),
                None => {
                    let _ = request.reply.send(Err(CoreError::TunnelNotFound {
                        identifier: id.to_string(),
                    }));
                    self.advance();
                }
            },
            ManualKind::Stop => self.begin(Action::Stop, Some(request.reply)),
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    fn begin(&mut self, action: Action, reply: Option<Reply>) {
        self.set_phase(ControllerPhase::Applying);

        let shown = match &action {
            Action::Start(tunnel) => Some(Arc::clone(tunnel)),
            Action::Stop => self.applied.tunnel.and_then(|id| self.inner.tunnels.get(id)),
        };
        self.inner
            .reconciler
            .apply_process_state(ProcessState::Transitioning, shown.as_deref());

        let backend = Arc::clone(&self.inner.backend);
        let tx = self.inner.event_tx.clone();
        let toggle_delay = self.inner.config.toggle_delay;
        let op = action.clone();
        tokio::spawn(async move {
            let result = perform(backend.as_ref(), &op, toggle_delay).await;
            let _ = tx.send(ControlEvent::TransitionDone(result)).await;
        });

        self.in_flight = Some(InFlight { action, reply });
    }

    fn finish(&mut self, result: Result<ProcessState, BackendError>) {
        let Some(InFlight { action, reply }) = self.in_flight.take() else {
            return;
        };

        match (&action, &result) {
            (Action::Start(tunnel), Ok(state)) => {
                info!(tunnel = %tunnel.name, "tunnel up");
                self.applied = Applied {
                    state: *state,
                    tunnel: Some(tunnel.id),
                };
                self.inner.reconciler.apply_process_state(*state, Some(tunnel));
            }
            (Action::Stop, Ok(_)) => {
                info!("tunnel down");
                self.applied = Applied {
                    state: ProcessState::Down,
                    tunnel: None,
                };
                self.inner.reconciler.apply_process_state(ProcessState::Down, None);
            }
            (Action::Start(tunnel), Err(e)) => {
                warn!(tunnel = %tunnel.name, error = %e, "tunnel start failed");
                self.applied = Applied {
                    state: ProcessState::Down,
                    tunnel: None,
                };
                self.inner.reconciler.apply_process_state(ProcessState::Down, None);
            }
            (Action::Stop, Err(e)) => {
                warn!(error = %e, "tunnel stop failed");
                // Whatever the backend still runs is the truth.
                let state = self.inner.backend.process_state();
                let tunnel = self.inner.backend.active_tunnel();
                self.applied = Applied { state, tunnel };
                let shown = tunnel.and_then(|id| self.inner.tunnels.get(id));
                self.inner.reconciler.apply_process_state(state, shown.as_deref());
            }
        }

        match &result {
            Ok(_) => self.notify(ControllerNotice::Applied {
                state: self.applied.state,
                tunnel: self.applied.tunnel,
            }),
            Err(e) => self.notify(ControllerNotice::BackendFailed { error: e.clone() }),
        }

        if let Some(reply) = reply {
            let _ = reply.send(result.map_err(CoreError::from));
        }

        self.advance();
    }

    /// Pick the next piece of work after a transition or a rejected
    /// manual request.
    fn advance(&mut self) {
        if let Some(request) = self.manual_queue.pop_front() {
            self.begin_manual(request);
        } else if std::mem::take(&mut self.dirty) {
            self.evaluate();
        } else {
            self.set_phase(ControllerPhase::Idle);
        }
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn set_phase(&self, next: ControllerPhase) {
        let previous = self.inner.phase.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "controller phase");
        }
    }

    fn notify(&self, notice: ControllerNotice) {
        // No subscribers is fine.
        let _ = self.inner.notice_tx.send(notice);
    }
}

/// Carry out one transition against the backend.
///
/// Starting while another tunnel is up stops it first and waits
/// `toggle_delay` before starting the new one.
async fn perform(
    backend: &dyn VpnBackend,
    action: &Action,
    toggle_delay: Duration,
) -> Result<ProcessState, BackendError> {
    match action {
        Action::Stop => backend.stop().await.map(|()| ProcessState::Down),
        Action::Start(tunnel) => {
            if backend.process_state() != ProcessState::Down {
                if backend.process_state() == ProcessState::Up
                    && backend.active_tunnel() == Some(tunnel.id)
                {
                    return Ok(ProcessState::Up);
                }
                backend.stop().await?;
                tokio::time::sleep(toggle_delay).await;
            }
            backend.start(tunnel).await
        }
    }
}
