//! Manual up/down and status.

use chrono::DateTime;
use serde::Serialize;
use tabled::Tabled;

use autotun_core::health::now_epoch_secs;
use autotun_core::{HandshakeStatus, PeerHealth, ProcessState};

use crate::cli::GlobalOpts;
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Up / down ───────────────────────────────────────────────────────

pub async fn up(session: &Session, tunnel: Option<&str>, global: &GlobalOpts) -> Result<(), CliError> {
    let target = tunnel.map(|t| util::resolve_tunnel(session, t)).transpose()?;
    let ctrl = &session.ctrl;

    ctrl.start().await;
    let result = match &target {
        Some(t) => ctrl.on_user_start(t.id).await,
        None => ctrl.start_default().await,
    };
    ctrl.shutdown().await;
    let state = result?;

    let name = util::tunnel_label(session, ctrl.backend().active_tunnel());
    output::notice(&format!("Tunnel '{name}' is {state}"), global.quiet);
    Ok(())
}

pub async fn down(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let ctrl = &session.ctrl;
    ctrl.start().await;
    let result = ctrl.on_user_stop().await;
    ctrl.shutdown().await;
    result?;

    output::notice("Tunnel is down", global.quiet);
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StatusReport {
    state: ProcessState,
    tunnel: Option<String>,
    health: Option<HandshakeStatus>,
    peers: Vec<PeerReport>,
}

#[derive(Debug, Serialize)]
struct PeerReport {
    #[serde(flatten)]
    health: PeerHealth,
    latest_handshake: Option<String>,
}

#[derive(Tabled)]
struct PeerRow {
    #[tabled(rename = "Peer")]
    peer: String,
    #[tabled(rename = "Health")]
    health: String,
    #[tabled(rename = "Last handshake")]
    handshake: String,
    #[tabled(rename = "Rx")]
    rx: u64,
    #[tabled(rename = "Tx")]
    tx: u64,
}

pub async fn status(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let ctrl = &session.ctrl;
    let backend = ctrl.backend();
    let reconciler = ctrl.reconciler();

    let active = backend.active_tunnel().and_then(|id| ctrl.tunnels().get(id));
    let state = backend.process_state();
    reconciler.apply_process_state(state, active.as_deref());
    if state == ProcessState::Up {
        let stats = backend.statistics().await?;
        reconciler.apply_statistics(stats);
    }

    let now = now_epoch_secs();
    let snapshot = reconciler.current();
    let report = StatusReport {
        state,
        tunnel: active.as_ref().map(|t| t.name.clone()),
        health: reconciler.overall_health(now),
        peers: reconciler
            .health(now)
            .into_iter()
            .map(|health| {
                let latest_handshake = snapshot
                    .peer_stats
                    .get(&health.peer_key)
                    .map(|s| s.latest_handshake_epoch_secs)
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .map(|at| at.to_rfc3339());
                PeerReport {
                    health,
                    latest_handshake,
                }
            })
            .collect(),
    };

    let color = session.color;
    let out = output::render_single(
        &global.output,
        &report,
        |r| detail(r, color),
        |r| r.state.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn detail(report: &StatusReport, color: bool) -> String {
    let mut lines = vec![output::render_pairs(&[
        ("state", output::paint_state(report.state, color)),
        ("tunnel", report.tunnel.clone().unwrap_or_else(|| "-".into())),
        (
            "health",
            report
                .health
                .map_or_else(|| "-".into(), |h| output::paint_health(h, color)),
        ),
    ])];

    if !report.peers.is_empty() {
        let rows: Vec<PeerRow> = report
            .peers
            .iter()
            .map(|p| PeerRow {
                peer: p.health.peer_key.clone(),
                health: output::paint_health(p.health.status, color),
                handshake: p.latest_handshake.clone().unwrap_or_else(|| "never".into()),
                rx: p.health.rx_bytes,
                tx: p.health.tx_bytes,
            })
            .collect();
        lines.push(output::render_table(&rows));
    }
    lines.join("\n")
}
