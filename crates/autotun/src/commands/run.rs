//! `autotun run`: feed network changes from stdin into the controller
//! and report what it does.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use autotun_core::{ControllerNotice, NetworkCategory, NetworkEvent, ProcessState};

use crate::cli::GlobalOpts;
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

/// Parse one observer line. `Ok(None)` for blank lines and comments.
pub fn parse_event(line: &str) -> Result<Option<NetworkEvent>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));
    let category: NetworkCategory = word
        .parse()
        .map_err(|_| format!("unknown network kind '{word}'"))?;

    let event = match category {
        NetworkCategory::Wifi if rest.is_empty() => {
            return Err("wifi needs an SSID".into());
        }
        NetworkCategory::Wifi => NetworkEvent::wifi(rest),
        NetworkCategory::Mobile => NetworkEvent::mobile(),
        NetworkCategory::Ethernet => NetworkEvent::ethernet(),
        NetworkCategory::None => NetworkEvent::disconnected(),
    };
    Ok(Some(event))
}

pub async fn handle(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let ctrl = &session.ctrl;
    let mut notices = ctrl.subscribe_notices();
    ctrl.start().await;
    info!("reading network events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result: Result<(), CliError> = loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_event(&line) {
                    Ok(Some(event)) => {
                        if let Err(e) = ctrl.on_network_event(event).await {
                            break Err(e.into());
                        }
                    }
                    Ok(None) => {}
                    Err(reason) => warn!(line = %line, %reason, "ignoring line"),
                },
                // Input closed: let pending changes play out, then stop.
                Ok(None) => break ctrl.settled().await.map_err(CliError::from),
                Err(e) => break Err(e.into()),
            },
            notice = notices.recv() => report(session, notice, global),
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    ctrl.shutdown().await;
    while let Ok(notice) = notices.try_recv() {
        report(session, Ok(notice), global);
    }
    session.save()?;
    result
}

fn report(
    session: &Session,
    notice: Result<ControllerNotice, broadcast::error::RecvError>,
    global: &GlobalOpts,
) {
    let line = match notice {
        Ok(ControllerNotice::Applied {
            state: ProcessState::Up,
            tunnel,
        }) => format!("tunnel '{}' up", util::tunnel_label(session, tunnel)),
        Ok(ControllerNotice::Applied { state, .. }) => format!("tunnel {state}"),
        Ok(ControllerNotice::BackendFailed { error }) => format!("backend failed: {error}"),
        Ok(ControllerNotice::PolicyRejected { reason }) => format!("not applied: {reason}"),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(skipped = n, "notice stream lagged");
            return;
        }
        Err(broadcast::error::RecvError::Closed) => return,
    };
    output::print_output(&line, global.quiet);
}
