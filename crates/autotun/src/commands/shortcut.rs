//! External shortcut requests.
//!
//! The request is handed to the controller as a detached task, exactly
//! as a launcher shortcut would; the command then waits for it to drain.

use std::time::Duration;

use autotun_core::ShortcutAction;

use crate::cli::{GlobalOpts, ShortcutArgs, ShortcutCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

const DRAIN_POLL: Duration = Duration::from_millis(20);

pub async fn handle(session: &Session, args: ShortcutArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let action = match args.command {
        ShortcutCommand::Start { tunnel } => ShortcutAction::Start(
            tunnel
                .map(|t| util::resolve_tunnel(session, &t).map(|t| t.id))
                .transpose()?,
        ),
        ShortcutCommand::Stop => ShortcutAction::Stop,
    };

    let ctrl = &session.ctrl;
    ctrl.start().await;
    let dispatched = ctrl.dispatch_shortcut(action);
    if dispatched.is_ok() {
        while ctrl.shortcuts_in_flight() > 0 {
            tokio::time::sleep(DRAIN_POLL).await;
        }
    }
    ctrl.shutdown().await;
    dispatched?;

    let state = ctrl.backend().process_state();
    let name = util::tunnel_label(session, ctrl.backend().active_tunnel());
    output::notice(&format!("Shortcut handled; tunnel '{name}' is {state}"), global.quiet);
    Ok(())
}
