//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use autotun_core::TunnelConfig;

use crate::config::Session;
use crate::error::CliError;

/// Resolve a tunnel by name or ID.
pub fn resolve_tunnel(session: &Session, identifier: &str) -> Result<Arc<TunnelConfig>, CliError> {
    Ok(session.ctrl.tunnel_service().find(identifier)?)
}

/// Display name for an optional tunnel ID, `-` when unset or unknown.
pub fn tunnel_label(session: &Session, id: Option<autotun_core::TunnelId>) -> String {
    id.and_then(|id| session.ctrl.tunnels().get(id))
        .map_or_else(|| "-".to_owned(), |t| t.name.clone())
}

pub fn on_off(enabled: bool) -> String {
    if enabled { "on" } else { "off" }.to_owned()
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.to_owned(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}
