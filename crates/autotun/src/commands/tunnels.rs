//! Tunnel command handlers.

use std::path::PathBuf;

use serde::Serialize;
use tabled::Tabled;
use tokio::io::AsyncReadExt;
use tracing::info;

use autotun_core::{TunnelConfig, TunnelId};

use crate::cli::{GlobalOpts, TunnelsArgs, TunnelsCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

/// Listing view; leaves the profile text (and its private key) out.
#[derive(Debug, Serialize)]
struct TunnelView {
    id: TunnelId,
    name: String,
    order: u32,
    peers: usize,
    is_default: bool,
    is_active: bool,
}

impl TunnelView {
    fn new(session: &Session, tunnel: &TunnelConfig) -> Self {
        let settings = session.ctrl.settings().current();
        Self {
            id: tunnel.id,
            name: tunnel.name.clone(),
            order: tunnel.order,
            peers: tunnel.peer_keys().len(),
            is_default: settings.default_tunnel_id == Some(tunnel.id),
            is_active: session.ctrl.backend().active_tunnel() == Some(tunnel.id),
        }
    }
}

#[derive(Tabled)]
struct TunnelRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Peers")]
    peers: usize,
    #[tabled(rename = "Default")]
    default: String,
    #[tabled(rename = "Active")]
    active: String,
}

impl From<&TunnelView> for TunnelRow {
    fn from(v: &TunnelView) -> Self {
        let mark = |b: bool| if b { "*".to_owned() } else { String::new() };
        Self {
            name: v.name.clone(),
            id: v.id.to_string(),
            peers: v.peers,
            default: mark(v.is_default),
            active: mark(v.is_active),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: TunnelsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TunnelsCommand::List => {
            let views: Vec<TunnelView> = session
                .ctrl
                .tunnel_service()
                .list()
                .iter()
                .map(|t| TunnelView::new(session, t))
                .collect();
            print_views(&views, global)
        }

        TunnelsCommand::Import { files, stdin } => {
            let imported = if stdin {
                import_stdin(session).await
            } else {
                import_files(session, &files).await
            };
            // Keep whatever made it in, even when a later file failed.
            session.save()?;
            let imported = imported?;
            output::notice(&format!("Imported {} tunnel(s)", imported.len()), global.quiet);
            let views: Vec<TunnelView> = imported.iter().map(|t| TunnelView::new(session, t)).collect();
            print_views(&views, global)
        }

        TunnelsCommand::Show { tunnel } => {
            let tunnel = util::resolve_tunnel(session, &tunnel)?;
            let out = output::render_single(
                &global.output,
                &*tunnel,
                |t| t.profile_text.trim_end().to_owned(),
                |t| t.id.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TunnelsCommand::Delete { tunnel } => {
            let tunnel = util::resolve_tunnel(session, &tunnel)?;
            if !util::confirm(&format!("Delete tunnel '{}'?", tunnel.name), global.yes)? {
                return Ok(());
            }
            let removed = session.ctrl.tunnel_service().delete(tunnel.id).await?;
            session.save()?;
            output::notice(&format!("Tunnel '{}' deleted", removed.name), global.quiet);
            Ok(())
        }
    }
}

fn print_views(views: &[TunnelView], global: &GlobalOpts) -> Result<(), CliError> {
    let out = output::render_list(&global.output, views, |v| TunnelRow::from(v), |v| v.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Import ──────────────────────────────────────────────────────────

async fn import_files(session: &Session, files: &[PathBuf]) -> Result<Vec<TunnelConfig>, CliError> {
    let importer = session.ctrl.importer();
    let mut created = Vec::new();
    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::Validation {
                field: "file".into(),
                reason: format!("'{}' is not a file", path.display()),
            })?;
        let bytes = tokio::fs::read(path).await?;
        let report = importer.import_file(&file_name, &bytes)?;
        info!(file = %path.display(), count = report.count(), "imported");
        created.extend(report.created);
    }
    Ok(created)
}

async fn import_stdin(session: &Session) -> Result<Vec<TunnelConfig>, CliError> {
    let mut raw = String::new();
    tokio::io::stdin().read_to_string(&mut raw).await?;
    let tunnel = session.ctrl.importer().import_text(&raw)?;
    Ok(vec![tunnel])
}
