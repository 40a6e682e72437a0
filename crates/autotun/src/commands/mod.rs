//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod control;
pub mod run;
pub mod settings;
pub mod shortcut;
pub mod trust;
pub mod tunnels;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::config::Session;
use crate::error::CliError;

/// Dispatch a state-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Tunnels(args) => tunnels::handle(session, args, global).await,
        Command::Trust(args) => trust::handle(session, args, global),
        Command::Settings(args) => settings::handle(session, args, global).await,
        Command::Up { tunnel } => control::up(session, tunnel.as_deref(), global).await,
        Command::Down => control::down(session, global).await,
        Command::Status => control::status(session, global).await,
        Command::Run => run::handle(session, global).await,
        Command::Shortcut(args) => shortcut::handle(session, args, global).await,
        // Handled before a session is opened
        Command::Completions(_) => Ok(()),
    }
}
