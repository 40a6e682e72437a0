//! Trusted-network command handlers.

use tabled::Tabled;

use crate::cli::{GlobalOpts, TrustArgs, TrustCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SsidRow {
    #[tabled(rename = "Trusted SSID")]
    ssid: String,
}

pub fn handle(session: &Session, args: TrustArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let svc = session.ctrl.settings_service();
    match args.command {
        TrustCommand::List => {
            let ssids: Vec<String> = svc.current().trusted_network_ssids.iter().cloned().collect();
            let out = output::render_list(
                &global.output,
                &ssids,
                |s| SsidRow { ssid: s.clone() },
                String::clone,
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        TrustCommand::Add { ssid } => {
            svc.add_trusted_ssid(&ssid)?;
            session.save()?;
            output::notice(&format!("Trusting '{}'", ssid.trim()), global.quiet);
            Ok(())
        }

        TrustCommand::Remove { ssid } => {
            svc.remove_trusted_ssid(&ssid)?;
            session.save()?;
            output::notice(&format!("No longer trusting '{}'", ssid.trim()), global.quiet);
            Ok(())
        }
    }
}
