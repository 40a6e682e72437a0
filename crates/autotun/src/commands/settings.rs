//! Settings command handlers.

use clap::ValueEnum;

use autotun_core::Settings;

use crate::cli::{GlobalOpts, SettingFlag, SettingsArgs, SettingsCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util::{self, on_off};

pub async fn handle(session: &Session, args: SettingsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let svc = session.ctrl.settings_service();
    let message = match args.command {
        SettingsCommand::Show => {
            let settings = svc.current();
            let out = output::render_single(
                &global.output,
                &*settings,
                |s| detail(session, s),
                |s| on_off(s.is_automation_armed()),
            )?;
            output::print_output(&out, global.quiet);
            return Ok(());
        }

        SettingsCommand::Auto { state } => {
            let s = svc.set_auto_tunnel(state.enabled())?;
            format!(
                "Auto-tunnel {} (tunnel: {})",
                on_off(s.is_auto_tunnel_enabled),
                util::tunnel_label(session, s.default_tunnel_id)
            )
        }

        SettingsCommand::AlwaysOn { state } => {
            let s = svc.set_always_on(state.enabled())?;
            format!(
                "Always-on {} (tunnel: {})",
                on_off(s.is_always_on_enabled),
                util::tunnel_label(session, s.default_tunnel_id)
            )
        }

        SettingsCommand::Default { tunnel } => {
            let tunnel = util::resolve_tunnel(session, &tunnel)?;
            svc.set_default_tunnel(tunnel.id)?;
            format!("Default tunnel set to '{}'", tunnel.name)
        }

        SettingsCommand::Set { flag, state } => {
            let enabled = state.enabled();
            match flag {
                SettingFlag::Wifi => svc.set_tunnel_on_wifi(enabled)?,
                SettingFlag::Mobile => svc.set_tunnel_on_mobile(enabled)?,
                SettingFlag::Ethernet => svc.set_tunnel_on_ethernet(enabled)?,
                SettingFlag::BatterySaver => svc.set_battery_saver(enabled)?,
                SettingFlag::Shortcuts => svc.set_shortcuts(enabled)?,
                SettingFlag::KernelMode => {
                    let result = svc.set_kernel_mode(enabled).await;
                    // A refusal still forces kernel mode off; keep that.
                    session.save()?;
                    result?
                }
            };
            let name = flag
                .to_possible_value()
                .map_or_else(|| format!("{flag:?}"), |v| v.get_name().to_owned());
            format!("{name} {}", on_off(enabled))
        }
    };

    session.save()?;
    output::notice(&message, global.quiet);
    Ok(())
}

fn detail(session: &Session, s: &Settings) -> String {
    let trusted = if s.trusted_network_ssids.is_empty() {
        "-".to_owned()
    } else {
        s.trusted_network_ssids.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    output::render_pairs(&[
        ("auto-tunnel", on_off(s.is_auto_tunnel_enabled)),
        ("always-on", on_off(s.is_always_on_enabled)),
        ("default tunnel", util::tunnel_label(session, s.default_tunnel_id)),
        ("trusted SSIDs", trusted),
        ("tunnel on wifi", on_off(s.tunnel_on_wifi)),
        ("tunnel on mobile", on_off(s.tunnel_on_mobile)),
        ("tunnel on ethernet", on_off(s.tunnel_on_ethernet)),
        ("kernel mode", on_off(s.kernel_mode_enabled)),
        ("battery saver", on_off(s.battery_saver_enabled)),
        ("shortcuts", on_off(s.shortcuts_enabled)),
    ])
}
