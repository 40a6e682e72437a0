// ── Auto-tunnel policy ──
//
// Pure decision: given the active network and the current settings,
// should the tunnel be up, down, or left alone?

use crate::model::{NetworkCategory, NetworkEvent, Settings};

/// The state the controller wants the tunnel in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Desired {
    Up,
    Down,
}

/// Compute the desired tunnel state.
///
/// Returns `None` when no automation is armed, in which case only
/// manual start/stop move the tunnel.
///
/// With auto-tunnel armed:
/// - trusted Wi-Fi SSID -> `Down`, regardless of other flags
/// - Wi-Fi / mobile / ethernet -> `Up` iff tunneling on that category is on
/// - no connectivity -> `Down`
///
/// With only always-on armed, any connected network -> `Up`.
pub fn desired_state(network: &NetworkEvent, settings: &Settings) -> Option<Desired> {
    if settings.is_auto_tunnel_enabled {
        return Some(auto_tunnel_decision(network, settings));
    }
    if settings.is_always_on_enabled {
        return Some(match network.category {
            NetworkCategory::None => Desired::Down,
            _ => Desired::Up,
        });
    }
    None
}

fn auto_tunnel_decision(network: &NetworkEvent, settings: &Settings) -> Desired {
    let enabled = match network.category {
        NetworkCategory::Wifi => {
            let trusted = network
                .ssid
                .as_deref()
                .is_some_and(|ssid| settings.is_trusted(ssid));
            if trusted {
                return Desired::Down;
            }
            settings.tunnel_on_wifi
        }
        NetworkCategory::Mobile => settings.tunnel_on_mobile,
        NetworkCategory::Ethernet => settings.tunnel_on_ethernet,
        NetworkCategory::None => false,
    };

    if enabled { Desired::Up } else { Desired::Down }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed() -> Settings {
        Settings {
            is_auto_tunnel_enabled: true,
            tunnel_on_wifi: true,
            ..Settings::default()
        }
        .with_trusted_ssid("Home".into())
    }

    #[test]
    fn trusted_ssid_keeps_tunnel_down() {
        let s = armed();
        assert_eq!(desired_state(&NetworkEvent::wifi("Home"), &s), Some(Desired::Down));
        assert_eq!(desired_state(&NetworkEvent::wifi("Cafe"), &s), Some(Desired::Up));
    }

    #[test]
    fn ssid_match_is_case_sensitive() {
        assert_eq!(
            desired_state(&NetworkEvent::wifi("home"), &armed()),
            Some(Desired::Up)
        );
    }

    #[test]
    fn trusted_wins_over_everything() {
        let s = Settings {
            is_always_on_enabled: true,
            ..armed()
        };
        assert_eq!(desired_state(&NetworkEvent::wifi("Home"), &s), Some(Desired::Down));
    }

    #[test]
    fn disabled_categories_stay_down() {
        let s = armed();
        assert_eq!(desired_state(&NetworkEvent::mobile(), &s), Some(Desired::Down));
        assert_eq!(desired_state(&NetworkEvent::ethernet(), &s), Some(Desired::Down));

        let s = Settings {
            tunnel_on_mobile: true,
            tunnel_on_wifi: false,
            ..armed()
        };
        assert_eq!(desired_state(&NetworkEvent::mobile(), &s), Some(Desired::Up));
        assert_eq!(desired_state(&NetworkEvent::wifi("Cafe"), &s), Some(Desired::Down));
    }

    #[test]
    fn wifi_without_ssid_is_untrusted() {
        let event = NetworkEvent {
            category: NetworkCategory::Wifi,
            ssid: None,
        };
        assert_eq!(desired_state(&event, &armed()), Some(Desired::Up));
    }

    #[test]
    fn disconnected_is_down() {
        assert_eq!(
            desired_state(&NetworkEvent::disconnected(), &armed()),
            Some(Desired::Down)
        );
    }

    #[test]
    fn always_on_covers_every_connected_network() {
        let s = Settings {
            is_always_on_enabled: true,
            ..Settings::default()
        };
        assert_eq!(desired_state(&NetworkEvent::mobile(), &s), Some(Desired::Up));
        assert_eq!(desired_state(&NetworkEvent::disconnected(), &s), Some(Desired::Down));
    }

    #[test]
    fn nothing_armed_means_no_opinion() {
        assert_eq!(
            desired_state(&NetworkEvent::wifi("Cafe"), &Settings::default()),
            None
        );
    }
}
