// ── Device-wide auto-tunnel settings ──
//
// Settings are only ever replaced as a whole. Every mutation helper
// below consumes `self` and returns the next value, so callers cannot
// edit a shared instance in place.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::tunnel::TunnelId;

/// The single settings record of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wifi SSIDs on which the tunnel stays down. Exact, case-sensitive.
    pub trusted_network_ssids: BTreeSet<String>,
    pub is_auto_tunnel_enabled: bool,
    pub is_always_on_enabled: bool,
    pub tunnel_on_wifi: bool,
    pub tunnel_on_mobile: bool,
    pub tunnel_on_ethernet: bool,
    pub default_tunnel_id: Option<TunnelId>,
    pub kernel_mode_enabled: bool,
    pub battery_saver_enabled: bool,
    pub shortcuts_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            trusted_network_ssids: BTreeSet::new(),
            is_auto_tunnel_enabled: false,
            is_always_on_enabled: false,
            tunnel_on_wifi: true,
            tunnel_on_mobile: false,
            tunnel_on_ethernet: false,
            default_tunnel_id: None,
            kernel_mode_enabled: false,
            battery_saver_enabled: false,
            shortcuts_enabled: false,
        }
    }
}

impl Settings {
    pub fn is_trusted(&self, ssid: &str) -> bool {
        self.trusted_network_ssids.contains(ssid)
    }

    /// Whether any automation (auto-tunnel or always-on) is armed.
    pub fn is_automation_armed(&self) -> bool {
        self.is_auto_tunnel_enabled || self.is_always_on_enabled
    }

    pub fn with_trusted_ssid(mut self, ssid: String) -> Self {
        self.trusted_network_ssids.insert(ssid);
        self
    }

    pub fn without_trusted_ssid(mut self, ssid: &str) -> Self {
        self.trusted_network_ssids.remove(ssid);
        self
    }

    /// Disarm every feature that needs a tunnel to exist.
    pub fn without_tunnels(self) -> Self {
        Self {
            is_auto_tunnel_enabled: false,
            is_always_on_enabled: false,
            default_tunnel_id: None,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_tunnels_disarms_automation() {
        let settings = Settings {
            is_auto_tunnel_enabled: true,
            is_always_on_enabled: true,
            default_tunnel_id: Some(TunnelId::new()),
            battery_saver_enabled: true,
            ..Settings::default()
        };

        let next = settings.without_tunnels();
        assert!(!next.is_auto_tunnel_enabled);
        assert!(!next.is_always_on_enabled);
        assert!(next.default_tunnel_id.is_none());
        assert!(next.battery_saver_enabled);
    }

    #[test]
    fn trusted_ssids_are_case_sensitive() {
        let settings = Settings::default().with_trusted_ssid("Home".into());
        assert!(settings.is_trusted("Home"));
        assert!(!settings.is_trusted("home"));
    }
}
