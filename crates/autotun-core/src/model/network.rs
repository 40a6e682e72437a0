// ── Network observation types ──

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Category of the currently active network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NetworkCategory {
    Wifi,
    Mobile,
    Ethernet,
    None,
}

/// One connectivity transition reported by the network observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub category: NetworkCategory,
    /// Only meaningful for [`NetworkCategory::Wifi`].
    pub ssid: Option<String>,
}

impl NetworkEvent {
    pub fn wifi(ssid: impl Into<String>) -> Self {
        Self {
            category: NetworkCategory::Wifi,
            ssid: Some(ssid.into()),
        }
    }

    pub fn mobile() -> Self {
        Self {
            category: NetworkCategory::Mobile,
            ssid: None,
        }
    }

    pub fn ethernet() -> Self {
        Self {
            category: NetworkCategory::Ethernet,
            ssid: None,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            category: NetworkCategory::None,
            ssid: None,
        }
    }
}
