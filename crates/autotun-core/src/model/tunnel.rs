// ── Tunnel identity and configuration ──

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier of a stored tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TunnelId(Uuid);

impl TunnelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TunnelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TunnelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TunnelId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for TunnelId {
    fn from(u: Uuid) -> Self {
        Self(u)
    }
}

/// A stored tunnel profile.
///
/// `profile_text` is opaque to everything except the profile validator
/// and the backend; `order` is the position in the store's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub id: TunnelId,
    pub name: String,
    pub profile_text: String,
    pub order: u32,
}

impl TunnelConfig {
    /// Public keys of every `[Peer]` in the profile, in file order.
    pub fn peer_keys(&self) -> Vec<String> {
        crate::profile::peer_public_keys(&self.profile_text)
    }
}

/// A tunnel that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTunnel {
    pub name: String,
    pub profile_text: String,
}
