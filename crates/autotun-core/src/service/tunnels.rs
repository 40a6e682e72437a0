// ── Tunnel operations ──

use std::sync::Arc;

use tracing::info;

use crate::controller::AutoTunnelController;
use crate::error::CoreError;
use crate::model::{ProcessState, TunnelConfig, TunnelId};
use crate::store::TunnelList;

/// Lookup and deletion of tunnels, keeping settings consistent.
pub struct TunnelService {
    ctrl: AutoTunnelController,
}

impl TunnelService {
    pub(crate) fn new(ctrl: AutoTunnelController) -> Self {
        Self { ctrl }
    }

    pub fn list(&self) -> Arc<TunnelList> {
        self.ctrl.tunnels().list()
    }

    /// Find a tunnel by exact name, falling back to its id.
    pub fn find(&self, identifier: &str) -> Result<Arc<TunnelConfig>, CoreError> {
        let tunnels = self.ctrl.tunnels();
        tunnels
            .find_by_name(identifier)
            .or_else(|| {
                identifier
                    .parse::<TunnelId>()
                    .ok()
                    .and_then(|id| tunnels.get(id))
            })
            .ok_or_else(|| CoreError::TunnelNotFound {
                identifier: identifier.to_owned(),
            })
    }

    /// Delete a tunnel.
    ///
    /// A running tunnel is stopped first. Deleting the last tunnel
    /// disarms auto-tunnel and always-on and clears the default;
    /// deleting the default re-points it at the first remaining tunnel.
    pub async fn delete(&self, id: TunnelId) -> Result<Arc<TunnelConfig>, CoreError> {
        let tunnels = self.ctrl.tunnels();
        if tunnels.get(id).is_none() {
            return Err(CoreError::TunnelNotFound {
                identifier: id.to_string(),
            });
        }

        let backend = self.ctrl.backend();
        if backend.active_tunnel() == Some(id) && backend.process_state() != ProcessState::Down {
            if self.ctrl.is_running() {
                self.ctrl.on_user_stop().await?;
            } else {
                backend.stop().await?;
                self.ctrl.reconciler().apply_process_state(ProcessState::Down, None);
            }
        }

        // Settings are adjusted under the same gate as every other
        // settings write, so a concurrent toggle cannot re-arm
        // auto-tunnel against a tunnel that is about to vanish.
        let mut removed = None;
        self.ctrl.update_settings(|s| {
            removed = Some(tunnels.delete(id)?);
            let next = if tunnels.count() == 0 {
                s.clone().without_tunnels()
            } else if s.default_tunnel_id == Some(id) {
                let mut next = s.clone();
                next.default_tunnel_id = tunnels.first().map(|t| t.id);
                next
            } else {
                s.clone()
            };
            Ok(next)
        })?;

        let removed = removed.ok_or(CoreError::TunnelNotFound {
            identifier: id.to_string(),
        })?;
        info!(tunnel = %removed.name, "tunnel deleted");
        Ok(removed)
    }
}
