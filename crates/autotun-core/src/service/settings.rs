// ── Settings operations ──

use std::sync::Arc;

use tracing::{info, warn};

use crate::controller::AutoTunnelController;
use crate::error::CoreError;
use crate::model::{Settings, TunnelId};

/// Validated, whole-record updates of [`Settings`].
pub struct SettingsService {
    ctrl: AutoTunnelController,
}

impl SettingsService {
    pub(crate) fn new(ctrl: AutoTunnelController) -> Self {
        Self { ctrl }
    }

    pub fn current(&self) -> Arc<Settings> {
        self.ctrl.settings().current()
    }

    // ── Trusted networks ─────────────────────────────────────────

    /// Trust `ssid` (surrounding whitespace is ignored).
    pub fn add_trusted_ssid(&self, ssid: &str) -> Result<Arc<Settings>, CoreError> {
        let ssid = ssid.trim();
        if ssid.is_empty() {
            return Err(CoreError::EmptySsid);
        }
        self.ctrl.update_settings(|s| {
            if s.is_trusted(ssid) {
                return Err(CoreError::SsidAlreadyTrusted { ssid: ssid.to_owned() });
            }
            Ok(s.clone().with_trusted_ssid(ssid.to_owned()))
        })
    }

    pub fn remove_trusted_ssid(&self, ssid: &str) -> Result<Arc<Settings>, CoreError> {
        let ssid = ssid.trim();
        self.ctrl.update_settings(|s| {
            if !s.is_trusted(ssid) {
                return Err(CoreError::SsidNotTrusted { ssid: ssid.to_owned() });
            }
            Ok(s.clone().without_trusted_ssid(ssid))
        })
    }

    // ── Plain toggles ────────────────────────────────────────────

    pub fn set_tunnel_on_wifi(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        self.toggle(|s| s.tunnel_on_wifi = enabled)
    }

    pub fn set_tunnel_on_mobile(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        self.toggle(|s| s.tunnel_on_mobile = enabled)
    }

    pub fn set_tunnel_on_ethernet(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        self.toggle(|s| s.tunnel_on_ethernet = enabled)
    }

    pub fn set_battery_saver(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        self.toggle(|s| s.battery_saver_enabled = enabled)
    }

    pub fn set_shortcuts(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        self.toggle(|s| s.shortcuts_enabled = enabled)
    }

    // ── Tunnel-dependent settings ────────────────────────────────

    /// The existence check runs under the settings gate, which deletion
    /// also holds, so the default can never point at a removed tunnel.
    pub fn set_default_tunnel(&self, id: TunnelId) -> Result<Arc<Settings>, CoreError> {
        self.ctrl.update_settings(|s| {
            if self.ctrl.tunnels().get(id).is_none() {
                return Err(CoreError::TunnelNotFound {
                    identifier: id.to_string(),
                });
            }
            let mut next = s.clone();
            next.default_tunnel_id = Some(id);
            Ok(next)
        })
    }

    /// Arm or disarm auto-tunnel.
    ///
    /// Arming resolves the default tunnel first (the configured one, else
    /// the first stored) and fails with [`CoreError::NoTunnelConfigured`]
    /// when there is none.
    pub fn set_auto_tunnel(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        let updated = self.ctrl.update_settings(|s| {
            let mut next = s.clone();
            if enabled {
                next.default_tunnel_id = Some(self.resolve_default(s)?);
            }
            next.is_auto_tunnel_enabled = enabled;
            Ok(next)
        })?;
        info!(enabled, "auto-tunnel toggled");
        Ok(updated)
    }

    /// Arm or disarm always-on, resolving the default tunnel like
    /// [`set_auto_tunnel`](Self::set_auto_tunnel).
    pub fn set_always_on(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        let updated = self.ctrl.update_settings(|s| {
            let mut next = s.clone();
            if enabled {
                next.default_tunnel_id = Some(self.resolve_default(s)?);
            }
            next.is_always_on_enabled = enabled;
            Ok(next)
        })?;
        info!(enabled, "always-on toggled");
        Ok(updated)
    }

    /// Enabling asks the backend whether kernel mode is possible; a
    /// refusal keeps kernel mode off and is returned to the caller.
    pub async fn set_kernel_mode(&self, enabled: bool) -> Result<Arc<Settings>, CoreError> {
        if enabled {
            if let Err(e) = self.ctrl.backend().check_kernel_support().await {
                warn!(error = %e, "kernel mode unavailable");
                self.toggle(|s| s.kernel_mode_enabled = false)?;
                return Err(e.into());
            }
        }
        self.toggle(|s| s.kernel_mode_enabled = enabled)
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn toggle(&self, edit: impl FnOnce(&mut Settings)) -> Result<Arc<Settings>, CoreError> {
        self.ctrl.update_settings(|s| {
            let mut next = s.clone();
            edit(&mut next);
            Ok(next)
        })
    }

    fn resolve_default(&self, settings: &Settings) -> Result<TunnelId, CoreError> {
        let tunnels = self.ctrl.tunnels();
        settings
            .default_tunnel_id
            .filter(|id| tunnels.get(*id).is_some())
            .or_else(|| tunnels.first().map(|t| t.id))
            .ok_or(CoreError::NoTunnelConfigured)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use tokio::sync::watch;

    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::config::ControllerConfig;
    use crate::error::{BackendError, StoreError};
    use crate::model::{NewTunnel, TunnelConfig};
    use crate::service::test_support::{Harness, harness};
    use crate::store::{MemorySettingsStore, MemoryTunnelStore, TunnelConfigStore, TunnelList};

    #[test]
    fn trusted_ssid_is_trimmed_and_unique() {
        let Harness { ctrl, .. } = harness();
        let svc = ctrl.settings_service();

        svc.add_trusted_ssid("  Home ").unwrap();
        assert!(svc.current().is_trusted("Home"));

        let before = svc.current();
        let err = svc.add_trusted_ssid("Home").unwrap_err();
        assert!(matches!(err, CoreError::SsidAlreadyTrusted { .. }));
        assert!(Arc::ptr_eq(&before, &svc.current()));
    }

    #[test]
    fn empty_ssid_is_rejected() {
        let Harness { ctrl, .. } = harness();
        assert!(matches!(
            ctrl.settings_service().add_trusted_ssid("   "),
            Err(CoreError::EmptySsid)
        ));
    }

    #[test]
    fn removing_unknown_ssid_fails() {
        let Harness { ctrl, .. } = harness();
        let svc = ctrl.settings_service();
        assert!(matches!(
            svc.remove_trusted_ssid("Cafe"),
            Err(CoreError::SsidNotTrusted { .. })
        ));
        svc.add_trusted_ssid("Cafe").unwrap();
        svc.remove_trusted_ssid("Cafe").unwrap();
        assert!(svc.current().trusted_network_ssids.is_empty());
    }

    #[test]
    fn auto_tunnel_picks_first_tunnel() {
        let Harness { ctrl, .. } = harness();
        let first = ctrl.importer().import_text(&Harness::profile()).unwrap();
        ctrl.importer().import_text(&Harness::profile()).unwrap();

        let s = ctrl.settings_service().set_auto_tunnel(true).unwrap();
        assert!(s.is_auto_tunnel_enabled);
        assert_eq!(s.default_tunnel_id, Some(first.id));
    }

    #[test]
    fn auto_tunnel_keeps_existing_default() {
        let Harness { ctrl, .. } = harness();
        ctrl.importer().import_text(&Harness::profile()).unwrap();
        let second = ctrl.importer().import_text(&Harness::profile()).unwrap();
        let svc = ctrl.settings_service();
        svc.set_default_tunnel(second.id).unwrap();

        assert_eq!(svc.set_always_on(true).unwrap().default_tunnel_id, Some(second.id));
    }

    #[test]
    fn auto_tunnel_without_tunnels_is_rejected() {
        let Harness { ctrl, .. } = harness();
        let svc = ctrl.settings_service();
        let before = svc.current();

        assert!(matches!(svc.set_auto_tunnel(true), Err(CoreError::NoTunnelConfigured)));
        assert!(matches!(svc.set_always_on(true), Err(CoreError::NoTunnelConfigured)));
        assert_eq!(*svc.current(), *before);

        // Disarming never needs a tunnel.
        svc.set_auto_tunnel(false).unwrap();
    }

    #[test]
    fn default_tunnel_must_exist() {
        let Harness { ctrl, .. } = harness();
        assert!(matches!(
            ctrl.settings_service().set_default_tunnel(TunnelId::new()),
            Err(CoreError::TunnelNotFound { .. })
        ));
    }

    /// Store whose next `get` stalls, widening the window between a
    /// lookup and the settings write that depends on it.
    struct StallingStore {
        inner: MemoryTunnelStore,
        stall_next_get: AtomicBool,
    }

    impl TunnelConfigStore for StallingStore {
        fn create(&self, tunnel: NewTunnel) -> Result<TunnelConfig, StoreError> {
            self.inner.create(tunnel)
        }
        fn list(&self) -> Arc<TunnelList> {
            self.inner.list()
        }
        fn get(&self, id: TunnelId) -> Option<Arc<TunnelConfig>> {
            if self.stall_next_get.swap(false, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(200));
            }
            self.inner.get(id)
        }
        fn find_by_name(&self, name: &str) -> Option<Arc<TunnelConfig>> {
            self.inner.find_by_name(name)
        }
        fn delete(&self, id: TunnelId) -> Result<Arc<TunnelConfig>, StoreError> {
            self.inner.delete(id)
        }
        fn count(&self) -> usize {
            self.inner.count()
        }
        fn subscribe(&self) -> watch::Receiver<Arc<TunnelList>> {
            self.inner.subscribe()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn default_never_points_at_concurrently_deleted_tunnel() {
        let store = Arc::new(StallingStore {
            inner: MemoryTunnelStore::new(),
            stall_next_get: AtomicBool::new(false),
        });
        let ctrl = AutoTunnelController::new(
            ControllerConfig::default(),
            Arc::new(SimulatedBackend::new()),
            store.clone(),
            Arc::new(MemorySettingsStore::default()),
        );
        let a = ctrl.importer().import_single("a.conf", &Harness::profile()).unwrap();

        store.stall_next_get.store(true, Ordering::SeqCst);
        let setter = {
            let ctrl = ctrl.clone();
            tokio::task::spawn_blocking(move || ctrl.settings_service().set_default_tunnel(a.id))
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctrl.tunnel_service().delete(a.id).await.unwrap();

        match setter.await.unwrap() {
            Ok(_) | Err(CoreError::TunnelNotFound { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.count(), 0);
        assert_eq!(ctrl.settings_service().current().default_tunnel_id, None);
    }

    #[tokio::test]
    async fn kernel_mode_refused_stays_off() {
        let Harness { ctrl, backend, .. } = harness();
        let svc = ctrl.settings_service();

        svc.set_kernel_mode(true).await.unwrap();
        assert!(svc.current().kernel_mode_enabled);
        svc.set_kernel_mode(false).await.unwrap();

        backend.deny_kernel_support(BackendError::PermissionDenied);
        let err = svc.set_kernel_mode(true).await.unwrap_err();
        assert!(matches!(err, CoreError::Backend(BackendError::PermissionDenied)));
        assert!(!svc.current().kernel_mode_enabled);
    }

    #[test]
    fn toggles_replace_whole_record() {
        let Harness { ctrl, .. } = harness();
        let svc = ctrl.settings_service();
        let before = svc.current();
        svc.set_tunnel_on_mobile(true).unwrap();
        svc.set_shortcuts(true).unwrap();

        assert!(!before.tunnel_on_mobile);
        let now = svc.current();
        assert!(now.tunnel_on_mobile && now.shortcuts_enabled);
    }
}
