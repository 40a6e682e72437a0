// ── User-facing operations ──
//
// Settings and tunnel operations with policy checks. Every check runs
// before any write, so a rejected call leaves all state untouched.

mod settings;
mod tunnels;

pub use settings::SettingsService;
pub use tunnels::TunnelService;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::SimulatedBackend;
    use crate::config::ControllerConfig;
    use crate::controller::AutoTunnelController;
    use crate::profile::tests::sample_profile;
    use crate::store::{MemorySettingsStore, MemoryTunnelStore};

    pub(crate) struct Harness {
        pub ctrl: AutoTunnelController,
        pub backend: Arc<SimulatedBackend>,
        pub tunnels: Arc<MemoryTunnelStore>,
    }

    impl Harness {
        pub(crate) fn profile() -> String {
            sample_profile("xTIBA5rboUvnH4htodjb6e697QjLERt1NAB4mZqp8Dg=")
        }
    }

    pub(crate) fn harness() -> Harness {
        let backend = Arc::new(SimulatedBackend::new());
        let tunnels = Arc::new(MemoryTunnelStore::new());
        let settings = Arc::new(MemorySettingsStore::default());
        let config = ControllerConfig {
            debounce: Duration::from_millis(100),
            toggle_delay: Duration::from_millis(10),
            ..ControllerConfig::default()
        };
        let ctrl = AutoTunnelController::new(config, backend.clone(), tunnels.clone(), settings);
        Harness {
            ctrl,
            backend,
            tunnels,
        }
    }
}
