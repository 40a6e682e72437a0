//! CLI-side configuration: applies global flags on top of the loaded
//! config and opens the persisted state.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use autotun_config::{BackendKind, Config};
use autotun_core::{
    AutoTunnelController, MemorySettingsStore, MemoryTunnelStore, SimulatedBackend,
    StateSnapshot, VpnBackend, WgQuickBackend,
};

use crate::cli::{BackendChoice, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Load the config file named by `--config` (or the default one) and
/// apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = match &global.config {
        Some(path) => autotun_config::load_config_from(path)?,
        None => autotun_config::load_config()?,
    };
    if let Some(choice) = global.backend {
        cfg.backend.kind = match choice {
            BackendChoice::WgQuick => BackendKind::WgQuick,
            BackendChoice::Simulated => BackendKind::Simulated,
        };
    }
    Ok(cfg)
}

/// Everything a command needs: the controller wired to the persisted
/// stores, and where to write them back.
pub struct Session {
    pub ctrl: AutoTunnelController,
    pub color: bool,
    settings: Arc<MemorySettingsStore>,
    tunnels: Arc<MemoryTunnelStore>,
    state_path: PathBuf,
}

impl Session {
    pub async fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let cfg = load(global)?;
        let controller_config = cfg.controller_config()?;

        let state_path = cfg.state_path();
        let (settings, tunnels) = StateSnapshot::load(&state_path)?.into_stores();
        let settings = Arc::new(settings);
        let tunnels = Arc::new(tunnels);

        let backend: Arc<dyn VpnBackend> = match cfg.backend.kind {
            BackendKind::WgQuick => {
                let backend = WgQuickBackend::new(cfg.backend.interface.clone(), cfg.work_dir());
                let state = backend.detect().await;
                debug!(interface = backend.interface(), %state, "wg-quick backend ready");
                Arc::new(backend)
            }
            BackendKind::Simulated => Arc::new(SimulatedBackend::new()),
        };
        debug!(
            backend = cfg.backend.kind.as_str(),
            state = %state_path.display(),
            "session opened"
        );

        let ctrl = AutoTunnelController::new(
            controller_config,
            backend,
            tunnels.clone(),
            settings.clone(),
        );

        Ok(Self {
            ctrl,
            color: output::should_color(&global.color),
            settings,
            tunnels,
            state_path,
        })
    }

    /// Write tunnels and settings back to the state file.
    pub fn save(&self) -> Result<(), CliError> {
        StateSnapshot::capture(&self.settings, &self.tunnels).save(&self.state_path)?;
        Ok(())
    }
}
