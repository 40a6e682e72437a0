//! Configuration for the autotun CLI.
//!
//! A TOML file in the platform config directory, layered over built-in
//! defaults and overridden by `AUTOTUN_*` environment variables, then
//! validated and translated into `autotun_core::ControllerConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use autotun_core::ControllerConfig;
use autotun_core::config::DEFAULT_STALE_THRESHOLD_SECS;

/// Environment prefix; nested keys use `__`, e.g. `AUTOTUN_CONTROLLER__DEBOUNCE_MS`.
pub const ENV_PREFIX: &str = "AUTOTUN_";

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
const MAX_INTERFACE_LEN: usize = 15;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerSection,

    #[serde(default)]
    pub backend: BackendSection,

    /// Where tunnels and settings are persisted between runs.
    /// Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

/// Controller timing, in milliseconds unless noted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerSection {
    pub debounce_ms: u64,
    pub stale_threshold_secs: u64,
    pub stats_interval_ms: u64,
    pub toggle_delay_ms: u64,
}

impl Default for ControllerSection {
    fn default() -> Self {
        Self {
            debounce_ms: 3_000,
            stale_threshold_secs: DEFAULT_STALE_THRESHOLD_SECS,
            stats_interval_ms: 1_000,
            toggle_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    WgQuick,
    Simulated,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WgQuick => "wg-quick",
            Self::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendSection {
    pub kind: BackendKind,
    /// Interface name handed to `wg-quick`.
    pub interface: String,
    /// Private directory for rendered profiles. Defaults under the state dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            interface: "autotun0".into(),
            work_dir: None,
        }
    }
}

impl Config {
    /// Validate and translate into the core's runtime configuration.
    pub fn controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let c = &self.controller;
        if c.debounce_ms == 0 {
            return Err(validation("controller.debounce_ms", "must be greater than zero"));
        }
        if c.stats_interval_ms == 0 {
            return Err(validation(
                "controller.stats_interval_ms",
                "must be greater than zero",
            ));
        }
        validate_interface(&self.backend.interface)?;

        Ok(ControllerConfig {
            debounce: Duration::from_millis(c.debounce_ms),
            stale_threshold_secs: c.stale_threshold_secs,
            stats_interval: Duration::from_millis(c.stats_interval_ms),
            toggle_delay: Duration::from_millis(c.toggle_delay_ms),
            ..ControllerConfig::default()
        })
    }

    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(default_state_dir)
    }

    /// Snapshot file holding tunnels and settings.
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    pub fn work_dir(&self) -> PathBuf {
        self.backend
            .work_dir
            .clone()
            .unwrap_or_else(|| self.state_dir().join("run"))
    }
}

fn validate_interface(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.len() > MAX_INTERFACE_LEN {
        return Err(validation(
            "backend.interface",
            &format!("must be 1 to {MAX_INTERFACE_LEN} characters, got '{name}'"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '=' | '+' | '.' | '-')))
    {
        return Err(validation(
            "backend.interface",
            &format!("character '{bad}' is not allowed in '{name}'"),
        ));
    }
    Ok(())
}

fn validation(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "autotun", "autotun")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_state_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("autotun");
    p
}

// ── Config loading ──────────────────────────────────────────────────

fn base_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
}

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file + environment. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = base_figment(path).merge(
        Env::prefixed(ENV_PREFIX)
            .split("__")
            .ignore(&["config", "output", "backend"]),
    );
    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is broken.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn load_file(path: &Path) -> Config {
        base_figment(path).extract().unwrap()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_file(&dir.path().join("absent.toml"));
        assert_eq!(cfg, Config::default());

        let ctrl = cfg.controller_config().unwrap();
        assert_eq!(ctrl, ControllerConfig::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "state_dir = \"/var/lib/autotun\"\n\
             [controller]\n\
             debounce_ms = 500\n\
             [backend]\n\
             kind = \"simulated\"\n\
             interface = \"wg-office\"\n",
        )
        .unwrap();

        let cfg = load_file(&path);
        assert_eq!(cfg.backend.kind, BackendKind::Simulated);
        assert_eq!(cfg.backend.interface, "wg-office");
        assert_eq!(cfg.controller.stats_interval_ms, 1_000);
        assert_eq!(cfg.state_path(), PathBuf::from("/var/lib/autotun/state.json"));
        assert_eq!(cfg.work_dir(), PathBuf::from("/var/lib/autotun/run"));

        let ctrl = cfg.controller_config().unwrap();
        assert_eq!(ctrl.debounce, Duration::from_millis(500));
    }

    #[test]
    fn unknown_backend_kind_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backend]\nkind = \"openvpn\"\n").unwrap();

        let err = base_figment(&path).extract::<Config>().unwrap_err();
        assert!(matches!(ConfigError::from(err), ConfigError::Figment(_)));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut cfg = Config::default();
        cfg.controller.debounce_ms = 0;
        assert!(matches!(
            cfg.controller_config(),
            Err(ConfigError::Validation { field, .. }) if field == "controller.debounce_ms"
        ));

        let mut cfg = Config::default();
        cfg.controller.stats_interval_ms = 0;
        assert!(cfg.controller_config().is_err());
    }

    #[test]
    fn interface_names_are_checked() {
        for bad in ["", "this-name-is-too-long", "wg 0", "wg/0"] {
            let mut cfg = Config::default();
            cfg.backend.interface = bad.into();
            assert!(cfg.controller_config().is_err(), "{bad:?} should be rejected");
        }
        for good in ["wg0", "wg_office.1", "a=b+c-d"] {
            let mut cfg = Config::default();
            cfg.backend.interface = good.into();
            assert!(cfg.controller_config().is_ok(), "{good:?} should be accepted");
        }
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.controller.toggle_delay_ms = 250;
        cfg.backend.kind = BackendKind::Simulated;

        save_config_to(&cfg, &path).unwrap();
        assert_eq!(load_file(&path), cfg);
    }

    #[test]
    fn backend_kind_names() {
        assert_eq!(BackendKind::WgQuick.as_str(), "wg-quick");
        assert_eq!(BackendKind::Simulated.as_str(), "simulated");
    }
}
