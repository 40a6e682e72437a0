//! CLI error types with miette diagnostics.
//!
//! Maps core, config and state errors into user-facing errors with
//! actionable help text and distinct exit codes.

use miette::Diagnostic;
use thiserror::Error;

use autotun_config::ConfigError;
use autotun_core::{BackendError, CoreError, ImportError, SnapshotError, StoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const POLICY: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const BACKEND: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────

    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(autotun::not_found),
        help("Run: autotun {list_command} to see what exists")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' already exists")]
    #[diagnostic(code(autotun::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
    },

    // ── Policy ───────────────────────────────────────────────────────

    #[error("No tunnel configured")]
    #[diagnostic(
        code(autotun::no_tunnel),
        help("Import one first: autotun tunnels import <file.conf>")
    )]
    NoTunnel,

    #[error("Shortcuts are disabled")]
    #[diagnostic(
        code(autotun::shortcuts_disabled),
        help("Enable them with: autotun settings set shortcuts on")
    )]
    ShortcutsDisabled,

    #[error("Auto-tunnel controller is not running")]
    #[diagnostic(code(autotun::controller_stopped))]
    ControllerStopped,

    // ── Import ───────────────────────────────────────────────────────

    #[error("Import failed: {message}")]
    #[diagnostic(
        code(autotun::import),
        help("Profiles need an [Interface] with a PrivateKey and at least one [Peer] with a PublicKey.")
    )]
    Import { message: String },

    // ── Backend ──────────────────────────────────────────────────────

    #[error("The tunnel backend refused the request: permission denied")]
    #[diagnostic(
        code(autotun::permission_denied),
        help("wg-quick needs root. Re-run with sudo, or try: autotun --backend simulated")
    )]
    PermissionDenied,

    #[error("Required tool '{tool}' was not found")]
    #[diagnostic(
        code(autotun::tool_missing),
        help("Install wireguard-tools so that `wg` and `wg-quick` are on PATH.")
    )]
    ToolMissing { tool: String },

    #[error("Tunnel backend error: {message}")]
    #[diagnostic(code(autotun::backend))]
    Backend { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(autotun::validation))]
    Validation { field: String, reason: String },

    // ── Configuration / state ────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(
        code(autotun::config),
        help("Check the config file, or the AUTOTUN_* environment variables.")
    )]
    Config(ConfigError),

    #[error(transparent)]
    #[diagnostic(
        code(autotun::state),
        help("The state file may be damaged. Move it aside to start fresh.")
    )]
    State(#[from] SnapshotError),

    // ── Interactive ──────────────────────────────────────────────────

    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(autotun::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {0}")]
    #[diagnostic(code(autotun::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::NoTunnel | Self::ShortcutsDisabled => exit_code::POLICY,
            Self::PermissionDenied => exit_code::PERMISSION,
            Self::ToolMissing { .. } | Self::Backend { .. } => exit_code::BACKEND,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } | Self::Config(_) => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── Error mapping ────────────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NoTunnelConfigured => Self::NoTunnel,
            CoreError::ShortcutsDisabled => Self::ShortcutsDisabled,
            CoreError::ControllerStopped => Self::ControllerStopped,

            CoreError::SsidAlreadyTrusted { ssid } => Self::Conflict {
                resource_type: "trusted SSID".into(),
                identifier: ssid,
            },
            CoreError::SsidNotTrusted { ssid } => Self::NotFound {
                resource_type: "trusted SSID".into(),
                identifier: ssid,
                list_command: "trust list".into(),
            },
            CoreError::EmptySsid => Self::Validation {
                field: "ssid".into(),
                reason: "must not be empty".into(),
            },
            CoreError::TunnelNotFound { identifier } => Self::NotFound {
                resource_type: "tunnel".into(),
                identifier,
                list_command: "tunnels list".into(),
            },

            CoreError::Import(e) => e.into(),
            CoreError::Backend(e) => e.into(),
            CoreError::Store(e) => e.into(),
        }
    }
}

impl From<ImportError> for CliError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Store(e) => e.into(),
            other => Self::Import {
                message: other.to_string(),
            },
        }
    }
}

impl From<BackendError> for CliError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied => Self::PermissionDenied,
            BackendError::ToolMissing { tool } => Self::ToolMissing { tool },
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateName { name } => Self::Conflict {
                resource_type: "tunnel".into(),
                identifier: name,
            },
            StoreError::NotFound { id } => Self::NotFound {
                resource_type: "tunnel".into(),
                identifier: id.to_string(),
                list_command: "tunnels list".into(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_keep_their_meaning() {
        let e = CliError::from(CoreError::TunnelNotFound {
            identifier: "office".into(),
        });
        assert_eq!(e.exit_code(), exit_code::NOT_FOUND);

        let e = CliError::from(CoreError::Backend(BackendError::PermissionDenied));
        assert_eq!(e.exit_code(), exit_code::PERMISSION);

        let e = CliError::from(CoreError::Import(ImportError::Store(
            StoreError::DuplicateName {
                name: "office".into(),
            },
        )));
        assert_eq!(e.exit_code(), exit_code::CONFLICT);

        assert_eq!(
            CliError::from(CoreError::NoTunnelConfigured).exit_code(),
            exit_code::POLICY
        );
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let e = CliError::from(ConfigError::Validation {
            field: "backend.interface".into(),
            reason: "too long".into(),
        });
        assert!(matches!(e, CliError::Validation { .. }));
        assert_eq!(e.exit_code(), exit_code::USAGE);
    }
}
