// ── Core error types ──
//
// User-facing errors from autotun-core. Import, backend and store
// failures keep their own enums so callers can match on the layer that
// failed; `CoreError` is the umbrella the controller and services return.

use thiserror::Error;

use crate::model::TunnelId;

/// Failures while turning raw profile text or archives into tunnels.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid tunnel profile: {reason}")]
    InvalidFormat { reason: String },

    #[error("Could not find a free name for tunnel '{name}'")]
    DuplicateNameUnresolvable { name: String },

    #[error("Archive contained no importable tunnel profiles")]
    EmptyArchive,

    #[error("Unsupported file type: {file_name}")]
    UnsupportedExtension { file_name: String },

    #[error("Unreadable archive: {0}")]
    Archive(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures reported by a [`VpnBackend`](crate::backend::VpnBackend).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Permission denied by the tunnel backend")]
    PermissionDenied,

    #[error("Tunnel failed to start: {reason}")]
    StartFailed { reason: String },

    #[error("A tunnel is already running")]
    AlreadyRunning,

    #[error("Required tool not found: {tool}")]
    ToolMissing { tool: String },

    #[error("Backend I/O error: {0}")]
    Io(String),
}

/// Failures raised by a [`TunnelConfigStore`](crate::store::TunnelConfigStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("A tunnel named '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Tunnel {id} not found")]
    NotFound { id: TunnelId },
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Policy errors (rejected before any side effect) ──────────────
    #[error("No tunnel configured")]
    NoTunnelConfigured,

    #[error("SSID '{ssid}' is already trusted")]
    SsidAlreadyTrusted { ssid: String },

    #[error("SSID '{ssid}' is not in the trusted list")]
    SsidNotTrusted { ssid: String },

    #[error("SSID must not be empty")]
    EmptySsid,

    #[error("Tunnel not found: {identifier}")]
    TunnelNotFound { identifier: String },

    #[error("Shortcuts are disabled in settings")]
    ShortcutsDisabled,

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Auto-tunnel controller is not running")]
    ControllerStopped,

    // ── Wrapped layer errors ─────────────────────────────────────────
    #[error(transparent)]
    Import(#[from] ImportError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied
        } else {
            Self::Io(err.to_string())
        }
    }
}
