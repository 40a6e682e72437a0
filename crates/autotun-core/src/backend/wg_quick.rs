// ── wg-quick backend ──
//
// Drives the host's WireGuard tooling: the profile is written to a
// private work directory, `wg-quick up/down` manages the interface and
// `wg show <iface> dump` supplies per-peer counters.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::VpnBackend;
use crate::error::BackendError;
use crate::model::{PeerStats, ProcessState, TunnelConfig, TunnelId};

const WG_QUICK: &str = "wg-quick";
const WG: &str = "wg";
const KERNEL_MODULE_PATH: &str = "/sys/module/wireguard";

#[derive(Debug, Clone, Copy, Default)]
struct Status {
    state: ProcessState,
    tunnel: Option<TunnelId>,
}

/// Production backend shelling out to `wg-quick` and `wg`.
pub struct WgQuickBackend {
    interface: String,
    work_dir: PathBuf,
    status: Mutex<Status>,
    /// Serializes up/down so two transitions never interleave.
    op_lock: AsyncMutex<()>,
}

impl WgQuickBackend {
    pub fn new(interface: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            interface: interface.into(),
            work_dir: work_dir.into(),
            status: Mutex::new(Status::default()),
            op_lock: AsyncMutex::new(()),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Adopt an interface left up by a previous process.
    ///
    /// The interface counts as ours only if our profile file is still in
    /// the work dir and `wg show` knows the interface.
    pub async fn detect(&self) -> ProcessState {
        if !self.profile_path().exists() {
            return ProcessState::Down;
        }
        let alive = run(WG, &["show", &self.interface])
            .await
            .is_ok_and(|out| out.status.success());
        if !alive {
            return ProcessState::Down;
        }

        let tunnel = tokio::fs::read_to_string(self.marker_path())
            .await
            .ok()
            .and_then(|raw| raw.trim().parse().ok());
        self.set_status(ProcessState::Up, tunnel);
        debug!(interface = %self.interface, ?tunnel, "adopted running interface");
        ProcessState::Up
    }

    fn profile_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.conf", self.interface))
    }

    fn marker_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.tunnel", self.interface))
    }

    fn status(&self) -> Status {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, state: ProcessState, tunnel: Option<TunnelId>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = Status { state, tunnel };
    }

    async fn write_profile(&self, tunnel: &TunnelConfig) -> Result<PathBuf, BackendError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let path = self.profile_path();
        tokio::fs::write(&path, tunnel.profile_text.as_bytes()).await?;
        restrict_permissions(&path).await?;
        tokio::fs::write(self.marker_path(), tunnel.id.to_string()).await?;
        Ok(path)
    }

    async fn remove_profile(&self) {
        for path in [self.profile_path(), self.marker_path()] {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove tunnel file");
                }
            }
        }
    }
}

#[async_trait]
impl VpnBackend for WgQuickBackend {
    async fn start(&self, tunnel: &TunnelConfig) -> Result<ProcessState, BackendError> {
        let _op = self.op_lock.lock().await;
        if self.status().state != ProcessState::Down {
            return Err(BackendError::AlreadyRunning);
        }
        self.set_status(ProcessState::Transitioning, Some(tunnel.id));

        let result = async {
            let path = self.write_profile(tunnel).await?;
            let out = run(WG_QUICK, &["up", &path.to_string_lossy()]).await?;
            check_output(&out)
        }
        .await;

        match result {
            Ok(()) => {
                self.set_status(ProcessState::Up, Some(tunnel.id));
                info!(tunnel = %tunnel.name, interface = %self.interface, "interface up");
                Ok(ProcessState::Up)
            }
            Err(e) => {
                self.remove_profile().await;
                self.set_status(ProcessState::Down, None);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let _op = self.op_lock.lock().await;
        let current = self.status();
        if current.state == ProcessState::Down {
            return Ok(());
        }
        self.set_status(ProcessState::Transitioning, current.tunnel);

        let path = self.profile_path();
        let result = match run(WG_QUICK, &["down", &path.to_string_lossy()]).await {
            Ok(out) => check_output(&out),
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            // Leave the state as it was so a later stop can retry.
            self.set_status(current.state, current.tunnel);
            warn!(interface = %self.interface, error = %e, "wg-quick down failed");
            return result;
        }

        self.remove_profile().await;
        self.set_status(ProcessState::Down, None);
        info!(interface = %self.interface, "interface down");
        Ok(())
    }

    async fn statistics(&self) -> Result<Vec<PeerStats>, BackendError> {
        if self.status().state != ProcessState::Up {
            return Ok(Vec::new());
        }
        let out = run(WG, &["show", &self.interface, "dump"]).await?;
        check_output(&out)?;
        Ok(parse_dump(&String::from_utf8_lossy(&out.stdout)))
    }

    async fn check_kernel_support(&self) -> Result<(), BackendError> {
        if !Path::new(KERNEL_MODULE_PATH).exists() {
            return Err(BackendError::StartFailed {
                reason: "wireguard kernel module is not loaded".into(),
            });
        }
        let out = run(WG, &["show", "interfaces"]).await?;
        check_output(&out)
    }

    fn process_state(&self) -> ProcessState {
        self.status().state
    }

    fn active_tunnel(&self) -> Option<TunnelId> {
        self.status().tunnel
    }
}

// ── Process helpers ──────────────────────────────────────────────────

async fn run(program: &str, args: &[&str]) -> Result<Output, BackendError> {
    debug!(program, ?args, "running");
    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::ToolMissing {
                tool: program.to_owned(),
            },
            _ => e.into(),
        })
}

fn check_output(out: &Output) -> Result<(), BackendError> {
    if out.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&out.stderr);
    let reason = stderr.trim();
    let lowered = reason.to_ascii_lowercase();
    if lowered.contains("permission denied")
        || lowered.contains("operation not permitted")
        || lowered.contains("must be run as root")
    {
        return Err(BackendError::PermissionDenied);
    }
    Err(BackendError::StartFailed {
        reason: if reason.is_empty() {
            format!("exited with {}", out.status)
        } else {
            reason.to_owned()
        },
    })
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), BackendError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), BackendError> {
    Ok(())
}

/// Parse the peer lines of `wg show <iface> dump`.
///
/// The first line describes the interface and is skipped. Peer lines are
/// tab-separated: public key, preshared key, endpoint, allowed ips,
/// latest handshake, rx bytes, tx bytes, keepalive. Malformed lines are
/// ignored.
pub fn parse_dump(dump: &str) -> Vec<PeerStats> {
    dump.lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 8 {
                return None;
            }
            Some(PeerStats {
                peer_key: fields[0].to_owned(),
                latest_handshake_epoch_secs: fields[4].parse().ok()?,
                rx_bytes: fields[5].parse().ok()?,
                tx_bytes: fields[6].parse().ok()?,
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DUMP: &str = "cHJpdmF0ZQ==\tcHVibGlj\t51820\toff\n\
        peerA=\t(none)\t203.0.113.5:51820\t0.0.0.0/0\t1700000000\t1024\t2048\t25\n\
        peerB=\t(none)\t(none)\t10.0.0.2/32\t0\t0\t0\toff\n\
        garbage line\n";

    #[test]
    fn dump_yields_one_entry_per_peer() {
        let peers = parse_dump(DUMP);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].peer_key, "peerA=");
        assert_eq!(peers[0].latest_handshake_epoch_secs, 1_700_000_000);
        assert_eq!(peers[0].rx_bytes, 1024);
        assert_eq!(peers[0].tx_bytes, 2048);
        assert_eq!(peers[1], PeerStats::never("peerB="));
    }

    #[test]
    fn empty_dump_has_no_peers() {
        assert!(parse_dump("").is_empty());
        assert!(parse_dump("iface-only\tline\t1\toff\n").is_empty());
    }

    #[tokio::test]
    async fn idle_backend_reports_down_without_running_tools() {
        let dir = tempfile::tempdir().unwrap();
        let backend = WgQuickBackend::new("wgtest0", dir.path());
        assert_eq!(backend.process_state(), ProcessState::Down);
        assert!(backend.statistics().await.unwrap().is_empty());
        backend.stop().await.unwrap();
        assert_eq!(backend.detect().await, ProcessState::Down);
    }
}
