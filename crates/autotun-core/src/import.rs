// ── Tunnel import pipeline ──
//
// Turns raw profile text, `.conf` files and `.zip` archives into stored
// `TunnelConfig` records. Each created tunnel is committed on its own;
// an archive import is best-effort, not transactional.

use std::io::{Cursor, Read};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{ImportError, StoreError};
use crate::model::{NewTunnel, TunnelConfig};
use crate::profile::{self, ARCHIVE_EXTENSION, PROFILE_EXTENSION};
use crate::store::TunnelConfigStore;

/// Highest numeric suffix tried when resolving a name collision.
const MAX_NAME_SUFFIX: u32 = 999;

/// Fallback name when a file name has no usable stem.
const DEFAULT_NAME: &str = "tunnel";

/// Tunnels created by one import call, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub created: Vec<TunnelConfig>,
}

impl ImportReport {
    pub fn count(&self) -> usize {
        self.created.len()
    }
}

pub struct TunnelImporter {
    store: Arc<dyn TunnelConfigStore>,
}

impl TunnelImporter {
    pub fn new(store: Arc<dyn TunnelConfigStore>) -> Self {
        Self { store }
    }

    /// Import one profile. Nothing is stored if the text is invalid.
    ///
    /// The tunnel is named after `name_hint` with any extension removed;
    /// a taken name gets a `(n)` suffix.
    pub fn import_single(&self, name_hint: &str, raw_text: &str) -> Result<TunnelConfig, ImportError> {
        profile::validate(raw_text)?;
        let (stem, _) = profile::split_file_name(name_hint.trim());
        let base = if stem.trim().is_empty() { DEFAULT_NAME } else { stem.trim() };
        let created = self.create_unique(base, raw_text)?;
        info!(tunnel = %created.name, "imported tunnel");
        Ok(created)
    }

    /// Import profile text that came without a file name, such as a
    /// scanned code. The tunnel gets a generated `tunnel-NNNN` name.
    pub fn import_text(&self, raw_text: &str) -> Result<TunnelConfig, ImportError> {
        let suffix: u16 = rand::thread_rng().gen_range(1000..10_000);
        self.import_single(&format!("{DEFAULT_NAME}-{suffix}"), raw_text)
    }

    /// Import every `.conf` entry of a zip archive.
    ///
    /// Directories and other extensions are skipped. An entry that fails
    /// to read or validate is logged and dropped. Fails with
    /// [`ImportError::EmptyArchive`] only if nothing was created.
    pub fn import_archive(&self, raw_bytes: &[u8]) -> Result<ImportReport, ImportError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(raw_bytes))
            .map_err(|e| ImportError::Archive(e.to_string()))?;

        let mut report = ImportReport::default();
        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(index, error = %e, "skipping unreadable archive entry");
                    continue;
                }
            };
            let entry_name = entry.name().to_owned();

            if entry.is_dir() {
                continue;
            }
            let (_, ext) = profile::split_file_name(&entry_name);
            if ext.as_deref() != Some(PROFILE_EXTENSION) {
                debug!(entry = %entry_name, "skipping non-profile entry");
                continue;
            }

            let mut text = String::new();
            if let Err(e) = entry.read_to_string(&mut text) {
                warn!(entry = %entry_name, error = %e, "skipping unreadable profile");
                continue;
            }

            match self.import_single(&entry_name, &text) {
                Ok(created) => report.created.push(created),
                Err(e) => warn!(entry = %entry_name, error = %e, "skipping invalid profile"),
            }
        }

        if report.created.is_empty() {
            return Err(ImportError::EmptyArchive);
        }
        info!(count = report.count(), "archive imported");
        Ok(report)
    }

    /// Dispatch on the file extension: `.conf` or `.zip`.
    pub fn import_file(&self, file_name: &str, bytes: &[u8]) -> Result<ImportReport, ImportError> {
        let (_, ext) = profile::split_file_name(file_name);
        match ext.as_deref() {
            Some(PROFILE_EXTENSION) => {
                let text = std::str::from_utf8(bytes).map_err(|e| ImportError::InvalidFormat {
                    reason: format!("profile is not UTF-8: {e}"),
                })?;
                let created = self.import_single(file_name, text)?;
                Ok(ImportReport {
                    created: vec![created],
                })
            }
            Some(ARCHIVE_EXTENSION) => self.import_archive(bytes),
            _ => Err(ImportError::UnsupportedExtension {
                file_name: file_name.to_owned(),
            }),
        }
    }

    // ── Naming ───────────────────────────────────────────────────────

    /// Create under `base`, or the first free `base(n)`.
    ///
    /// The store is the authority on uniqueness, so a name that was free
    /// a moment ago but is taken at `create` just moves on to the next
    /// candidate.
    fn create_unique(&self, base: &str, raw_text: &str) -> Result<TunnelConfig, ImportError> {
        let candidates = std::iter::once(base.to_owned())
            .chain((1..=MAX_NAME_SUFFIX).map(|n| format!("{base}({n})")));

        for name in candidates {
            if self.store.find_by_name(&name).is_some() {
                continue;
            }
            match self.store.create(NewTunnel {
                name,
                profile_text: raw_text.to_owned(),
            }) {
                Ok(created) => return Ok(created),
                Err(StoreError::DuplicateName { name }) => {
                    debug!(%name, "name taken concurrently, trying next");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ImportError::DuplicateNameUnresolvable {
            name: base.to_owned(),
        })
    }
}
