//! Persisted device state.
//!
//! [`DeviceSnapshot`] is an **owned**, opaque byte blob produced by
//! [`Device::save_snapshot`](crate::device::Device::save_snapshot). Its contents are
//! never inspected here; a snapshot is either byte-identical to something a device
//! produced, or it is treated as absent.
//!
//! [`SnapshotStore`] owns the single well-known location on disk.
//!
//! # Semantics
//! - `load()` never fails hard: a missing, unreadable or implausibly small file is
//!   reported as `None` and logged.
//! - `save()` writes to a sibling temp file and renames it over the target, so a
//!   crash mid-write leaves the previous snapshot intact.
//! - The parent directory is created on first save.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Anything smaller than this cannot be a complete device state.
pub const DEFAULT_MIN_SNAPSHOT_BYTES: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSnapshot(pub Vec<u8>);

impl DeviceSnapshot {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the snapshot and return the raw bytes.
    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for DeviceSnapshot {
    fn from(bytes: Vec<u8>) -> Self {
        DeviceSnapshot(bytes)
    }
}

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    min_bytes: usize,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_bytes: DEFAULT_MIN_SNAPSHOT_BYTES,
        }
    }

    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored snapshot, or `None` when there is nothing usable.
    pub fn load(&self) -> Option<DeviceSnapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no saved state found, starting fresh");
                return None;
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not read saved state, starting fresh"
                );
                return None;
            }
        };

        if bytes.len() < self.min_bytes {
            warn!(
                path = %self.path.display(),
                len = bytes.len(),
                min = self.min_bytes,
                "saved state is implausibly small, discarding"
            );
            return None;
        }

        debug!(path = %self.path.display(), len = bytes.len(), "loaded saved state");
        Some(DeviceSnapshot(bytes))
    }

    /// Atomically replaces the stored snapshot.
    pub fn save(&self, snapshot: &DeviceSnapshot) -> Result<()> {
        if snapshot.len() < self.min_bytes {
            return Err(Error::Snapshot(format!(
                "refusing to persist {}-byte snapshot (minimum {})",
                snapshot.len(),
                self.min_bytes
            )));
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(snapshot.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), len = snapshot.len(), "saved state");
        Ok(())
    }
}
