//! Durable single-slot storage for the last observed job snapshot.
//!
//! Persistence is best-effort: in-memory monitor state stays authoritative
//! for the current process lifetime, so every failure here is logged and
//! swallowed rather than propagated.

use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::job::SyncJob;

/// Single-slot store for the last observed job snapshot.
///
/// `save` overwrites the one stored blob, `load` is read once at bootstrap,
/// `clear` removes the blob. All three are idempotent. Only the monitor's
/// transition path writes.
pub trait JobStore: Send + Sync {
    fn save(&self, job: &SyncJob);
    fn load(&self) -> Option<SyncJob>;
    fn clear(&self);
}

/// File-backed store: one fixed JSON file, absent when no job is tracked.
pub struct FileJobStore {
    path: PathBuf,
}

impl FileJobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl JobStore for FileJobStore {
    fn save(&self, job: &SyncJob) {
        let json = match serde_json::to_vec(job) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize sync job for persistence: {}", e);
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Failed to create state directory {:?}: {}", parent, e);
                return;
            }
        }

        // Write to a sibling tmp file and rename it into place so a crash
        // mid-write never leaves a truncated blob behind.
        let tmp = self.tmp_path();
        if let Err(e) = fs::write(&tmp, &json) {
            warn!("Failed to write sync state to {:?}: {}", tmp, e);
            return;
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            warn!("Failed to move sync state into place: {}", e);
        }
    }

    fn load(&self) -> Option<SyncJob> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return None,
        };
        match serde_json::from_slice(&bytes) {
            Ok(job) => Some(job),
            Err(e) => {
                // Corrupt state is treated as absence.
                warn!(
                    "Discarding unreadable sync state at {:?}: {}",
                    self.path, e
                );
                None
            }
        }
    }

    fn clear(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Cleared persisted sync state"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to clear sync state at {:?}: {}", self.path, e),
        }
    }
}

/// In-memory store for tests.
#[derive(Default)]
pub struct MemoryJobStore {
    slot: Mutex<Option<SyncJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn save(&self, job: &SyncJob) {
        *self.slot.lock() = Some(job.clone());
    }

    fn load(&self) -> Option<SyncJob> {
        self.slot.lock().clone()
    }

    fn clear(&self) {
        *self.slot.lock() = None;
    }
}
