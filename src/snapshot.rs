//! Crash-safe persistence and the background snapshot worker.
//!
//! Serialization itself follows `abkve`'s `save`/`load` — `bincode` straight
//! over a `Write`/`Read` sink. What's new here is the durability envelope
//! around it: write to a temp file, `fsync`, rotate the previous snapshot to
//! `.bak`, then rename the temp file into place. A crash at any point before
//! the final rename leaves the previous snapshot (or its `.bak`) intact.

use crate::config::Config;
use crate::error::{Result, VdbError};
use crate::store::{EntityStore, SnapshotData};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

pub fn write_snapshot(data: &SnapshotData, config: &Config) -> Result<()> {
    fs::create_dir_all(config.snapshot_dir())?;

    let tmp_path = config.snapshot_tmp_path();
    {
        let mut file = File::create(&tmp_path)?;
        bincode::serialize_into(&mut file, data)?;
        file.flush()?;
        file.sync_all()?;
    }

    let final_path = config.snapshot_path.clone();
    if final_path.exists() {
        fs::rename(&final_path, config.snapshot_backup_path())?;
    }
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<SnapshotData> {
    let file = File::open(path)?;
    let data: SnapshotData = bincode::deserialize_from(file)?;
    if data.schema_version != crate::store::SNAPSHOT_SCHEMA_VERSION {
        return Err(VdbError::PersistenceError(format!(
            "snapshot schema version {} is not supported (expected {})",
            data.schema_version,
            crate::store::SNAPSHOT_SCHEMA_VERSION
        )));
    }
    Ok(data)
}

/// Tries the canonical snapshot, then its `.bak` rotation if the canonical
/// file is missing or fails to parse (e.g. a crash mid-write before a
/// previous run's rename completed).
pub fn load_snapshot_with_fallback(config: &Config) -> Option<SnapshotData> {
    let primary = config.snapshot_path.clone();
    if primary.exists() {
        match load_snapshot(&primary) {
            Ok(data) => return Some(data),
            Err(e) => warn!(error = %e, "primary snapshot failed to load, trying backup"),
        }
    }
    let backup = config.snapshot_backup_path();
    if backup.exists() {
        match load_snapshot(&backup) {
            Ok(data) => {
                warn!("recovered store state from backup snapshot");
                return Some(data);
            }
            Err(e) => error!(error = %e, "backup snapshot also failed to load"),
        }
    }
    None
}

/// Background worker that periodically persists the store when it has been
/// marked dirty since the last write. Mirrors the stop-channel pattern used
/// for graceful shutdown of long-lived worker threads.
///
/// The dirty flag itself is owned by the `EntityStore` (every mutating
/// operation sets it) and only shared here, not created here — a freshly
/// constructed, never-shared flag would never see a mutation happen.
pub struct Snapshotter {
    dirty: Arc<AtomicBool>,
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Snapshotter {
    pub fn spawn(store: Arc<EntityStore>, config: Config) -> Self {
        let dirty = store.dirty_flag();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker_dirty = Arc::clone(&dirty);
        let interval = config.snapshot_interval();

        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if worker_dirty.swap(false, Ordering::AcqRel) {
                        if let Err(e) = write_snapshot(&store.export_snapshot(), &config) {
                            error!(error = %e, "final snapshot on shutdown failed");
                        }
                    }
                    return;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    if worker_dirty.swap(false, Ordering::AcqRel) {
                        match write_snapshot(&store.export_snapshot(), &config) {
                            Ok(()) => info!("periodic snapshot written"),
                            Err(e) => {
                                error!(error = %e, "periodic snapshot failed");
                                worker_dirty.store(true, Ordering::Release);
                            }
                        }
                    }
                }
            }
        });

        Self {
            dirty,
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Whether a mutation has happened since the last successful write.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Stops the worker, flushing one final snapshot if anything changed
    /// since the last periodic write.
    pub fn shutdown(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Snapshotter {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
