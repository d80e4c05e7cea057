//! Durable recording state
//!
//! Each checkpoint is committed with a single atomic write (temp file and
//! rename), so a crash leaves either the previous or the new state on disk.
//! A claim file keeps two attempts from processing one recording at once.
//! The claim records the owning pid, so a claim left by a process that has
//! since died is taken over immediately and the recording resumes.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, warn};

use super::recording::Recording;
use crate::error::{Result, StemforgeError};

const RECORDING_EXT: &str = "json";
const LOCK_EXT: &str = "lock";

/// Claims older than this are taken over even if their pid is alive again,
/// which covers pid reuse after a reboot.
pub const DEFAULT_STALE_CLAIM_HOURS: i64 = 6;

/// Persistence for recordings and their checkpoints
pub trait RecordingStore: Send + Sync {
    fn load(&self, id: &str) -> Result<Recording>;

    /// Durably write the whole recording.
    fn save(&self, recording: &Recording) -> Result<()>;

    /// Claim exclusive processing of a recording until the guard drops.
    fn claim(&self, id: &str) -> Result<ClaimGuard>;
}

impl<T: RecordingStore + ?Sized> RecordingStore for Arc<T> {
    fn load(&self, id: &str) -> Result<Recording> {
        (**self).load(id)
    }

    fn save(&self, recording: &Recording) -> Result<()> {
        (**self).save(recording)
    }

    fn claim(&self, id: &str) -> Result<ClaimGuard> {
        (**self).claim(id)
    }
}

/// Claim file content
#[derive(Debug, Serialize, Deserialize)]
struct ClaimContent {
    pid: u32,
    started_at: DateTime<Utc>,
}

impl ClaimContent {
    /// Whether the claiming process can no longer be holding it.
    fn is_abandoned(&self) -> bool {
        Utc::now() - self.started_at > Duration::hours(DEFAULT_STALE_CLAIM_HOURS)
            || !process_alive(self.pid)
    }
}

fn process_alive(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// Held claim on one recording; released on drop.
#[derive(Debug)]
pub struct ClaimGuard {
    recording_id: String,
    path: PathBuf,
}

impl ClaimGuard {
    pub fn recording_id(&self) -> &str {
        &self.recording_id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release claim");
        } else {
            debug!(recording_id = %self.recording_id, "Claim released");
        }
    }
}

/// One JSON file per recording in a directory
#[derive(Debug, Clone)]
pub struct JsonRecordingStore {
    dir: PathBuf,
}

impl JsonRecordingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORDING_EXT))
    }

    fn lock_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, LOCK_EXT))
    }

    /// All stored recordings, newest first.
    pub fn list(&self) -> Result<Vec<Recording>> {
        let mut recordings = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORDING_EXT) {
                continue;
            }
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<Recording>(&content) {
                Ok(recording) => recordings.push(recording),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable recording"),
            }
        }
        recordings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(recordings)
    }

    fn try_create_lock(&self, lock_path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)?;
        let content = ClaimContent {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_string(&content).map_err(std::io::Error::other)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()
    }

    fn claim_is_stale(&self, lock_path: &Path) -> bool {
        let Ok(content) = fs::read_to_string(lock_path) else {
            return false;
        };
        match serde_json::from_str::<ClaimContent>(&content) {
            Ok(claim) => claim.is_abandoned(),
            // Unreadable claim: the writer died mid-write
            Err(_) => true,
        }
    }
}

impl RecordingStore for JsonRecordingStore {
    fn load(&self, id: &str) -> Result<Recording> {
        let path = self.record_path(id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StemforgeError::RecordingNotFound { id: id.to_string() })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, recording: &Recording) -> Result<()> {
        let path = self.record_path(&recording.id);
        let tmp = path.with_extension(format!("{}.tmp", RECORDING_EXT));
        let content = serde_json::to_string_pretty(recording)?;
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(recording_id = %recording.id, "Recording saved");
        Ok(())
    }

    fn claim(&self, id: &str) -> Result<ClaimGuard> {
        let lock_path = self.lock_path(id);
        match self.try_create_lock(&lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if !self.claim_is_stale(&lock_path) {
                    return Err(StemforgeError::RecordingBusy { id: id.to_string() });
                }
                warn!(recording_id = id, "Taking over claim left by a dead process");
                fs::remove_file(&lock_path)?;
                self.try_create_lock(&lock_path).map_err(|e| {
                    if e.kind() == ErrorKind::AlreadyExists {
                        StemforgeError::RecordingBusy { id: id.to_string() }
                    } else {
                        e.into()
                    }
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(recording_id = id, "Claim acquired");
        Ok(ClaimGuard {
            recording_id: id.to_string(),
            path: lock_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// Above every platform's pid range
    const EXITED_PID: u32 = 4_000_000_000;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        let recording = Recording::new("take.wav", "take", "default");
        store.save(&recording).unwrap();

        let loaded = store.load(&recording.id).unwrap();
        assert_eq!(loaded, recording);
        assert!(!dir.path().join(format!("{}.json.tmp", recording.id)).exists());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.load("nope"),
            Err(StemforgeError::RecordingNotFound { .. })
        ));
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();

        let guard = store.claim("r1").unwrap();
        assert_eq!(guard.recording_id(), "r1");
        assert!(matches!(
            store.claim("r1"),
            Err(StemforgeError::RecordingBusy { .. })
        ));
        // Other recordings are unaffected
        drop(store.claim("r2").unwrap());

        drop(guard);
        assert!(store.claim("r1").is_ok());
    }

    #[test]
    fn test_stale_claim_is_replaced() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        fs::write(
            dir.path().join("r1.lock"),
            r#"{"pid": 1234, "started_at": "2024-01-15T10:00:00Z"}"#,
        )
        .unwrap();

        let guard = store.claim("r1").unwrap();
        drop(guard);
        assert!(!dir.path().join("r1.lock").exists());
    }

    #[test]
    fn test_claim_of_dead_process_is_taken_over() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        let crashed = ClaimContent {
            pid: EXITED_PID,
            started_at: Utc::now() - Duration::minutes(1),
        };
        fs::write(
            dir.path().join("r1.lock"),
            serde_json::to_string(&crashed).unwrap(),
        )
        .unwrap();

        let guard = store.claim("r1").unwrap();
        let content = fs::read_to_string(dir.path().join("r1.lock")).unwrap();
        let claim: ClaimContent = serde_json::from_str(&content).unwrap();
        assert_eq!(claim.pid, std::process::id());
        drop(guard);
    }

    #[test]
    fn test_recent_claim_of_live_process_is_respected() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        let live = ClaimContent {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        fs::write(dir.path().join("r1.lock"), serde_json::to_string(&live).unwrap()).unwrap();

        assert!(matches!(
            store.claim("r1"),
            Err(StemforgeError::RecordingBusy { .. })
        ));
        assert!(dir.path().join("r1.lock").exists());
    }

    #[test]
    fn test_list_skips_lock_files() {
        let dir = tempdir().unwrap();
        let store = JsonRecordingStore::new(dir.path()).unwrap();
        store.save(&Recording::new("a.wav", "a", "default")).unwrap();
        store.save(&Recording::new("b.wav", "b", "default")).unwrap();
        let _guard = store.claim("busy").unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
    }
}
