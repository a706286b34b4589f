// # File Record Tracker
//
// File-based implementation of `RecordTracker` with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename for atomicity
// - Corruption detection: validates JSON on load
// - Automatic backup: keeps `.backup` of the last known good state
// - Recovery: falls back to backup if corruption is detected
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "records": [
//     {
//       "key": {"provider": "cloudflare", "zone": "example.com", "name": "api.example.com", "record_type": "A"},
//       "id": "abc123",
//       "created_at": "2026-01-09T12:00:00Z",
//       "orphaned_at": null
//     }
//   ],
//   "preserved_hostnames": ["*.admin.example.com"],
//   "managed_hostnames": []
// }
// ```

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::tracker::{ManagedHostname, RecordKey, RecordTracker, TrackedRecord, matches_preserved};

const TRACKER_FILE_VERSION: &str = "1.0";

/// File-based record tracker with crash recovery.
///
/// Writes atomically (temp file + rename) and keeps a `.backup` copy to
/// fall back to if the primary file is found corrupt on load. The on-disk
/// document carries the full tracked-record index plus the operator-owned
/// preserved and managed hostname lists.
#[derive(Debug)]
pub struct FileRecordTracker {
    path: PathBuf,
    state: Arc<RwLock<TrackerState>>,
}

#[derive(Debug)]
struct TrackerState {
    records: Vec<TrackedRecord>,
    preserved_hostnames: Vec<String>,
    managed_hostnames: Vec<ManagedHostname>,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct TrackerFileFormat {
    version: String,
    records: Vec<TrackedRecord>,
    #[serde(default)]
    preserved_hostnames: Vec<String>,
    #[serde(default)]
    managed_hostnames: Vec<ManagedHostname>,
}

impl FileRecordTracker {
    /// Create or load a file-backed tracker.
    ///
    /// Preserved hostnames passed here seed the on-disk document only on
    /// first creation; once persisted, the file is authoritative.
    pub async fn new<P: AsRef<Path>>(
        path: P,
        initial_preserved_hostnames: Vec<String>,
        initial_managed_hostnames: Vec<ManagedHostname>,
    ) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "failed to create tracker directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let loaded = Self::load_with_recovery(&path).await?;
        let (records, preserved_hostnames, managed_hostnames) = match loaded {
            Some(format) => (format.records, format.preserved_hostnames, format.managed_hostnames),
            None => (Vec::new(), initial_preserved_hostnames, initial_managed_hostnames),
        };

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(TrackerState {
                records,
                preserved_hostnames,
                managed_hostnames,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<Option<TrackerFileFormat>, Error> {
        match Self::load(path).await {
            Ok(format) => Ok(format),
            Err(e) => {
                let error_str = e.to_string().to_lowercase();
                let looks_corrupted = error_str.contains("json")
                    || error_str.contains("parse")
                    || error_str.contains("expected value");
                if !looks_corrupted {
                    return Err(e);
                }

                tracing::warn!(
                    "tracker file appears corrupted: {}. attempting recovery from backup",
                    e
                );
                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("no backup file found, starting with empty tracker");
                    return Ok(None);
                }
                match Self::load(&backup_path).await {
                    Ok(format) => {
                        tracing::info!("recovered tracker state from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!("failed to restore tracker from backup: {restore_err}");
                        }
                        Ok(Some(format))
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "backup tracker file also corrupted: {backup_err}. starting empty"
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn load(path: &Path) -> Result<Option<TrackerFileFormat>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| Error::tracker(format!("failed to read tracker file: {e}")))?;
        let format: TrackerFileFormat = serde_json::from_str(&content)
            .map_err(|e| Error::tracker(format!("failed to parse tracker file: {e}")))?;
        if format.version != TRACKER_FILE_VERSION {
            tracing::warn!(
                "tracker file version mismatch: expected {}, got {}",
                TRACKER_FILE_VERSION,
                format.version
            );
        }
        Ok(Some(format))
    }

    async fn write_state(&self) -> Result<(), Error> {
        let guard = self.state.read().await;
        let format = TrackerFileFormat {
            version: TRACKER_FILE_VERSION.to_string(),
            records: guard.records.clone(),
            preserved_hostnames: guard.preserved_hostnames.clone(),
            managed_hostnames: guard.managed_hostnames.clone(),
        };
        drop(guard);

        let json = serde_json::to_string_pretty(&format)
            .map_err(|e| Error::tracker(format!("failed to serialize tracker state: {e}")))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path)
                .await
                .map_err(|e| Error::tracker(format!("failed to create temp file: {e}")))?;
            file.write_all(json.as_bytes())
                .await
                .map_err(|e| Error::tracker(format!("failed to write temp file: {e}")))?;
            file.flush()
                .await
                .map_err(|e| Error::tracker(format!("failed to flush temp file: {e}")))?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("failed to create tracker backup: {e}");
            }
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::tracker(format!("failed to rename tracker file: {e}")))?;

        let mut guard = self.state.write().await;
        guard.dirty = false;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl RecordTracker for FileRecordTracker {
    async fn is_tracked(&self, key: &RecordKey) -> Result<bool, Error> {
        let guard = self.state.read().await;
        Ok(guard.records.iter().any(|r| &r.key == key))
    }

    async fn track(&self, key: &RecordKey, id: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.records.retain(|r| &r.key != key);
            guard.records.push(TrackedRecord {
                key: key.clone(),
                id: id.to_string(),
                created_at: Utc::now(),
                orphaned_at: None,
            });
            guard.dirty = true;
        }
        self.write_state().await
    }

    async fn update_id(&self, key: &RecordKey, new_id: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if let Some(record) = guard.records.iter_mut().find(|r| &r.key == key) {
                record.id = new_id.to_string();
            } else {
                return Err(Error::tracker(format!(
                    "cannot update id for untracked key {key:?}"
                )));
            }
            guard.dirty = true;
        }
        self.write_state().await
    }

    async fn untrack(&self, key: &RecordKey) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.records.retain(|r| &r.key != key);
            guard.dirty = true;
        }
        self.write_state().await
    }

    async fn mark_orphan(&self, key: &RecordKey) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if let Some(record) = guard.records.iter_mut().find(|r| &r.key == key) {
                record.orphaned_at = Some(Utc::now());
            }
            guard.dirty = true;
        }
        self.write_state().await
    }

    async fn is_orphan(&self, key: &RecordKey) -> Result<bool, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .records
            .iter()
            .any(|r| &r.key == key && r.orphaned_at.is_some()))
    }

    async fn orphaned_at(&self, key: &RecordKey) -> Result<Option<chrono::DateTime<Utc>>, Error> {
        let guard = self.state.read().await;
        Ok(guard
            .records
            .iter()
            .find(|r| &r.key == key)
            .and_then(|r| r.orphaned_at))
    }

    async fn clear_orphan(&self, key: &RecordKey) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if let Some(record) = guard.records.iter_mut().find(|r| &r.key == key) {
                record.orphaned_at = None;
            }
            guard.dirty = true;
        }
        self.write_state().await
    }

    async fn should_preserve(&self, fqdn: &str) -> Result<bool, Error> {
        let guard = self.state.read().await;
        Ok(matches_preserved(fqdn, &guard.preserved_hostnames))
    }

    async fn all_tracked(&self) -> Result<Vec<TrackedRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard.records.clone())
    }

    async fn managed_hostnames(&self) -> Result<Vec<ManagedHostname>, Error> {
        let guard = self.state.read().await;
        Ok(guard.managed_hostnames.clone())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty {
            self.write_state().await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::RecordType;
    use tempfile::tempdir;

    fn key(name: &str) -> RecordKey {
        RecordKey {
            provider: "cloudflare".to_string(),
            zone: "example.com".to_string(),
            name: name.to_string(),
            record_type: RecordType::A,
        }
    }

    #[tokio::test]
    async fn track_and_lookup_roundtrips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let tracker = FileRecordTracker::new(&path, Vec::new(), Vec::new())
            .await
            .unwrap();

        let k = key("api.example.com");
        assert!(!tracker.is_tracked(&k).await.unwrap());
        tracker.track(&k, "rec-1").await.unwrap();
        assert!(tracker.is_tracked(&k).await.unwrap());

        let reloaded = FileRecordTracker::new(&path, Vec::new(), Vec::new())
            .await
            .unwrap();
        assert!(reloaded.is_tracked(&k).await.unwrap());
    }

    #[tokio::test]
    async fn orphan_lifecycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let tracker = FileRecordTracker::new(&path, Vec::new(), Vec::new())
            .await
            .unwrap();

        let k = key("api.example.com");
        tracker.track(&k, "rec-1").await.unwrap();
        assert!(!tracker.is_orphan(&k).await.unwrap());

        tracker.mark_orphan(&k).await.unwrap();
        assert!(tracker.is_orphan(&k).await.unwrap());
        assert!(tracker.orphaned_at(&k).await.unwrap().is_some());

        tracker.clear_orphan(&k).await.unwrap();
        assert!(!tracker.is_orphan(&k).await.unwrap());
    }

    #[tokio::test]
    async fn corruption_recovers_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let tracker = FileRecordTracker::new(&path, Vec::new(), Vec::new())
            .await
            .unwrap();

        tracker.track(&key("a.example.com"), "rec-1").await.unwrap();
        tracker.track(&key("b.example.com"), "rec-2").await.unwrap();

        let backup_path = FileRecordTracker::backup_path(&path);
        assert!(backup_path.exists());

        fs::write(&path, b"not json").await.unwrap();

        let recovered = FileRecordTracker::new(&path, Vec::new(), Vec::new())
            .await
            .expect("should recover from backup");
        assert!(recovered.is_tracked(&key("a.example.com")).await.unwrap());
    }
}
