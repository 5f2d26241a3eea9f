// # Sync State File
//
// Durable JSON snapshot of the parity reconciler's progress. The file is
// advisory: operators and tooling read it to decide when failback is safe,
// and a missing or corrupted file simply means a fresh start.
//
// ## Crash Safety
//
// Writes go to a temporary file first and are renamed into place, so a
// reader never observes a torn snapshot and a crash mid-write leaves the
// previous snapshot intact.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::Error;
use crate::config::Role;

/// Per-reconciler durable progress record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncState {
    /// When the last cycle ran
    #[serde(default)]
    pub last_check_ts: Option<chrono::DateTime<chrono::Utc>>,

    /// When data was last repaired
    #[serde(default)]
    pub last_sync_ts: Option<chrono::DateTime<chrono::Utc>>,

    /// Consecutive cycles with zero gaps and zero new units
    #[serde(default)]
    pub consecutive_clean: u32,

    /// Whether failback has been declared safe
    #[serde(default)]
    pub failback_ready: bool,

    /// Site the lease pointed at during the last cycle
    #[serde(default)]
    pub active_site: Option<Role>,

    /// Units compared in the last cycle
    #[serde(default)]
    pub units_checked: u64,

    /// Units found lacking in the last cycle
    #[serde(default)]
    pub units_with_gap: u64,

    /// Units repaired over the reconciler's lifetime
    #[serde(default)]
    pub units_synced: u64,

    /// Rows (or bytes, for bucketed stores) transferred over the
    /// reconciler's lifetime
    #[serde(default)]
    pub rows_synced: u64,

    /// Collections seen on the active side but absent here, last cycle
    #[serde(default)]
    pub new_units: Vec<String>,

    /// Most recent error, cleared by a clean cycle
    #[serde(default)]
    pub last_error: Option<String>,
}

/// Atomic JSON persistence for [`SyncState`]
#[derive(Debug)]
pub struct SyncStateFile {
    path: PathBuf,
}

impl SyncStateFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the snapshot, treating a missing or corrupted file as a fresh
    /// start.
    pub async fn load(&self) -> SyncState {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no state file, starting fresh");
                return SyncState::default();
            }
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file unreadable, starting fresh"
                );
                return SyncState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "state file corrupted, starting fresh"
                );
                SyncState::default()
            }
        }
    }

    /// Persist the snapshot via write-then-rename.
    ///
    /// Failures here are fatal to the reconciler: continuing would
    /// silently lose progress the failback decision depends on.
    pub async fn save(&self, state: &SyncState) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_file(format!("cannot create {}: {}", parent.display(), e))
                })?;
            }
        }

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| Error::state_file(format!("cannot serialize state: {}", e)))?;

        let temp_path = {
            let mut temp = self.path.clone();
            temp.set_extension("tmp");
            temp
        };

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_file(format!("cannot create {}: {}", temp_path.display(), e))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_file(format!("cannot write {}: {}", temp_path.display(), e))
            })?;
            file.flush().await.map_err(|e| {
                Error::state_file(format!("cannot flush {}: {}", temp_path.display(), e))
            })?;
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_file(format!(
                "cannot rename into {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!(path = %self.path.display(), "state written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let file = SyncStateFile::new(dir.path().join("sync.json"));

        let state = file.load().await;
        assert_eq!(state.consecutive_clean, 0);
        assert!(!state.failback_ready);
        assert!(state.active_site.is_none());
    }

    #[tokio::test]
    async fn corrupted_file_loads_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let state = SyncStateFile::new(&path).load().await;
        assert_eq!(state.consecutive_clean, 0);
    }

    #[tokio::test]
    async fn save_load_round_trip() {
        let dir = tempdir().unwrap();
        let file = SyncStateFile::new(dir.path().join("state/sync.json"));

        let mut state = SyncState::default();
        state.consecutive_clean = 2;
        state.failback_ready = false;
        state.active_site = Some(Role::Primary);
        state.units_checked = 14;
        state.rows_synced = 12345;
        state.last_error = Some("remote unhealthy".to_string());

        file.save(&state).await.unwrap();
        let loaded = file.load().await;

        assert_eq!(loaded.consecutive_clean, 2);
        assert_eq!(loaded.active_site, Some(Role::Primary));
        assert_eq!(loaded.units_checked, 14);
        assert_eq!(loaded.rows_synced, 12345);
        assert_eq!(loaded.last_error.as_deref(), Some("remote unhealthy"));
    }

    #[tokio::test]
    async fn save_overwrites_previous_snapshot() {
        let dir = tempdir().unwrap();
        let file = SyncStateFile::new(dir.path().join("sync.json"));

        let mut state = SyncState::default();
        for clean in 0..5 {
            state.consecutive_clean = clean;
            file.save(&state).await.unwrap();
        }

        assert_eq!(file.load().await.consecutive_clean, 4);
    }
}
