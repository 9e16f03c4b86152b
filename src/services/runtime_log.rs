use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{RuntimeLog, RuntimeLogEntry, SnapshotSet, TeamRuntimeLog, TeamSnapshot};

const RUNTIME_LOG_FILE: &str = "runtime_log.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write runtime log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode runtime log: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Applies one team snapshot to that team's log. Returns true when an entry changed.
///
/// An entry is replaced only when the observed runtime differs from the recorded one, so
/// `since` keeps pointing at the first time the current value was seen. A snapshot older
/// than an entry's `since` never touches it.
pub fn merge_team(team_log: &mut TeamRuntimeLog, snapshot: &TeamSnapshot) -> bool {
    let Some(updated) = snapshot.updated else {
        return false;
    };

    let mut changed = false;
    for image in &snapshot.images {
        let Some(os) = image.os else {
            continue;
        };

        match team_log.get(&os) {
            Some(entry) if entry.runtime == image.runtime => {}
            Some(entry) if updated < entry.since => {
                debug!(
                    "Ignoring {} runtime {} from {} older than recorded {}",
                    os, image.runtime, updated, entry.since
                );
            }
            _ => {
                team_log.insert(
                    os,
                    RuntimeLogEntry {
                        runtime: image.runtime,
                        since: updated,
                    },
                );
                changed = true;
            }
        }
    }
    changed
}

/// Applies every team present in `snapshots`. Teams mapped to `None`, or absent, are left alone.
pub fn merge_snapshots(log: &mut RuntimeLog, snapshots: &SnapshotSet) -> bool {
    let mut changed = false;
    for (team_id, snapshot) in snapshots {
        let Some(snapshot) = snapshot else {
            continue;
        };
        if snapshot.updated.is_none() {
            warn!("Snapshot for team {} has no updated time, skipping merge", team_id);
            continue;
        }
        let team_log = log.entry(team_id.clone()).or_default();
        changed |= merge_team(team_log, snapshot);
    }
    changed
}

/// Runtime log backed by a JSON file in the state directory.
#[derive(Debug)]
pub struct RuntimeLogStore {
    path: PathBuf,
    log: RuntimeLog,
}

impl RuntimeLogStore {
    pub fn path_in(state_dir: &Path) -> PathBuf {
        state_dir.join(RUNTIME_LOG_FILE)
    }

    /// Loads the log, starting empty when the file is missing or unreadable.
    pub fn load(state_dir: &Path) -> Self {
        let path = Self::path_in(state_dir);
        let log = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<RuntimeLog>(&raw) {
                Ok(log) => {
                    info!(
                        "Loaded runtime log for {} teams from {}",
                        log.len(),
                        path.display()
                    );
                    log
                }
                Err(err) => {
                    warn!(
                        "Runtime log at {} is corrupt, starting empty: {}",
                        path.display(),
                        err
                    );
                    RuntimeLog::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No runtime log at {}, starting empty", path.display());
                RuntimeLog::new()
            }
            Err(err) => {
                warn!(
                    "Failed to read runtime log at {}, starting empty: {}",
                    path.display(),
                    err
                );
                RuntimeLog::new()
            }
        };
        Self { path, log }
    }

    pub fn log(&self) -> &RuntimeLog {
        &self.log
    }

    pub fn merge(&mut self, snapshots: &SnapshotSet) -> bool {
        merge_snapshots(&mut self.log, snapshots)
    }

    pub fn forget_team(&mut self, team_id: &str) -> bool {
        self.log.remove(team_id).is_some()
    }

    /// Writes to a sibling temp file, then renames over the real one.
    pub fn save(&self) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(&self.log)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, encoded).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!("Saved runtime log to {}", self.path.display());
        Ok(())
    }
}
