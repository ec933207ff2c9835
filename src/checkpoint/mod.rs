//! Checkpoint persistence for project documents.
//!
//! Layout under `<root>/<project_id>/`:
//! - `state.json` — the latest document, overwritten atomically
//! - `checkpoints/NNNN-<stage>.json` — ordered per-stage snapshots
//! - `.lock` — exclusive advisory lock held for the duration of a run
//!
//! Only `state.json` is required for resume; snapshots are kept for
//! inspection and pruned to a bounded count.

use crate::document::ProjectDocument;
use crate::errors::CheckpointError;
use crate::stage::Stage;
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_RETENTION: usize = 20;

/// One snapshot on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub seq: u32,
    pub stage: Stage,
    pub path: PathBuf,
}

/// Exclusive per-project run lock. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // best effort; the lock also dies with the fd
        let _ = FileExt::unlock(&self.file);
        debug!(path = %self.path.display(), "released run lock");
    }
}

pub struct CheckpointManager {
    root: PathBuf,
    retention: usize,
}

impl CheckpointManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    fn state_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("state.json")
    }

    fn checkpoints_dir(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("checkpoints")
    }

    pub fn exists(&self, project_id: &str) -> bool {
        self.state_path(project_id).is_file()
    }

    /// Take the exclusive run lock for a project. Fails immediately when
    /// another run holds it.
    pub fn acquire_run_lock(&self, project_id: &str) -> Result<RunLock, CheckpointError> {
        let dir = self.project_dir(project_id);
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::Write {
            path: dir.clone(),
            source: e,
        })?;
        let path = dir.join(".lock");
        let file = File::create(&path).map_err(|e| CheckpointError::Write {
            path: path.clone(),
            source: e,
        })?;
        file.try_lock_exclusive()
            .map_err(|_| CheckpointError::Locked {
                project_id: project_id.to_string(),
            })?;
        debug!(path = %path.display(), "acquired run lock");
        Ok(RunLock { file, path })
    }

    /// Persist `doc`: one new stage snapshot plus the latest pointer,
    /// written atomically. Prunes snapshots beyond the retention bound.
    pub fn save(&self, doc: &ProjectDocument) -> Result<PathBuf, CheckpointError> {
        let project_id = &doc.metadata.project_id;
        let dir = self.checkpoints_dir(project_id);
        fs::create_dir_all(&dir).map_err(|e| CheckpointError::Write {
            path: dir.clone(),
            source: e,
        })?;

        let seq = self
            .list(project_id)?
            .last()
            .map(|c| c.seq + 1)
            .unwrap_or(1);
        let snapshot_path = dir.join(format!("{seq:04}-{}.json", doc.metadata.processing_stage));
        let bytes = serde_json::to_vec_pretty(doc).map_err(|e| CheckpointError::Corrupt {
            path: snapshot_path.clone(),
            source: e,
        })?;
        fs::write(&snapshot_path, &bytes).map_err(|e| CheckpointError::Write {
            path: snapshot_path.clone(),
            source: e,
        })?;

        // latest pointer: temp file then rename, so readers never see a
        // partial write
        let state_path = self.state_path(project_id);
        let tmp_path = state_path.with_extension("json.tmp");
        fs::write(&tmp_path, &bytes).map_err(|e| CheckpointError::Write {
            path: tmp_path.clone(),
            source: e,
        })?;
        fs::rename(&tmp_path, &state_path).map_err(|e| CheckpointError::Write {
            path: state_path.clone(),
            source: e,
        })?;

        self.prune(project_id)?;
        info!(
            project_id = %project_id,
            stage = %doc.metadata.processing_stage,
            revision = doc.metadata.revision,
            path = %snapshot_path.display(),
            "saved checkpoint"
        );
        Ok(snapshot_path)
    }

    /// Load the latest document. Read-only: repeated calls without an
    /// intervening save return identical bytes.
    pub fn load_latest(&self, project_id: &str) -> Result<ProjectDocument, CheckpointError> {
        let path = self.state_path(project_id);
        if !path.is_file() {
            return Err(CheckpointError::NotFound {
                project_id: project_id.to_string(),
            });
        }
        read_document(&path)
    }

    /// Load the most recent snapshot taken at `stage`.
    pub fn load_stage(
        &self,
        project_id: &str,
        stage: Stage,
    ) -> Result<ProjectDocument, CheckpointError> {
        let info = self
            .list(project_id)?
            .into_iter()
            .rev()
            .find(|c| c.stage == stage)
            .ok_or_else(|| CheckpointError::StageNotFound {
                project_id: project_id.to_string(),
                stage,
            })?;
        read_document(&info.path)
    }

    /// All snapshots for a project, oldest first.
    pub fn list(&self, project_id: &str) -> Result<Vec<CheckpointInfo>, CheckpointError> {
        let dir = self.checkpoints_dir(project_id);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&dir).map_err(|e| CheckpointError::Read {
            path: dir.clone(),
            source: e,
        })?;
        let mut checkpoints = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CheckpointError::Read {
                path: dir.clone(),
                source: e,
            })?;
            if let Some(info) = parse_snapshot_name(&entry.path()) {
                checkpoints.push(info);
            }
        }
        checkpoints.sort_by_key(|c| c.seq);
        Ok(checkpoints)
    }

    fn prune(&self, project_id: &str) -> Result<(), CheckpointError> {
        let checkpoints = self.list(project_id)?;
        if checkpoints.len() <= self.retention {
            return Ok(());
        }
        let excess = checkpoints.len() - self.retention;
        for old in &checkpoints[..excess] {
            fs::remove_file(&old.path).map_err(|e| CheckpointError::Write {
                path: old.path.clone(),
                source: e,
            })?;
            debug!(path = %old.path.display(), "pruned old checkpoint");
        }
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<ProjectDocument, CheckpointError> {
    let bytes = fs::read(path).map_err(|e| CheckpointError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source: e,
    })
}

fn parse_snapshot_name(path: &Path) -> Option<CheckpointInfo> {
    let stem = path.file_stem()?.to_str()?;
    if path.extension()?.to_str()? != "json" {
        return None;
    }
    let (seq, stage) = stem.split_once('-')?;
    Some(CheckpointInfo {
        seq: seq.parse().ok()?,
        stage: stage.parse().ok()?,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded() -> ProjectDocument {
        ProjectDocument::from_seed("p1", "The Quantum Heist", "A heist.", "sf")
    }

    #[test]
    fn save_then_load_latest_roundtrips() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let doc = seeded();
        manager.save(&doc).unwrap();
        let loaded = manager.load_latest("p1").unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn load_latest_is_idempotent_between_saves() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        manager.save(&seeded()).unwrap();
        let first = serde_json::to_string(&manager.load_latest("p1").unwrap()).unwrap();
        let second = serde_json::to_string(&manager.load_latest("p1").unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_project_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let err = manager.load_latest("ghost").unwrap_err();
        assert!(matches!(err, CheckpointError::NotFound { .. }));
        assert!(!manager.exists("ghost"));
    }

    #[test]
    fn snapshots_are_sequenced_and_named_by_stage() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let mut doc = seeded();
        manager.save(&doc).unwrap();
        doc.metadata.processing_stage = Stage::Book;
        manager.save(&doc).unwrap();

        let list = manager.list("p1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].seq, 1);
        assert_eq!(list[0].stage, Stage::Series);
        assert_eq!(list[1].seq, 2);
        assert_eq!(list[1].stage, Stage::Book);
        assert!(list[1].path.file_name().unwrap().to_str().unwrap().starts_with("0002-book"));
    }

    #[test]
    fn load_stage_returns_the_matching_snapshot() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let mut doc = seeded();
        manager.save(&doc).unwrap();
        doc.metadata.processing_stage = Stage::Book;
        doc.series.title = "Retitled".to_string();
        manager.save(&doc).unwrap();

        let series_snapshot = manager.load_stage("p1", Stage::Series).unwrap();
        assert_eq!(series_snapshot.series.title, "The Quantum Heist");
        let book_snapshot = manager.load_stage("p1", Stage::Book).unwrap();
        assert_eq!(book_snapshot.series.title, "Retitled");

        let err = manager.load_stage("p1", Stage::Prose).unwrap_err();
        assert!(matches!(err, CheckpointError::StageNotFound { .. }));
    }

    #[test]
    fn retention_prunes_oldest_snapshots() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path()).with_retention(2);
        let doc = seeded();
        for _ in 0..4 {
            manager.save(&doc).unwrap();
        }
        let list = manager.list("p1").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].seq, 3);
        assert_eq!(list[1].seq, 4);
        // latest pointer survives pruning
        assert!(manager.load_latest("p1").is_ok());
    }

    #[test]
    fn run_lock_excludes_second_holder_until_dropped() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        let lock = manager.acquire_run_lock("p1").unwrap();
        let err = manager.acquire_run_lock("p1").unwrap_err();
        assert!(matches!(err, CheckpointError::Locked { .. }));
        drop(lock);
        assert!(manager.acquire_run_lock("p1").is_ok());
    }

    #[test]
    fn corrupt_state_file_reports_corrupt() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path());
        manager.save(&seeded()).unwrap();
        fs::write(dir.path().join("p1").join("state.json"), b"{ not json").unwrap();
        let err = manager.load_latest("p1").unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }));
    }
}
