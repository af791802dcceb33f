//! Checkpoint/rollback record (C11, §3): tracks what an install created so
//! a later run can resume, and a failed one can unwind.

use anyhow::Context;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub const CHECKPOINT_FILE_NAME: &str = ".pantry-checkpoint.json";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub installed_packages: BTreeSet<String>,
    pub created_files: Vec<PathBuf>,
    pub created_dirs: Vec<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    /// Unix seconds when this install attempt started, set on first save so
    /// a resumed run can still report total elapsed time in its progress bar.
    pub started_at: Option<u64>,
}

impl Checkpoint {
    pub fn load(env_root: &Path) -> anyhow::Result<Self> {
        let path = env_root.join(CHECKPOINT_FILE_NAME);
        if !path.is_file() {
            return Ok(Checkpoint::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid checkpoint at {}", path.display()))
    }

    pub fn save(&self, env_root: &Path) -> anyhow::Result<()> {
        let path = env_root.join(CHECKPOINT_FILE_NAME);
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize checkpoint")?;
        let mut temp_file =
            NamedTempFile::new_in(env_root).context("Failed to create checkpoint temp file")?;
        use std::io::Write;
        temp_file.write_all(contents.as_bytes())?;
        temp_file
            .persist(&path)
            .context("Failed to atomically replace checkpoint")?;
        Ok(())
    }

    /// Deleted on clean completion (§3's lifecycle note).
    pub fn delete(env_root: &Path) -> anyhow::Result<()> {
        let path = env_root.join(CHECKPOINT_FILE_NAME);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn is_installed(&self, key: &str) -> bool {
        self.installed_packages.contains(key)
    }

    pub fn mark_installed(&mut self, key: &str, files: &[PathBuf], dirs: &[PathBuf]) {
        self.installed_packages.insert(key.to_string());
        self.created_files.extend(files.iter().cloned());
        self.created_dirs.extend(dirs.iter().cloned());
    }

    /// Stamps `started_at` the first time an install attempt touches this
    /// checkpoint; a no-op on every later call, including across resumes.
    pub fn start_if_unset(&mut self) {
        if self.started_at.is_none() {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
            self.started_at = Some(now);
        }
    }

    pub fn elapsed_secs(&self) -> Option<u64> {
        let started = self.started_at?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        Some(now.saturating_sub(started))
    }
}

/// Append-only ledger of filesystem operations performed during one install
/// attempt. `commit` discards it; `rollback` reverses it in LIFO order,
/// tolerating partial failure (§4.11).
#[derive(Debug, Default)]
pub struct RollbackLog {
    operations: Vec<Operation>,
}

#[derive(Debug)]
enum Operation {
    CreatedFile(PathBuf),
    CreatedDir(PathBuf),
    CreatedSymlink(PathBuf),
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RollbackReport {
    pub removed: usize,
    pub failed: usize,
}

impl RollbackLog {
    pub fn record_file(&mut self, path: PathBuf) {
        self.operations.push(Operation::CreatedFile(path));
    }

    pub fn record_dir(&mut self, path: PathBuf) {
        self.operations.push(Operation::CreatedDir(path));
    }

    pub fn record_symlink(&mut self, path: PathBuf) {
        self.operations.push(Operation::CreatedSymlink(path));
    }

    pub fn commit(mut self) {
        self.operations.clear();
    }

    pub fn rollback(self) -> RollbackReport {
        let mut report = RollbackReport::default();
        for operation in self.operations.into_iter().rev() {
            let result = match &operation {
                Operation::CreatedFile(path) | Operation::CreatedSymlink(path) => {
                    fs::remove_file(path).map(|_| ()).or_else(|err| {
                        if err.kind() == std::io::ErrorKind::NotFound {
                            Ok(())
                        } else {
                            Err(err)
                        }
                    })
                }
                Operation::CreatedDir(path) => fs::remove_dir_all(path).map(|_| ()).or_else(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        Ok(())
                    } else {
                        Err(err)
                    }
                }),
            };
            match result {
                Ok(()) => {
                    debug!("Rolled back {:?}", operation);
                    report.removed += 1;
                }
                Err(err) => {
                    warn!("Failed to roll back {:?}: {}", operation, err);
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trips_checkpoint_through_disk() {
        let tmp = TempDir::new().unwrap();
        let mut checkpoint = Checkpoint::default();
        checkpoint.mark_installed("nodejs.org@22.4.1", &[tmp.path().join("a")], &[]);
        checkpoint.save(tmp.path()).unwrap();

        let reloaded = Checkpoint::load(tmp.path()).unwrap();
        assert!(reloaded.is_installed("nodejs.org@22.4.1"));
    }

    #[test]
    fn delete_removes_checkpoint_on_clean_completion() {
        let tmp = TempDir::new().unwrap();
        let checkpoint = Checkpoint::default();
        checkpoint.save(tmp.path()).unwrap();
        Checkpoint::delete(tmp.path()).unwrap();
        assert!(!tmp.path().join(CHECKPOINT_FILE_NAME).is_file());
    }

    #[test]
    fn start_if_unset_is_idempotent_across_resumes() {
        let mut checkpoint = Checkpoint::default();
        checkpoint.start_if_unset();
        let first = checkpoint.started_at;
        checkpoint.start_if_unset();
        assert_eq!(checkpoint.started_at, first);
        assert!(checkpoint.elapsed_secs().is_some());
    }

    #[test]
    fn rollback_removes_files_in_lifo_order_and_tolerates_missing() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("pkgdir");
        fs::create_dir_all(&dir).unwrap();
        let file = tmp.path().join("file.txt");
        fs::write(&file, b"x").unwrap();

        let mut log = RollbackLog::default();
        log.record_dir(dir.clone());
        log.record_file(file.clone());
        // A file that was never actually created; rollback should tolerate it.
        log.record_file(tmp.path().join("missing.txt"));

        let report = log.rollback();
        assert!(!file.exists());
        assert!(!dir.exists());
        assert_eq!(report.failed, 0);
    }
}
