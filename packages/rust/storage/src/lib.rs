//! Shared-storage access layer.
//!
//! The graph and mining services write one directory per job under a shared
//! volume. Everything the orchestrator does with that volume goes through the
//! narrow [`SharedStorage`] trait, so the filesystem can be swapped for an
//! object store or a fake without touching orchestration logic.
//!
//! **Access rules:**
//! - The remote services create and populate job directories.
//! - This crate only reads, copies out of, and (for merged auxiliary jobs)
//!   removes them.

use std::path::{Path, PathBuf};

use neurograph_shared::{JobId, NeurographError, Result};
use serde::Serialize;
use tracing::debug;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// What kind of filesystem object a job entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

/// One entry directly inside a job directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl JobEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

// ---------------------------------------------------------------------------
// SharedStorage
// ---------------------------------------------------------------------------

/// Narrow interface over the shared job volume.
///
/// `name` arguments are single path components inside a job directory.
pub trait SharedStorage: Send + Sync + std::fmt::Debug {
    /// Location of a job directory as the remote services see it.
    fn job_path(&self, job_id: &JobId) -> PathBuf;

    /// Whether the job directory exists.
    fn job_exists(&self, job_id: &JobId) -> bool;

    /// Whether `name` exists as a regular file in the job directory.
    fn file_exists(&self, job_id: &JobId, name: &str) -> bool;

    /// Read a file from the job directory. `Ok(None)` when it is absent.
    fn read_file(&self, job_id: &JobId, name: &str) -> Result<Option<Vec<u8>>>;

    /// List the direct children of the job directory, sorted by name.
    fn list_job(&self, job_id: &JobId) -> Result<Vec<JobEntry>>;

    /// Copy one regular file between job directories, keeping its timestamps.
    fn copy_file(&self, from: &JobId, from_name: &str, to: &JobId, to_name: &str) -> Result<()>;

    /// Copy the `subtree` directory of a job to `dest` (outside shared storage).
    ///
    /// Returns `false` without touching `dest` when the subtree is absent.
    fn export_subtree(&self, job_id: &JobId, subtree: &str, dest: &Path) -> Result<bool>;

    /// Delete a job directory and everything below it.
    fn remove_job(&self, job_id: &JobId) -> Result<()>;
}

// ---------------------------------------------------------------------------
// FsStorage
// ---------------------------------------------------------------------------

/// [`SharedStorage`] backed by a local or mounted directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Use `root` as the shared volume. The directory is not created here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, job_id: &JobId, name: &str) -> Result<PathBuf> {
        ensure_component(name)?;
        Ok(self.job_path(job_id).join(name))
    }
}

impl SharedStorage for FsStorage {
    fn job_path(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    fn job_exists(&self, job_id: &JobId) -> bool {
        self.job_path(job_id).is_dir()
    }

    fn file_exists(&self, job_id: &JobId, name: &str) -> bool {
        self.entry_path(job_id, name)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    fn read_file(&self, job_id: &JobId, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(job_id, name)?;
        match std::fs::read(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(NeurographError::io(&path, e)),
        }
    }

    fn list_job(&self, job_id: &JobId) -> Result<Vec<JobEntry>> {
        let dir = self.job_path(job_id);
        let read_dir = std::fs::read_dir(&dir).map_err(|e| NeurographError::io(&dir, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| NeurographError::io(&dir, e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| NeurographError::io(entry.path(), e))?;
            let kind = if file_type.is_file() {
                EntryKind::File
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::Other
            };
            entries.push(JobEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn copy_file(&self, from: &JobId, from_name: &str, to: &JobId, to_name: &str) -> Result<()> {
        let src = self.entry_path(from, from_name)?;
        let dst = self.entry_path(to, to_name)?;
        copy_preserving_times(&src, &dst)
    }

    fn export_subtree(&self, job_id: &JobId, subtree: &str, dest: &Path) -> Result<bool> {
        let src = self.entry_path(job_id, subtree)?;
        if !src.is_dir() {
            return Ok(false);
        }
        copy_dir_all(&src, dest)?;
        Ok(true)
    }

    fn remove_job(&self, job_id: &JobId) -> Result<()> {
        let dir = self.job_path(job_id);
        std::fs::remove_dir_all(&dir).map_err(|e| NeurographError::io(&dir, e))?;
        debug!(path = %dir.display(), "removed job directory");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reject names that are not a single normal path component.
fn ensure_component(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(NeurographError::validation(format!(
            "'{name}' is not a plain file name"
        ))),
    }
}

/// Copy a file, then carry over its access/modification times where the
/// platform allows it.
pub fn copy_preserving_times(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst).map_err(|e| {
        NeurographError::io(
            dst,
            std::io::Error::new(e.kind(), format!("copy from {}: {e}", src.display())),
        )
    })?;

    let meta = std::fs::metadata(src).map_err(|e| NeurographError::io(src, e))?;
    let mut times = std::fs::FileTimes::new();
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }

    let applied = std::fs::File::options()
        .write(true)
        .open(dst)
        .and_then(|f| f.set_times(times));
    if let Err(e) = applied {
        debug!(path = %dst.display(), error = %e, "could not preserve file times");
    }

    Ok(())
}

/// Recursively copy `src` into `dst`, creating `dst` as needed.
/// Entries that are neither files nor directories are skipped.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst).map_err(|e| NeurographError::io(dst, e))?;

    for entry in std::fs::read_dir(src).map_err(|e| NeurographError::io(src, e))? {
        let entry = entry.map_err(|e| NeurographError::io(src, e))?;
        let path = entry.path();
        let target = dst.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| NeurographError::io(&path, e))?;

        if file_type.is_dir() {
            copy_dir_all(&path, &target)?;
        } else if file_type.is_file() {
            copy_preserving_times(&path, &target)?;
        } else {
            debug!(path = %path.display(), "skipping non-regular entry");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "ng-storage-test-{}",
            uuid::Uuid::now_v7()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn job(raw: &str) -> JobId {
        JobId::parse(raw).unwrap()
    }

    #[test]
    fn read_file_absent_is_none() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);
        std::fs::create_dir_all(tmp.join("a")).unwrap();
        std::fs::write(tmp.join("a/meta.json"), "{}").unwrap();

        assert_eq!(
            storage.read_file(&job("a"), "meta.json").unwrap().as_deref(),
            Some(b"{}".as_slice())
        );
        assert!(storage.read_file(&job("a"), "missing.json").unwrap().is_none());
        assert!(storage.read_file(&job("nope"), "meta.json").unwrap().is_none());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn list_job_reports_kinds_sorted() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);
        std::fs::create_dir_all(tmp.join("a/sub")).unwrap();
        std::fs::write(tmp.join("a/z.txt"), "z").unwrap();
        std::fs::write(tmp.join("a/b.txt"), "b").unwrap();

        let entries = storage.list_job(&job("a")).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b.txt", "sub", "z.txt"]);
        assert_eq!(entries[1].kind, EntryKind::Directory);
        assert!(entries[0].is_file());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn copy_file_keeps_modification_time() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);
        std::fs::create_dir_all(tmp.join("src")).unwrap();
        std::fs::create_dir_all(tmp.join("dst")).unwrap();
        let src = tmp.join("src/data.bin");
        std::fs::write(&src, b"payload").unwrap();

        let old = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        std::fs::File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(old)
            .unwrap();

        storage
            .copy_file(&job("src"), "data.bin", &job("dst"), "renamed.bin")
            .unwrap();

        let copied = tmp.join("dst/renamed.bin");
        assert_eq!(std::fs::read(&copied).unwrap(), b"payload");
        assert_eq!(std::fs::metadata(&copied).unwrap().modified().unwrap(), old);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn copy_failure_names_destination() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);
        std::fs::create_dir_all(tmp.join("src")).unwrap();
        std::fs::create_dir_all(tmp.join("dst/taken")).unwrap();
        std::fs::write(tmp.join("src/data.bin"), b"payload").unwrap();

        let err = storage
            .copy_file(&job("src"), "data.bin", &job("dst"), "taken")
            .unwrap_err();

        match &err {
            NeurographError::Io { path, .. } => assert_eq!(path, &tmp.join("dst/taken")),
            other => panic!("expected Io, got {other:?}"),
        }
        assert!(err.to_string().contains("data.bin"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn names_must_be_single_components() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);

        let err = storage.read_file(&job("a"), "../secret").unwrap_err();
        assert!(matches!(err, NeurographError::Validation { .. }));
        assert!(!storage.file_exists(&job("a"), "x/y"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn export_subtree_copies_recursively() {
        let tmp = temp_dir();
        let storage = FsStorage::new(tmp.join("shared"));
        std::fs::create_dir_all(tmp.join("shared/a/results/nested")).unwrap();
        std::fs::write(tmp.join("shared/a/results/top.json"), "1").unwrap();
        std::fs::write(tmp.join("shared/a/results/nested/deep.json"), "2").unwrap();

        let dest = tmp.join("local/a/results");
        assert!(storage.export_subtree(&job("a"), "results", &dest).unwrap());
        assert_eq!(std::fs::read_to_string(dest.join("top.json")).unwrap(), "1");
        assert_eq!(std::fs::read_to_string(dest.join("nested/deep.json")).unwrap(), "2");

        let plots = tmp.join("local/a/plots");
        assert!(!storage.export_subtree(&job("a"), "plots", &plots).unwrap());
        assert!(!plots.exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn remove_job_deletes_tree() {
        let tmp = temp_dir();
        let storage = FsStorage::new(&tmp);
        std::fs::create_dir_all(tmp.join("gone/inner")).unwrap();
        std::fs::write(tmp.join("gone/inner/f"), "x").unwrap();

        storage.remove_job(&job("gone")).unwrap();
        assert!(!storage.job_exists(&job("gone")));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
