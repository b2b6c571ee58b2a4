//! Local result tree: mirroring, contained file lookup and zip export.
//!
//! The local tree under `local_root` is derived data. Each mining run
//! replaces the job's `results/` and `plots/` copies wholesale.

use std::fs::File;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use neurograph_shared::{JobId, NeurographError, Result};
use neurograph_storage::SharedStorage;
use serde::Serialize;
use tracing::{debug, info, instrument};
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::layout::{MATERIALIZED_SUBTREES, PLOTS_DIR, RESULTS_DIR};

/// Where a job's mirrored outputs live locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalOutputPaths {
    pub job_dir: PathBuf,
    pub results: PathBuf,
    pub plots: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ResultMaterializer {
    storage: Arc<dyn SharedStorage>,
    local_root: PathBuf,
}

impl ResultMaterializer {
    pub fn new(storage: Arc<dyn SharedStorage>, local_root: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            local_root: local_root.into(),
        }
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.local_root.join(job_id.as_str())
    }

    /// Replace the local `results/` and `plots/` copies with the shared ones.
    ///
    /// A subtree missing from shared storage is not an error; its local copy
    /// is still removed.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub fn materialize(&self, job_id: &JobId) -> Result<LocalOutputPaths> {
        let job_dir = self.job_dir(job_id);
        std::fs::create_dir_all(&job_dir).map_err(|e| NeurographError::io(&job_dir, e))?;

        for subtree in MATERIALIZED_SUBTREES {
            let local = job_dir.join(subtree);
            if local.exists() {
                std::fs::remove_dir_all(&local).map_err(|e| NeurographError::io(&local, e))?;
            }
            let copied = self.storage.export_subtree(job_id, subtree, &local)?;
            debug!(subtree, copied, "subtree mirrored");
        }

        info!(path = %job_dir.display(), "results materialized");
        Ok(LocalOutputPaths {
            results: job_dir.join(RESULTS_DIR),
            plots: job_dir.join(PLOTS_DIR),
            job_dir,
        })
    }

    /// Map a requested file name to a regular file inside the job directory.
    ///
    /// Names that lexically leave the directory are refused before the
    /// filesystem is consulted; symlinks that resolve outside it are refused
    /// after.
    pub fn resolve_file_path(&self, job_id: &JobId, filename: &str) -> Result<PathBuf> {
        let job_dir = self.job_dir(job_id);
        let job_dir = std::path::absolute(&job_dir).map_err(|e| NeurographError::io(&job_dir, e))?;

        let mut resolved = job_dir.clone();
        let mut depth = 0usize;
        for component in Path::new(filename).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(NeurographError::permission_denied(format!(
                        "'{filename}' is outside the output directory of job {job_id}"
                    )));
                }
            }
        }

        if !resolved.is_file() {
            return Err(NeurographError::not_found(format!(
                "file '{filename}' not found for job {job_id}"
            )));
        }

        let canonical_dir =
            std::fs::canonicalize(&job_dir).map_err(|e| NeurographError::io(&job_dir, e))?;
        let canonical =
            std::fs::canonicalize(&resolved).map_err(|e| NeurographError::io(&resolved, e))?;
        if !canonical.starts_with(&canonical_dir) {
            return Err(NeurographError::permission_denied(format!(
                "'{filename}' resolves outside the output directory of job {job_id}"
            )));
        }

        Ok(resolved)
    }

    /// Zip the job's local directory into `{local_root}/{job_id}.zip`.
    ///
    /// The archive is written next to its target and renamed into place, so
    /// a reader never sees a partial file.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub fn archive(&self, job_id: &JobId) -> Result<PathBuf> {
        let job_dir = self.job_dir(job_id);
        if !job_dir.is_dir() {
            return Err(NeurographError::not_found(format!(
                "no local results for job {job_id}"
            )));
        }

        let target = self.local_root.join(format!("{job_id}.zip"));
        let temp = self.local_root.join(format!(".{job_id}.zip.tmp"));

        if let Err(e) = write_archive(&job_dir, &temp) {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
        std::fs::rename(&temp, &target).map_err(|e| NeurographError::io(&target, e))?;

        info!(path = %target.display(), "archive written");
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// Zip helpers
// ---------------------------------------------------------------------------

fn write_archive(job_dir: &Path, dest: &Path) -> Result<()> {
    let file = File::create(dest).map_err(|e| NeurographError::io(dest, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_directory(&mut writer, job_dir, "", options)?;

    let mut file = writer.finish().map_err(archive_error)?;
    file.flush().map_err(|e| NeurographError::io(dest, e))?;
    Ok(())
}

/// Add the contents of `dir` under `prefix`, in name order.
///
/// Symlinks are never followed, so nothing outside the job directory ends
/// up in the archive.
fn add_directory(
    writer: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .map_err(|e| NeurographError::io(dir, e))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| NeurographError::io(dir, e))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
        let file_type = entry
            .file_type()
            .map_err(|e| NeurographError::io(&path, e))?;

        if file_type.is_dir() {
            let dir_name = format!("{name}/");
            writer
                .add_directory(dir_name.as_str(), options)
                .map_err(archive_error)?;
            add_directory(writer, &path, &dir_name, options)?;
        } else if file_type.is_file() {
            writer.start_file(name.as_str(), options).map_err(archive_error)?;
            let mut source = File::open(&path).map_err(|e| NeurographError::io(&path, e))?;
            std::io::copy(&mut source, writer).map_err(|e| NeurographError::io(&path, e))?;
        } else {
            debug!(path = %path.display(), "not archiving non-regular entry");
        }
    }

    Ok(())
}

fn archive_error(e: zip::result::ZipError) -> NeurographError {
    NeurographError::Archive(e.to_string())
}
