//! Folding the auxiliary job's output into the primary job directory.
//!
//! The merge runs as a background unit: it waits on the auxiliary handle,
//! copies qualifying files on the blocking pool, then retires the auxiliary
//! directory. Nothing here is ever awaited by a caller-facing operation in
//! background mode.

use std::sync::Arc;

use neurograph_shared::{JobId, NeurographError, Result};
use neurograph_storage::SharedStorage;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::auxiliary::AuxiliaryBuild;
use crate::layout::{AUXILIARY_METADATA_FILE, JOB_METADATA_FILE, MERGE_EXCLUDED};

/// Why a merge left the primary directory untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "job_id", rename_all = "snake_case")]
pub enum SkipReason {
    /// The auxiliary build failed or produced no job id.
    NoAuxiliaryResult,
    /// The auxiliary job directory does not exist (e.g. already merged).
    AuxiliaryMissing(JobId),
    /// The primary job directory does not exist.
    PrimaryMissing(JobId),
    /// The service handed back the primary id for the auxiliary build.
    SameJob(JobId),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuxiliaryResult => write!(f, "no auxiliary result"),
            Self::AuxiliaryMissing(id) => write!(f, "auxiliary directory {id} not found"),
            Self::PrimaryMissing(id) => write!(f, "primary directory {id} not found"),
            Self::SameJob(id) => write!(f, "auxiliary job {id} is the primary job"),
        }
    }
}

/// What a completed merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Files copied under their original name.
    pub copied: Vec<String>,
    /// `(source, target)` pairs copied under a new name.
    pub renamed: Vec<(String, String)>,
    /// Files left out by the exclusion list.
    pub excluded: Vec<String>,
    /// Subdirectories and other non-regular entries left out.
    pub skipped: Vec<String>,
}

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Skipped { skip: SkipReason },
    Merged { auxiliary_job_id: JobId, report: MergeReport },
}

/// Wait for the auxiliary build, then merge its directory into `primary`.
#[instrument(skip_all, fields(primary_job_id = %primary, build_id = %auxiliary.build_id()))]
pub async fn merge(
    storage: Arc<dyn SharedStorage>,
    primary: JobId,
    auxiliary: AuxiliaryBuild,
) -> Result<MergeOutcome> {
    let auxiliary_job = auxiliary.join().await;

    tokio::task::spawn_blocking(move || {
        merge_prepared(storage.as_ref(), &primary, auxiliary_job.as_ref())
    })
    .await
    .map_err(|e| NeurographError::Task(format!("merge task: {e}")))?
}

/// Merge an already-joined auxiliary result. Synchronous filesystem work.
///
/// Copies stop at the first failure; files copied so far stay and the
/// auxiliary directory is only removed after every copy succeeded.
pub fn merge_prepared(
    storage: &dyn SharedStorage,
    primary: &JobId,
    auxiliary: Option<&JobId>,
) -> Result<MergeOutcome> {
    let Some(auxiliary) = auxiliary else {
        return Ok(skip(SkipReason::NoAuxiliaryResult));
    };
    if auxiliary == primary {
        return Ok(skip(SkipReason::SameJob(auxiliary.clone())));
    }
    if !storage.job_exists(auxiliary) {
        return Ok(skip(SkipReason::AuxiliaryMissing(auxiliary.clone())));
    }
    if !storage.job_exists(primary) {
        return Ok(skip(SkipReason::PrimaryMissing(primary.clone())));
    }

    let mut report = MergeReport::default();

    for entry in storage.list_job(auxiliary)? {
        let name = entry.name.as_str();

        if MERGE_EXCLUDED.contains(&name) {
            debug!(file = name, "excluded from merge");
            report.excluded.push(entry.name);
            continue;
        }
        if !entry.is_file() {
            debug!(entry = name, "not a regular file, skipping");
            report.skipped.push(entry.name);
            continue;
        }

        if name == JOB_METADATA_FILE {
            storage.copy_file(auxiliary, name, primary, AUXILIARY_METADATA_FILE)?;
            report
                .renamed
                .push((entry.name, AUXILIARY_METADATA_FILE.to_string()));
        } else {
            storage.copy_file(auxiliary, name, primary, name)?;
            report.copied.push(entry.name);
        }
    }

    storage.remove_job(auxiliary)?;

    info!(
        auxiliary_job_id = %auxiliary,
        copied = report.copied.len(),
        renamed = report.renamed.len(),
        excluded = report.excluded.len(),
        "auxiliary output merged"
    );

    Ok(MergeOutcome::Merged {
        auxiliary_job_id: auxiliary.clone(),
        report,
    })
}

fn skip(reason: SkipReason) -> MergeOutcome {
    warn!(reason = %reason, "merge skipped");
    MergeOutcome::Skipped { skip: reason }
}
