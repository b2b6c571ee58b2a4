//! Graph orientation recovery from job metadata.

use neurograph_shared::{GraphType, JobId, NeurographError, Result};
use neurograph_storage::SharedStorage;
use tracing::{debug, instrument};

use crate::layout::{JOB_METADATA_FILE, PRIMARY_METADATA_FILE};

/// Read the orientation recorded when the job was built.
///
/// Looks at the primary metadata file first and falls back to the generic
/// job metadata. A document without a `graph_type` field means directed.
#[instrument(skip_all, fields(job_id = %job_id))]
pub fn resolve_graph_type(storage: &dyn SharedStorage, job_id: &JobId) -> Result<GraphType> {
    let mut document = None;
    for name in [PRIMARY_METADATA_FILE, JOB_METADATA_FILE] {
        if let Some(raw) = storage.read_file(job_id, name)? {
            debug!(file = name, "using metadata");
            document = Some((name, raw));
            break;
        }
    }

    let Some((name, raw)) = document else {
        let dir = storage.job_path(job_id);
        return Err(NeurographError::not_found(format!(
            "job metadata not found for {job_id}: tried {} and {}",
            dir.join(PRIMARY_METADATA_FILE).display(),
            dir.join(JOB_METADATA_FILE).display(),
        )));
    };

    let value: serde_json::Value = serde_json::from_slice(&raw)
        .map_err(|e| NeurographError::validation(format!("malformed {name} for {job_id}: {e}")))?;

    let object = value.as_object().ok_or_else(|| {
        NeurographError::validation(format!("{name} for {job_id} is not a JSON object"))
    })?;

    match object.get("graph_type") {
        None | Some(serde_json::Value::Null) => Ok(GraphType::Directed),
        Some(serde_json::Value::String(s)) => s.parse(),
        Some(other) => Err(NeurographError::validation(format!(
            "graph_type in {name} must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use neurograph_storage::FsStorage;

    fn setup(files: &[(&str, &str)]) -> (PathBuf, FsStorage, JobId) {
        let tmp = std::env::temp_dir().join(format!("ng-meta-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(tmp.join("job-1")).unwrap();
        for (name, contents) in files {
            std::fs::write(tmp.join("job-1").join(name), contents).unwrap();
        }
        let storage = FsStorage::new(&tmp);
        (tmp, storage, JobId::parse("job-1").unwrap())
    }

    #[test]
    fn primary_file_wins() {
        let (tmp, storage, job) = setup(&[
            (PRIMARY_METADATA_FILE, r#"{"graph_type": "undirected"}"#),
            (JOB_METADATA_FILE, r#"{"graph_type": "directed"}"#),
        ]);

        assert_eq!(resolve_graph_type(&storage, &job).unwrap(), GraphType::Undirected);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn falls_back_to_job_metadata() {
        let (tmp, storage, job) = setup(&[(JOB_METADATA_FILE, r#"{"graph_type": "undirected"}"#)]);

        assert_eq!(resolve_graph_type(&storage, &job).unwrap(), GraphType::Undirected);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_field_defaults_to_directed() {
        let (tmp, storage, job) = setup(&[(PRIMARY_METADATA_FILE, r#"{"nodes": 12}"#)]);

        assert_eq!(resolve_graph_type(&storage, &job).unwrap(), GraphType::Directed);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn not_found_names_both_locations() {
        let (tmp, storage, job) = setup(&[]);

        let err = resolve_graph_type(&storage, &job).unwrap_err();
        assert!(matches!(err, NeurographError::NotFound { .. }));
        let message = err.to_string();
        assert!(message.contains(PRIMARY_METADATA_FILE));
        assert!(message.contains(JOB_METADATA_FILE));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn bad_documents_are_validation_errors() {
        for contents in [
            "{not json",
            "[1, 2, 3]",
            r#"{"graph_type": "sideways"}"#,
            r#"{"graph_type": 1}"#,
        ] {
            let (tmp, storage, job) = setup(&[(PRIMARY_METADATA_FILE, contents)]);

            let err = resolve_graph_type(&storage, &job).unwrap_err();
            assert!(
                matches!(err, NeurographError::Validation { .. }),
                "{contents}: {err:?}"
            );

            let _ = std::fs::remove_dir_all(&tmp);
        }

        let (tmp, storage, job) = setup(&[]);
        std::fs::write(tmp.join("job-1").join(PRIMARY_METADATA_FILE), [0xff, 0xfe, b'{']).unwrap();

        let err = resolve_graph_type(&storage, &job).unwrap_err();
        assert!(matches!(err, NeurographError::Validation { .. }), "{err:?}");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
