//! Well-known names inside job directories.

/// Primary graph artifact written by the builder.
pub const ARTIFACT_FILE: &str = "networkx_graph.pkl";

/// Metadata written alongside the primary artifact.
pub const PRIMARY_METADATA_FILE: &str = "networkx_metadata.json";

/// Generic job metadata; both build kinds may write it.
pub const JOB_METADATA_FILE: &str = "job_metadata.json";

/// Name the auxiliary job's metadata takes inside the primary directory.
pub const AUXILIARY_METADATA_FILE: &str = "job_metadata_mork.json";

/// Auxiliary files never copied into the primary directory.
pub const MERGE_EXCLUDED: [&str; 2] = ["schema.json", "neo4j_load_result.json"];

/// Mining output directory.
pub const RESULTS_DIR: &str = "results";

/// Mining plot directory.
pub const PLOTS_DIR: &str = "plots";

/// Subtrees mirrored into the local output tree, in copy order.
pub const MATERIALIZED_SUBTREES: [&str; 2] = [RESULTS_DIR, PLOTS_DIR];
