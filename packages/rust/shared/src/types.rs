//! Core domain types for NeuroGraph jobs.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NeurographError, Result};

/// Key added to a resolved mining configuration.
pub const VISUALIZE_INSTANCES_KEY: &str = "visualize_instances";

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Identifier of a job directory in shared storage, assigned by the graph service.
///
/// Only ASCII alphanumerics, `-`, `_` and `.` are accepted, so a job id is
/// always a single path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NeurographError::validation("job id must not be empty"));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(NeurographError::validation(format!(
                "invalid job id: {trimmed:?}"
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(NeurographError::validation(format!(
                "invalid character {bad:?} in job id {trimmed:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = NeurographError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// BuildId
// ---------------------------------------------------------------------------

/// Logical identity shared by the primary and auxiliary remote builds.
///
/// Never sent to the remote service; it ties the two calls together in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub Uuid);

impl BuildId {
    /// Generate a new time-sortable build identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// Output kind requested from the graph service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterType {
    /// Primary representation (pickled NetworkX graph).
    Networkx,
    /// Auxiliary representation (MORK / MeTTa output).
    Mork,
}

impl WriterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Networkx => "networkx",
            Self::Mork => "mork",
        }
    }
}

impl std::fmt::Display for WriterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WriterType {
    type Err = NeurographError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "networkx" => Ok(Self::Networkx),
            "mork" => Ok(Self::Mork),
            other => Err(NeurographError::validation(format!(
                "unknown writer_type '{other}': expected 'networkx' or 'mork'"
            ))),
        }
    }
}

/// Orientation of the constructed graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphType {
    #[default]
    Directed,
    Undirected,
}

impl GraphType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Directed => "directed",
            Self::Undirected => "undirected",
        }
    }
}

impl std::fmt::Display for GraphType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GraphType {
    type Err = NeurographError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "directed" => Ok(Self::Directed),
            "undirected" => Ok(Self::Undirected),
            other => Err(NeurographError::validation(format!(
                "unknown graph_type '{other}': expected 'directed' or 'undirected'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildRequest
// ---------------------------------------------------------------------------

/// One tabular input file, held in memory for the lifetime of a build.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub file_name: String,
    pub contents: Vec<u8>,
}

impl InputFile {
    pub fn new(file_name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }

    /// Read a file from disk. The handle is closed before this returns.
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read(path).map_err(|e| NeurographError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                NeurographError::validation(format!("{} has no file name", path.display()))
            })?;
        Ok(Self {
            file_name,
            contents,
        })
    }
}

/// Everything a graph build needs except the output-kind selector.
///
/// Shared verbatim between the primary and auxiliary calls.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Tabular inputs (at least one).
    pub files: Vec<InputFile>,
    /// Serialized builder configuration document.
    pub config: String,
    /// Serialized schema document.
    pub schema_json: String,
    /// Requested graph orientation.
    pub graph_type: GraphType,
    /// Tenant the build runs for.
    pub tenant_id: String,
}

impl BuildRequest {
    /// Reject requests the remote service could never accept.
    pub fn validate(&self) -> Result<()> {
        if self.files.is_empty() {
            return Err(NeurographError::validation(
                "at least one input file is required",
            ));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(NeurographError::validation("tenant_id must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MiningConfig
// ---------------------------------------------------------------------------

/// Parameters forwarded to the pattern-mining service.
///
/// Unknown keys are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningConfig {
    #[serde(default = "default_min_pattern_size")]
    pub min_pattern_size: u32,
    #[serde(default = "default_max_pattern_size")]
    pub max_pattern_size: u32,
    #[serde(default = "default_min_neighborhood_size")]
    pub min_neighborhood_size: u32,
    #[serde(default = "default_max_neighborhood_size")]
    pub max_neighborhood_size: u32,
    #[serde(default = "default_n_neighborhoods")]
    pub n_neighborhoods: u32,
    #[serde(default = "default_n_trials")]
    pub n_trials: u32,
    #[serde(default = "default_search_strategy")]
    pub search_strategy: String,
    #[serde(default = "default_sample_method")]
    pub sample_method: String,
    /// Orientation; resolved from job metadata when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_type: Option<GraphType>,
    /// `"representative"` or `"instance"`.
    #[serde(default = "default_graph_output_format")]
    pub graph_output_format: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            min_pattern_size: default_min_pattern_size(),
            max_pattern_size: default_max_pattern_size(),
            min_neighborhood_size: default_min_neighborhood_size(),
            max_neighborhood_size: default_max_neighborhood_size(),
            n_neighborhoods: default_n_neighborhoods(),
            n_trials: default_n_trials(),
            search_strategy: default_search_strategy(),
            sample_method: default_sample_method(),
            graph_type: None,
            graph_output_format: default_graph_output_format(),
            extra: serde_json::Map::new(),
        }
    }
}

fn default_min_pattern_size() -> u32 {
    3
}
fn default_max_pattern_size() -> u32 {
    5
}
fn default_min_neighborhood_size() -> u32 {
    3
}
fn default_max_neighborhood_size() -> u32 {
    5
}
fn default_n_neighborhoods() -> u32 {
    500
}
fn default_n_trials() -> u32 {
    100
}
fn default_search_strategy() -> String {
    "greedy".into()
}
fn default_sample_method() -> String {
    "tree".into()
}
fn default_graph_output_format() -> String {
    "representative".into()
}

impl MiningConfig {
    /// Whether every matched instance should be plotted, not just representatives.
    pub fn visualize_instances(&self) -> bool {
        self.graph_output_format == "instance"
    }

    /// Flatten into the map sent to the miner, adding the derived flag.
    pub fn resolve(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        map.insert(
            VISUALIZE_INSTANCES_KEY.to_string(),
            serde_json::Value::Bool(self.visualize_instances()),
        );
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_accepts_service_identifiers() {
        let id = JobId::parse("3f2a9c1e-7b4d-4e8a-9c0f-1a2b3c4d5e6f").unwrap();
        assert_eq!(id.as_str(), "3f2a9c1e-7b4d-4e8a-9c0f-1a2b3c4d5e6f");
        assert_eq!(JobId::parse("  job_42 ").unwrap().to_string(), "job_42");
    }

    #[test]
    fn job_id_rejects_path_components() {
        for raw in ["", "..", ".", "a/b", "../etc", "a\\b", "/abs"] {
            let err = JobId::parse(raw).unwrap_err();
            assert!(
                matches!(err, NeurographError::Validation { .. }),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn job_id_deserialize_validates() {
        let ok: JobId = serde_json::from_str("\"abc-1\"").unwrap();
        assert_eq!(ok.as_str(), "abc-1");
        assert!(serde_json::from_str::<JobId>("\"../x\"").is_err());
    }

    #[test]
    fn selectors_use_wire_names() {
        assert_eq!(serde_json::to_string(&WriterType::Mork).unwrap(), "\"mork\"");
        assert_eq!("NetworkX".parse::<WriterType>().unwrap(), WriterType::Networkx);
        assert_eq!("undirected".parse::<GraphType>().unwrap(), GraphType::Undirected);
        assert!("sideways".parse::<GraphType>().is_err());
        assert_eq!(GraphType::default(), GraphType::Directed);
    }

    #[test]
    fn build_request_requires_files() {
        let request = BuildRequest {
            files: vec![],
            config: "{}".into(),
            schema_json: "{}".into(),
            graph_type: GraphType::Directed,
            tenant_id: "default".into(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn mining_config_defaults_fill_missing_keys() {
        let config: MiningConfig =
            serde_json::from_str(r#"{"n_trials": 10, "graph_output_format": "instance"}"#)
                .unwrap();
        assert_eq!(config.n_trials, 10);
        assert_eq!(config.max_pattern_size, 5);
        assert!(config.graph_type.is_none());
        assert!(config.visualize_instances());
    }

    #[test]
    fn mining_config_resolve_adds_flag_and_keeps_extras() {
        let config: MiningConfig =
            serde_json::from_str(r#"{"graph_type": "undirected", "radius": 2}"#).unwrap();
        let resolved = config.resolve();

        assert_eq!(resolved[VISUALIZE_INSTANCES_KEY], false);
        assert_eq!(resolved["graph_type"], "undirected");
        assert_eq!(resolved["radius"], 2);
        assert_eq!(resolved["search_strategy"], "greedy");
    }
}
