//! Pattern-mining dispatch and result materialization.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use neurograph_miner::MinerClient;
use neurograph_shared::{JobId, MiningConfig, NeurographError, Result};
use neurograph_storage::SharedStorage;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::layout::ARTIFACT_FILE;
use crate::materialize::{LocalOutputPaths, ResultMaterializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Structured result of one mining run.
///
/// Failures of the miner or of materialization are reported here with
/// `status = error` instead of being raised.
#[derive(Debug, Clone, Serialize)]
pub struct MiningOutcome {
    pub job_id: JobId,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plots_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub miner_response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl MiningOutcome {
    fn success(
        job_id: &JobId,
        paths: &LocalOutputPaths,
        download_url: String,
        miner_response: serde_json::Value,
    ) -> Self {
        Self {
            job_id: job_id.clone(),
            status: OutcomeStatus::Success,
            results_path: Some(paths.results.display().to_string()),
            plots_path: Some(paths.plots.display().to_string()),
            download_url: Some(download_url),
            miner_response: Some(miner_response),
            error: None,
            completed_at: Utc::now(),
        }
    }

    fn failure(job_id: &JobId, error: &NeurographError) -> Self {
        Self {
            job_id: job_id.clone(),
            status: OutcomeStatus::Error,
            results_path: None,
            plots_path: None,
            download_url: None,
            miner_response: None,
            error: Some(error.to_string()),
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Runs the miner against a job's primary artifact.
#[derive(Debug, Clone)]
pub struct MiningDispatcher {
    miner: MinerClient,
    storage: Arc<dyn SharedStorage>,
    materializer: Arc<ResultMaterializer>,
    public_base_url: String,
}

impl MiningDispatcher {
    pub fn new(
        miner: MinerClient,
        storage: Arc<dyn SharedStorage>,
        materializer: Arc<ResultMaterializer>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            miner,
            storage,
            materializer,
            public_base_url: public_base_url.into(),
        }
    }

    /// Fail with not-found unless the job's primary artifact is on the shared volume.
    pub fn ensure_artifact(&self, job_id: &JobId) -> Result<()> {
        if self.storage.file_exists(job_id, ARTIFACT_FILE) {
            Ok(())
        } else {
            Err(NeurographError::not_found(format!(
                "graph artifact for job {job_id} not found at {}",
                self.storage.job_path(job_id).join(ARTIFACT_FILE).display()
            )))
        }
    }

    /// Relative or absolute URL the job's archive can be downloaded from.
    pub fn download_url(&self, job_id: &JobId) -> String {
        format!(
            "{}/api/pipeline/results/{job_id}/download",
            self.public_base_url.trim_end_matches('/')
        )
    }

    /// Mine the job's artifact and mirror the outputs locally.
    ///
    /// Only the missing-artifact precondition is raised.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn mine_patterns(&self, job_id: &JobId, config: &MiningConfig) -> Result<MiningOutcome> {
        self.ensure_artifact(job_id)?;

        let resolved = config.resolve();
        let artifact = self.storage.job_path(job_id).join(ARTIFACT_FILE);

        let miner_response = match self.miner.mine(job_id, &artifact, &resolved).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "mining failed");
                return Ok(MiningOutcome::failure(job_id, &e));
            }
        };

        let materializer = self.materializer.clone();
        let job = job_id.clone();
        let materialized = tokio::task::spawn_blocking(move || materializer.materialize(&job))
            .await
            .map_err(|e| NeurographError::Task(format!("materialize task: {e}")))
            .and_then(|r| r);

        match materialized {
            Ok(paths) => {
                info!(results = %paths.results.display(), "mining completed");
                Ok(MiningOutcome::success(
                    job_id,
                    &paths,
                    self.download_url(job_id),
                    miner_response,
                ))
            }
            Err(e) => {
                warn!(error = %e, "materializing results failed");
                Ok(MiningOutcome::failure(job_id, &e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use neurograph_shared::GraphType;
    use neurograph_storage::FsStorage;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        tmp: PathBuf,
        dispatcher: MiningDispatcher,
        job: JobId,
    }

    impl Fixture {
        fn new(miner_url: &str) -> Self {
            let tmp = std::env::temp_dir().join(format!("ng-mining-test-{}", uuid::Uuid::now_v7()));
            std::fs::create_dir_all(tmp.join("shared/job-1")).unwrap();
            std::fs::create_dir_all(tmp.join("local")).unwrap();

            let storage: Arc<dyn SharedStorage> = Arc::new(FsStorage::new(tmp.join("shared")));
            let materializer = Arc::new(ResultMaterializer::new(storage.clone(), tmp.join("local")));
            let miner = MinerClient::new(miner_url, Duration::from_secs(5)).unwrap();

            Self {
                dispatcher: MiningDispatcher::new(miner, storage, materializer, "http://ng.test/"),
                tmp,
                job: JobId::parse("job-1").unwrap(),
            }
        }

        fn add_artifact(&self) {
            std::fs::write(self.tmp.join("shared/job-1").join(ARTIFACT_FILE), "pickle").unwrap();
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.tmp);
        }
    }

    #[tokio::test]
    async fn missing_artifact_is_raised_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fx = Fixture::new(&server.uri());
        let err = fx
            .dispatcher
            .mine_patterns(&fx.job, &MiningConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, NeurographError::NotFound { .. }));
        assert!(err.to_string().contains("job-1"));
        assert!(!fx.tmp.join("local/job-1").exists());
    }

    #[tokio::test]
    async fn success_materializes_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/mine"))
            .and(body_partial_json(serde_json::json!({
                "job_id": "job-1",
                "config": {
                    "graph_type": "undirected",
                    "graph_output_format": "instance",
                    "visualize_instances": true,
                    "seed": 7
                }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = Fixture::new(&server.uri());
        fx.add_artifact();
        std::fs::create_dir_all(fx.tmp.join("shared/job-1/results")).unwrap();
        std::fs::write(fx.tmp.join("shared/job-1/results/patterns.json"), "[]").unwrap();

        let mut config = MiningConfig {
            graph_type: Some(GraphType::Undirected),
            graph_output_format: "instance".into(),
            ..MiningConfig::default()
        };
        config.extra.insert("seed".into(), 7.into());

        let outcome = fx.dispatcher.mine_patterns(&fx.job, &config).await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(
            outcome.download_url.as_deref(),
            Some("http://ng.test/api/pipeline/results/job-1/download")
        );
        assert!(fx.tmp.join("local/job-1/results/patterns.json").is_file());
    }

    #[tokio::test]
    async fn miner_failure_is_structured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("CUDA out of memory"))
            .mount(&server)
            .await;

        let fx = Fixture::new(&server.uri());
        fx.add_artifact();

        let outcome = fx
            .dispatcher
            .mine_patterns(&fx.job, &MiningConfig::default())
            .await
            .unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.error.unwrap().contains("CUDA out of memory"));
        assert!(outcome.download_url.is_none());
    }

    #[test]
    fn outcome_serializes_lowercase_status() {
        let job = JobId::parse("job-1").unwrap();
        let outcome = MiningOutcome::failure(&job, &NeurographError::Network("timed out".into()));
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["status"], "error");
        assert_eq!(json["job_id"], "job-1");
        assert!(json.get("results_path").is_none());
    }
}
