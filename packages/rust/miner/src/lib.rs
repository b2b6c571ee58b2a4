//! Client for the Neural Miner pattern-mining service.
//!
//! The miner reads the primary graph artifact straight from the shared
//! volume and writes its outputs (`results/`, `plots/`) next to it. The HTTP
//! answer only signals success or failure.

use std::path::Path;
use std::time::Duration;

use neurograph_shared::{JobId, NeurographError, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

/// Name used for this service in error messages.
const SERVICE_NAME: &str = "Neural Miner";

/// User-Agent string for miner requests.
const USER_AGENT: &str = concat!("NeuroGraph/", env!("CARGO_PKG_VERSION"));

/// Body of a `/api/mine` request.
#[derive(Debug, Serialize)]
struct MineRequest<'a> {
    networkx_file: String,
    job_id: &'a JobId,
    config: &'a serde_json::Map<String, serde_json::Value>,
}

/// Thin wrapper around the miner's mine endpoint.
#[derive(Debug, Clone)]
pub struct MinerClient {
    client: Client,
    mine_url: Url,
}

impl MinerClient {
    /// Build a client for the service at `base_url` with a per-call `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let joined = format!("{}/api/mine", base_url.trim_end_matches('/'));
        let mine_url = Url::parse(&joined)
            .map_err(|e| NeurographError::config(format!("invalid miner_url '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| NeurographError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, mine_url })
    }

    /// Ask the miner to mine `artifact` for `job_id` with a resolved config.
    ///
    /// Returns the miner's JSON answer. A 2xx answer whose `status` is
    /// `"error"` is treated the same as a non-success status.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn mine(
        &self,
        job_id: &JobId,
        artifact: &Path,
        config: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let body = MineRequest {
            networkx_file: artifact.to_string_lossy().into_owned(),
            job_id,
            config,
        };
        debug!(url = %self.mine_url, artifact = %artifact.display(), "sending mine request");

        let response = self
            .client
            .post(self.mine_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| NeurographError::Network(format!("{}: {e}", self.mine_url)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            NeurographError::Network(format!("{}: failed to read body: {e}", self.mine_url))
        })?;

        if !status.is_success() {
            return Err(NeurographError::Remote {
                service: SERVICE_NAME,
                status: status.as_u16(),
                body: text,
            });
        }

        let value: serde_json::Value =
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

        if let Some(message) = reported_error(&value) {
            return Err(NeurographError::Remote {
                service: SERVICE_NAME,
                status: status.as_u16(),
                body: message,
            });
        }

        info!("mining finished");
        Ok(value)
    }
}

/// Extract the failure message from a `{"status": "error", ...}` answer.
fn reported_error(value: &serde_json::Value) -> Option<String> {
    if value.get("status").and_then(|s| s.as_str()) != Some("error") {
        return None;
    }
    let message = value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("miner reported an error");
    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        map.insert("n_trials".into(), 10.into());
        map.insert("visualize_instances".into(), true.into());
        map
    }

    #[tokio::test]
    async fn mine_posts_artifact_and_config() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/mine"))
            .and(body_partial_json(serde_json::json!({
                "networkx_file": "/shared/output/job-1/networkx_graph.pkl",
                "job_id": "job-1",
                "config": { "n_trials": 10, "visualize_instances": true }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = MinerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let job = JobId::parse("job-1").unwrap();
        let answer = client
            .mine(&job, Path::new("/shared/output/job-1/networkx_graph.pkl"), &config())
            .await
            .unwrap();

        assert_eq!(answer["status"], "success");
    }

    #[tokio::test]
    async fn reported_error_status_is_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/mine"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "error": "graph too small"
            })))
            .mount(&server)
            .await;

        let client = MinerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let job = JobId::parse("job-1").unwrap();
        let err = client
            .mine(&job, Path::new("/tmp/g.pkl"), &config())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("graph too small"));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn server_error_keeps_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("miner overloaded"))
            .mount(&server)
            .await;

        let client = MinerClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let job = JobId::parse("job-1").unwrap();
        let err = client
            .mine(&job, Path::new("/tmp/g.pkl"), &config())
            .await
            .unwrap_err();

        match err {
            NeurographError::Remote { status, body, .. } => {
                assert_eq!(status, 503);
                assert_eq!(body, "miner overloaded");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn reported_error_ignores_success() {
        assert!(reported_error(&serde_json::json!({"status": "success"})).is_none());
        assert!(reported_error(&serde_json::json!("plain text")).is_none());
        assert_eq!(
            reported_error(&serde_json::json!({"status": "error", "message": "bad"})).as_deref(),
            Some("bad")
        );
    }
}
