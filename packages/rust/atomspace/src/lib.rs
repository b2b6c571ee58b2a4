//! Client for the AtomSpace Builder graph-construction service.
//!
//! The service turns tabular input plus a builder config and schema into a
//! graph artifact written under the shared volume. One call produces one
//! remote job; the output kind is chosen by the [`WriterType`] selector, so
//! the primary and auxiliary builds are the same request issued twice.

use std::time::Duration;

use neurograph_shared::{BuildRequest, JobId, NeurographError, Result, WriterType};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use url::Url;

/// Name used for this service in error messages.
const SERVICE_NAME: &str = "AtomSpace";

/// User-Agent string for builder requests.
const USER_AGENT: &str = concat!("NeuroGraph/", env!("CARGO_PKG_VERSION"));

/// Successful answer from `/api/load`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    /// Remote job identifier; names the job directory in shared storage.
    pub job_id: JobId,
    /// Any other fields the service reports, kept for logging.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Stateless wrapper around the builder's load endpoint.
#[derive(Debug, Clone)]
pub struct AtomspaceClient {
    client: Client,
    load_url: Url,
}

impl AtomspaceClient {
    /// Build a client for the service at `base_url` with a per-call `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let load_url = endpoint(base_url, "api/load")?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| NeurographError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, load_url })
    }

    /// Issue one build. No retry; the caller decides what a failure means.
    #[instrument(skip_all, fields(writer_type = %writer_type, files = request.files.len()))]
    pub async fn load(&self, request: &BuildRequest, writer_type: WriterType) -> Result<LoadResponse> {
        request.validate()?;

        let form = build_form(request, writer_type);
        debug!(url = %self.load_url, "sending build request");

        let response = self
            .client
            .post(self.load_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| NeurographError::Network(format!("{}: {e}", self.load_url)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            NeurographError::Network(format!("{}: failed to read body: {e}", self.load_url))
        })?;

        if !status.is_success() {
            return Err(NeurographError::Remote {
                service: SERVICE_NAME,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: LoadResponse = serde_json::from_str(&body).map_err(|e| {
            NeurographError::validation(format!("unexpected {SERVICE_NAME} response: {e}"))
        })?;

        info!(job_id = %parsed.job_id, "build accepted");
        Ok(parsed)
    }
}

/// Assemble the multipart form. Input bytes are already in memory, so no
/// file handle is held by the request.
fn build_form(request: &BuildRequest, writer_type: WriterType) -> Form {
    let mut form = Form::new();
    for file in &request.files {
        let part = Part::bytes(file.contents.clone()).file_name(file.file_name.clone());
        form = form.part("files", part);
    }

    form.text("config", request.config.clone())
        .text("schema_json", request.schema_json.clone())
        .text("writer_type", writer_type.as_str())
        .text("graph_type", request.graph_type.as_str())
        .text("tenant_id", request.tenant_id.clone())
}

/// Join `path` onto a base URL that may or may not end with a slash.
fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let joined = format!("{}/{path}", base_url.trim_end_matches('/'));
    Url::parse(&joined)
        .map_err(|e| NeurographError::config(format!("invalid atomspace_url '{base_url}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurograph_shared::{GraphType, InputFile};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> BuildRequest {
        BuildRequest {
            files: vec![InputFile::new("edges.csv", "src,dst\n1,2\n")],
            config: r#"{"header": true}"#.into(),
            schema_json: r#"{"nodes": []}"#.into(),
            graph_type: GraphType::Undirected,
            tenant_id: "tenant-a".into(),
        }
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let a = endpoint("http://builder:8000", "api/load").unwrap();
        let b = endpoint("http://builder:8000/", "api/load").unwrap();
        assert_eq!(a.as_str(), "http://builder:8000/api/load");
        assert_eq!(a, b);
        assert!(endpoint("not a url", "api/load").is_err());
    }

    #[tokio::test]
    async fn load_returns_job_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/load"))
            .and(body_string_contains("edges.csv"))
            .and(body_string_contains("undirected"))
            .and(body_string_contains("tenant-a"))
            .and(body_string_contains("networkx"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"job_id": "job-1", "status": "completed"}"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = AtomspaceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let response = client.load(&request(), WriterType::Networkx).await.unwrap();

        assert_eq!(response.job_id.as_str(), "job-1");
        assert_eq!(response.extra["status"], "completed");
    }

    #[tokio::test]
    async fn load_sends_selected_writer_type() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/load"))
            .and(body_string_contains("mork"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"job_id": "aux-7"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = AtomspaceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let response = client.load(&request(), WriterType::Mork).await.unwrap();
        assert_eq!(response.job_id.as_str(), "aux-7");
    }

    #[tokio::test]
    async fn non_success_surfaces_status_and_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/load"))
            .respond_with(ResponseTemplate::new(422).set_body_string("schema_json is invalid"))
            .mount(&server)
            .await;

        let client = AtomspaceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.load(&request(), WriterType::Networkx).await.unwrap_err();

        match err {
            NeurographError::Remote { status, body, .. } => {
                assert_eq!(status, 422);
                assert_eq!(body, "schema_json is invalid");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_job_id_is_validation_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "ok"}"#))
            .mount(&server)
            .await;

        let client = AtomspaceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.load(&request(), WriterType::Networkx).await.unwrap_err();
        assert!(matches!(err, NeurographError::Validation { .. }));
    }

    #[tokio::test]
    async fn timeout_is_transport_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"job_id": "late"}"#)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = AtomspaceClient::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.load(&request(), WriterType::Networkx).await.unwrap_err();
        assert!(err.is_transport());
        assert!(matches!(err, NeurographError::Network(_)));
    }

    #[tokio::test]
    async fn empty_request_is_rejected_before_sending() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"job_id": "x"}"#))
            .expect(0)
            .mount(&server)
            .await;

        let mut empty = request();
        empty.files.clear();

        let client = AtomspaceClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.load(&empty, WriterType::Networkx).await.unwrap_err();
        assert!(matches!(err, NeurographError::Validation { .. }));
    }
}
