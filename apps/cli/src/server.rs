//! HTTP API over the orchestrator.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use neurograph_core::Orchestrator;
use neurograph_shared::{
    BuildRequest, GraphType, InputFile, JobId, MiningConfig, NeurographError, WriterType,
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// Uploads are graph source tables; the framework's 2 MB default is too small.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

type AppState = Arc<Orchestrator>;

/// Build the router with every pipeline route.
pub(crate) fn create_router(orchestrator: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/pipeline/generate-graph", post(generate_graph))
        .route("/api/pipeline/execute", post(execute))
        .route("/api/pipeline/mine-patterns", post(mine_patterns))
        .route("/api/pipeline/select-motif", post(select_motif))
        .route("/api/pipeline/graph-type/{job_id}", get(graph_type))
        .route("/api/pipeline/results/{job_id}/files/{*filename}", get(result_file))
        .route("/api/pipeline/results/{job_id}/download", get(download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

// =============================================================================
// Errors
// =============================================================================

/// Error body: `{"status": "error", "error": "..."}`.
#[derive(Debug)]
pub(crate) struct ApiError(NeurographError);

impl From<NeurographError> for ApiError {
    fn from(e: NeurographError) -> Self {
        Self(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self(NeurographError::validation(format!("invalid form data: {e}")))
    }
}

fn status_for(error: &NeurographError) -> StatusCode {
    match error {
        NeurographError::NotFound { .. } => StatusCode::NOT_FOUND,
        NeurographError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
        NeurographError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        e if e.is_transport() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, status = status.as_u16(), "request failed");
        } else {
            debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = Json(serde_json::json!({
            "status": "error",
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// Service info
// =============================================================================

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "NeuroGraph Integration Service API"
    }))
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "neurograph"
    }))
}

// =============================================================================
// Build
// =============================================================================

/// Collect the upload form into a build request.
async fn read_build_form(orchestrator: &Orchestrator, mut multipart: Multipart) -> ApiResult<BuildRequest> {
    let mut files = Vec::new();
    let mut config = None;
    let mut schema_json = None;
    let mut graph_type = GraphType::default();
    let mut tenant_id = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                let file_name = field
                    .file_name()
                    .and_then(|n| FsPath::new(n).file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = field.bytes().await?;
                files.push(InputFile::new(file_name, bytes.to_vec()));
            }
            "config" => config = Some(field.text().await?),
            "schema_json" => schema_json = Some(field.text().await?),
            "graph_type" => {
                let raw = field.text().await?;
                if !raw.trim().is_empty() {
                    graph_type = raw.parse()?;
                }
            }
            "tenant_id" => tenant_id = Some(field.text().await?),
            "writer_type" => {
                let raw = field.text().await?;
                let writer: WriterType = raw.parse()?;
                if writer != WriterType::Networkx {
                    return Err(NeurographError::validation(format!(
                        "writer_type '{writer}' cannot be used for the primary build"
                    ))
                    .into());
                }
            }
            other => debug!(field = other, "ignoring unknown form field"),
        }
    }

    let config = config.ok_or_else(|| NeurographError::validation("missing form field 'config'"))?;
    let schema_json =
        schema_json.ok_or_else(|| NeurographError::validation("missing form field 'schema_json'"))?;
    let tenant_id = tenant_id
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| orchestrator.config().default_tenant.clone());

    Ok(BuildRequest {
        files,
        config,
        schema_json,
        graph_type,
        tenant_id,
    })
}

async fn generate_graph(State(orchestrator): State<AppState>, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let request = read_build_form(&orchestrator, multipart).await?;
    let outcome = orchestrator.generate_graph(request).await?;
    Ok(Json(outcome))
}

async fn execute(State(orchestrator): State<AppState>, multipart: Multipart) -> ApiResult<impl IntoResponse> {
    let request = read_build_form(&orchestrator, multipart).await?;
    let outcome = orchestrator.execute(request, MiningConfig::default()).await?;
    Ok(Json(outcome))
}

// =============================================================================
// Mining
// =============================================================================

#[derive(Debug, Deserialize)]
struct MinePatternsRequest {
    job_id: JobId,
    #[serde(flatten)]
    config: MiningConfig,
}

async fn mine_patterns(
    State(orchestrator): State<AppState>,
    Json(request): Json<MinePatternsRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = orchestrator
        .mine_patterns(&request.job_id, request.config)
        .await?;
    if !outcome.is_success() {
        warn!(job_id = %request.job_id, error = ?outcome.error, "mining returned an error outcome");
    }
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
struct SelectMotifRequest {
    job_id: JobId,
    motif_index: u32,
    #[serde(default)]
    tenant_id: Option<String>,
}

async fn select_motif(
    State(orchestrator): State<AppState>,
    Json(request): Json<SelectMotifRequest>,
) -> impl IntoResponse {
    Json(orchestrator.select_motif(&request.job_id, request.motif_index, request.tenant_id))
}

async fn graph_type(
    State(orchestrator): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_id = JobId::parse(&job_id)?;
    let graph_type = orchestrator.resolve_graph_type(&job_id)?;
    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "graph_type": graph_type,
    })))
}

// =============================================================================
// Results
// =============================================================================

async fn result_file(
    State(orchestrator): State<AppState>,
    Path((job_id, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let job_id = JobId::parse(&job_id)?;
    let path = orchestrator.resolve_file_path(&job_id, &filename)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| NeurographError::io(&path, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((
        [
            (header::CONTENT_TYPE, content_type(&path).to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{name}\"")),
        ],
        bytes,
    )
        .into_response())
}

async fn download(
    State(orchestrator): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job_id = JobId::parse(&job_id)?;
    let path = orchestrator.archive(&job_id).await?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| NeurographError::io(&path, e))?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{job_id}_results.zip\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("html") => "text/html; charset=utf-8",
        Some("csv") => "text/csv",
        Some("txt") | Some("log") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// =============================================================================
// Serving
// =============================================================================

/// Serve until Ctrl-C, then let queued merges finish.
pub(crate) async fn serve(orchestrator: AppState, addr: &str) -> color_eyre::eyre::Result<()> {
    let runner = orchestrator.runner().clone();
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    if runner.in_flight() > 0 {
        tracing::info!(pending = runner.in_flight(), "waiting for background merges");
    }
    runner.wait_idle().await;
    Ok(())
}
